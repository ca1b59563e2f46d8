//! The chat-platform client, seen from Gavel.
//!
//! Gavel never talks to the platform's wire protocol. A client adapter
//! turns inbound traffic into [`Interaction`]s, [`ComponentEvent`]s and
//! [`MessageEvent`]s and implements [`Platform`] for the outbound side:
//! pushing the registered command tree and sending replies.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ApiResult;
use crate::id::{ChannelId, GuildId, InteractionId, RoleId, UserId};
use crate::parameter::{ChoiceValue, ParameterType};
use crate::permission::Member;

// =============================================================================
// Inbound values
// =============================================================================

/// The kind of a channel referenced in an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    News,
    Thread,
    Voice,
    Stage,
    Category,
    Forum,
    Unknown,
}

impl ChannelKind {
    /// Whether messages can be sent into channels of this kind.
    pub fn is_message_capable(&self) -> bool {
        matches!(self, Self::Text | Self::News | Self::Thread)
    }
}

/// A user or a role, as carried by mentionable options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Mentionable {
    User(UserId),
    Role(RoleId),
}

/// One option value as delivered by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    User(UserId),
    Channel { id: ChannelId, kind: ChannelKind },
    Role(RoleId),
    Mentionable(Mentionable),
}

impl PlatformValue {
    /// The parameter type this value naturally satisfies.
    pub fn kind(&self) -> ParameterType {
        match self {
            Self::String(_) => ParameterType::String,
            Self::Integer(_) => ParameterType::Integer,
            Self::Boolean(_) => ParameterType::Boolean,
            Self::User(_) => ParameterType::User,
            Self::Channel { .. } => ParameterType::Channel,
            Self::Role(_) => ParameterType::Role,
            Self::Mentionable(_) => ParameterType::Mentionable,
        }
    }
}

// =============================================================================
// Inbound events
// =============================================================================

/// The `(command, group?, subcommand?)` triple an interaction invoked.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvokedPath {
    pub command: String,
    pub group: Option<String>,
    pub subcommand: Option<String>,
}

impl InvokedPath {
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn subcommand(mut self, subcommand: impl Into<String>) -> Self {
        self.subcommand = Some(subcommand.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// An inbound slash-command interaction.
#[derive(Debug, Clone)]
pub struct Interaction {
    pub id: InteractionId,
    /// `None` for private messages.
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub member: Member,
    pub path: InvokedPath,
    pub options: HashMap<String, PlatformValue>,
}

/// An inbound free-text message.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// `None` for private messages.
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub author: Member,
    pub content: String,
    /// Whether the message was posted by a webhook.
    pub webhook: bool,
}

/// Which kind of message component was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Button,
    Select,
}

/// A button press or select-menu choice on a message the bot sent.
#[derive(Debug, Clone)]
pub struct ComponentEvent {
    pub id: InteractionId,
    /// `None` for private messages.
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub member: Member,
    pub kind: ComponentKind,
    /// The id the callback was registered under.
    pub custom_id: String,
    /// Chosen options; empty for buttons.
    pub values: Vec<String>,
}

// =============================================================================
// Outbound registration data
// =============================================================================

/// A fixed choice as registered with the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionChoiceData {
    pub name: String,
    pub value: ChoiceValue,
}

/// One option of a registered command or subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionData {
    pub kind: ParameterType,
    pub name: String,
    pub description: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<OptionChoiceData>,
}

/// A subcommand node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubcommandData {
    pub name: String,
    pub description: String,
    pub options: Vec<OptionData>,
}

/// A subcommand group node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubcommandGroupData {
    pub name: String,
    pub description: String,
    pub subcommands: Vec<SubcommandData>,
}

/// A top-level command as registered with the platform.
///
/// Exactly one of `options` or `subcommands`/`groups` is populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandData {
    pub name: String,
    pub description: String,
    pub options: Vec<OptionData>,
    pub subcommands: Vec<SubcommandData>,
    pub groups: Vec<SubcommandGroupData>,
    /// True only when every reachable leaf is usable by everyone.
    pub default_enabled: bool,
}

/// Explicit per-command access for commands that are not default-enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandPrivilege {
    pub command: String,
    pub users: Vec<UserId>,
    pub roles: Vec<RoleId>,
}

// =============================================================================
// Platform
// =============================================================================

/// Outbound operations Gavel needs from the platform client.
#[async_trait]
pub trait Platform: Send + Sync + 'static {
    /// Replaces the guild's registered command tree.
    async fn register_commands(&self, guild: GuildId, commands: Vec<CommandData>)
    -> ApiResult<()>;

    /// Replaces explicit command privileges.
    async fn update_privileges(
        &self,
        guild: GuildId,
        privileges: Vec<CommandPrivilege>,
    ) -> ApiResult<()>;

    /// Sends the first reply to an interaction.
    async fn reply(&self, interaction: InteractionId, content: &str, ephemeral: bool)
    -> ApiResult<()>;

    /// Replaces the content of the first reply.
    async fn edit_reply(&self, interaction: InteractionId, content: &str) -> ApiResult<()>;

    /// Posts a message into a channel.
    async fn send_message(&self, channel: ChannelId, content: &str) -> ApiResult<()>;

    /// Acknowledges a component interaction without changing its message.
    async fn defer_component(&self, _interaction: InteractionId) -> ApiResult<()> {
        Ok(())
    }
}

/// Shared handle to a platform client.
pub type BoxedPlatform = Arc<dyn Platform>;
