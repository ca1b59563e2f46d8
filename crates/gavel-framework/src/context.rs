//! Contexts handed to command handlers.
//!
//! - [`CallContext`]: one slash command interaction. Cheap to clone; every
//!   clone shares the same acknowledgement flag, so the dispatcher can tell
//!   whether the handler already answered.
//! - [`TextContext`]: one free-text command message.
//! - [`ComponentContext`]: one button press or select-menu choice. Shares the
//!   acknowledgement rules of [`CallContext`].
//!
//! Both carry the [`ModuleManager`] so handlers can read and change module
//! state without any global registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gavel_core::{
    ApiResult, BoxedPlatform, ChannelId, ComponentEvent, GuildId, Interaction, Member,
    MessageEvent, UserId,
};

use crate::manager::ModuleManager;

// =============================================================================
// CallContext
// =============================================================================

struct CallInner {
    manager: Arc<ModuleManager>,
    platform: BoxedPlatform,
    interaction: Interaction,
    /// Set once the first reply went out.
    acknowledged: AtomicBool,
}

/// Context of one slash command call.
#[derive(Clone)]
pub struct CallContext {
    inner: Arc<CallInner>,
}

impl CallContext {
    pub fn new(
        manager: Arc<ModuleManager>,
        platform: BoxedPlatform,
        interaction: Interaction,
    ) -> Self {
        Self {
            inner: Arc::new(CallInner {
                manager,
                platform,
                interaction,
                acknowledged: AtomicBool::new(false),
            }),
        }
    }

    /// Replies in the channel.
    ///
    /// The first reply answers the interaction; later ones edit that answer.
    pub async fn reply(&self, content: &str) -> ApiResult<()> {
        self.send(content, false).await
    }

    /// Replies visibly to the caller only.
    pub async fn reply_ephemeral(&self, content: &str) -> ApiResult<()> {
        self.send(content, true).await
    }

    /// Reports a user-facing error, visible to the caller only.
    pub async fn error(&self, message: &str) -> ApiResult<()> {
        self.send(message, true).await
    }

    /// Replaces the first reply.
    pub async fn edit_reply(&self, content: &str) -> ApiResult<()> {
        self.inner
            .platform
            .edit_reply(self.inner.interaction.id, content)
            .await
    }

    async fn send(&self, content: &str, ephemeral: bool) -> ApiResult<()> {
        if self.inner.acknowledged.swap(true, Ordering::AcqRel) {
            return self.edit_reply(content).await;
        }
        let result = self
            .inner
            .platform
            .reply(self.inner.interaction.id, content, ephemeral)
            .await;
        if result.is_err() {
            self.inner.acknowledged.store(false, Ordering::Release);
        }
        result
    }

    /// Whether any reply has been sent.
    pub fn is_acknowledged(&self) -> bool {
        self.inner.acknowledged.load(Ordering::Acquire)
    }

    pub fn manager(&self) -> &Arc<ModuleManager> {
        &self.inner.manager
    }

    pub fn platform(&self) -> &BoxedPlatform {
        &self.inner.platform
    }

    pub fn interaction(&self) -> &Interaction {
        &self.inner.interaction
    }

    pub fn member(&self) -> &Member {
        &self.inner.interaction.member
    }

    pub fn user_id(&self) -> UserId {
        self.inner.interaction.member.user_id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.inner.interaction.channel_id
    }

    /// The guild the call came from. Dispatch only runs for guild calls.
    pub fn guild_id(&self) -> GuildId {
        self.inner
            .interaction
            .guild_id
            .unwrap_or_else(|| self.inner.manager.target_guild())
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("interaction", &self.inner.interaction.id)
            .field("path", &self.inner.interaction.path)
            .field("acknowledged", &self.is_acknowledged())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TextContext
// =============================================================================

/// Context of one free-text command.
#[derive(Clone)]
pub struct TextContext {
    manager: Arc<ModuleManager>,
    platform: BoxedPlatform,
    event: Arc<MessageEvent>,
    command: String,
    prefix: String,
}

impl TextContext {
    pub fn new(
        manager: Arc<ModuleManager>,
        platform: BoxedPlatform,
        event: Arc<MessageEvent>,
        command: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            platform,
            event,
            command: command.into(),
            prefix: prefix.into(),
        }
    }

    /// Posts a message into the originating channel.
    pub async fn reply(&self, content: &str) -> ApiResult<()> {
        self.platform
            .send_message(self.event.channel_id, content)
            .await
    }

    pub fn manager(&self) -> &Arc<ModuleManager> {
        &self.manager
    }

    pub fn platform(&self) -> &BoxedPlatform {
        &self.platform
    }

    pub fn event(&self) -> &MessageEvent {
        &self.event
    }

    pub fn author(&self) -> &Member {
        &self.event.author
    }

    pub fn channel_id(&self) -> ChannelId {
        self.event.channel_id
    }

    /// Display name of the matched command.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Prefix in effect for this message.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl std::fmt::Debug for TextContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextContext")
            .field("channel", &self.event.channel_id)
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ComponentContext
// =============================================================================

struct ComponentInner {
    manager: Arc<ModuleManager>,
    platform: BoxedPlatform,
    event: ComponentEvent,
    acknowledged: AtomicBool,
}

/// Context of one component callback.
#[derive(Clone)]
pub struct ComponentContext {
    inner: Arc<ComponentInner>,
}

impl ComponentContext {
    pub fn new(manager: Arc<ModuleManager>, platform: BoxedPlatform, event: ComponentEvent) -> Self {
        Self {
            inner: Arc::new(ComponentInner {
                manager,
                platform,
                event,
                acknowledged: AtomicBool::new(false),
            }),
        }
    }

    /// Replies in the channel; later replies edit the first one.
    pub async fn reply(&self, content: &str) -> ApiResult<()> {
        self.send(content, false).await
    }

    /// Replies visibly to the member who used the component only.
    pub async fn reply_ephemeral(&self, content: &str) -> ApiResult<()> {
        self.send(content, true).await
    }

    /// Acknowledges without replying, leaving the message as it is.
    pub async fn defer(&self) -> ApiResult<()> {
        if self.inner.acknowledged.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = self.inner.platform.defer_component(self.inner.event.id).await;
        if result.is_err() {
            self.inner.acknowledged.store(false, Ordering::Release);
        }
        result
    }

    async fn send(&self, content: &str, ephemeral: bool) -> ApiResult<()> {
        let id = self.inner.event.id;
        if self.inner.acknowledged.swap(true, Ordering::AcqRel) {
            return self.inner.platform.edit_reply(id, content).await;
        }
        let result = self.inner.platform.reply(id, content, ephemeral).await;
        if result.is_err() {
            self.inner.acknowledged.store(false, Ordering::Release);
        }
        result
    }

    pub fn is_acknowledged(&self) -> bool {
        self.inner.acknowledged.load(Ordering::Acquire)
    }

    pub fn manager(&self) -> &Arc<ModuleManager> {
        &self.inner.manager
    }

    pub fn platform(&self) -> &BoxedPlatform {
        &self.inner.platform
    }

    pub fn event(&self) -> &ComponentEvent {
        &self.inner.event
    }

    pub fn custom_id(&self) -> &str {
        &self.inner.event.custom_id
    }

    /// Chosen select-menu options.
    pub fn values(&self) -> &[String] {
        &self.inner.event.values
    }

    pub fn member(&self) -> &Member {
        &self.inner.event.member
    }

    pub fn channel_id(&self) -> ChannelId {
        self.inner.event.channel_id
    }
}

impl std::fmt::Debug for ComponentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentContext")
            .field("interaction", &self.inner.event.id)
            .field("custom_id", &self.inner.event.custom_id)
            .field("acknowledged", &self.is_acknowledged())
            .finish_non_exhaustive()
    }
}
