//! Inbound event dispatch.
//!
//! ```text
//! Interaction ──► guild gate ──► path index ──► permission ──► options ──► handler
//!                     │              │               │             │          │
//!                 DM: refuse     miss: drop     deny: ephemeral  missing:   fault: log,
//!                 foreign: drop                                  protocol   category reply
//!                                                                violation
//!
//! MessageEvent ──► guild gate ──► prefix ──► channel trie ──► permission ──► handler
//!
//! ComponentEvent ──► guild gate ──► callback id ──► permission ──► handler ──► defer if silent
//! ```
//!
//! [`Dispatcher::dispatch`] first hands every event to the loaded modules'
//! [`on_event`](crate::module::BotModule::on_event) listeners, then routes it.
//!
//! Every path returns a [`DispatchOutcome`] instead of an error: every failure
//! is either answered on the platform or logged, and nothing propagates to
//! the caller.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use gavel_core::{
    BoxedPlatform, ChannelId, ComponentEvent, Interaction, InteractionId, Mentionable,
    MessageEvent, ParameterType, PlatformValue,
};
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use crate::context::{CallContext, ComponentContext, TextContext};
use crate::descriptor::{ArgValue, Args, ChannelHandle, CommandDescriptor, command_path};
use crate::error::{CommandResult, DispatchError};
use crate::manager::ModuleManager;

pub const PRIVATE_MESSAGE_REFUSAL: &str =
    "Commands may not be issued through private messages, please issue commands in the Guild!";
pub const PERMISSION_DENIED: &str = "You do not have permission for this command";
pub const COMMAND_COMPLETE: &str = "Command complete.";

/// Category reported for a handler that panicked.
const PANIC_CATEGORY: &str = "internal error";

/// One event received from the platform gateway.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Interaction(Interaction),
    Component(ComponentEvent),
    Message(MessageEvent),
}

impl From<Interaction> for InboundEvent {
    fn from(interaction: Interaction) -> Self {
        Self::Interaction(interaction)
    }
}

impl From<ComponentEvent> for InboundEvent {
    fn from(event: ComponentEvent) -> Self {
        Self::Component(event)
    }
}

impl From<MessageEvent> for InboundEvent {
    fn from(message: MessageEvent) -> Self {
        Self::Message(message)
    }
}

/// How one inbound event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Sent outside any guild; refused.
    NotInGuild,
    /// Sent from a guild this deployment does not serve.
    ForeignGuild,
    /// Not a command (webhook, missing prefix, empty text).
    Ignored,
    /// No command under that path or text, or no callback under that
    /// component id.
    UnknownPath,
    PermissionDenied,
    /// The platform omitted a required option or sent the wrong kind.
    ProtocolViolation,
    Completed,
    /// The handler returned an error or panicked.
    Failed,
}

/// Routes interactions and messages to command handlers.
#[derive(Clone)]
pub struct Dispatcher {
    manager: Arc<ModuleManager>,
    platform: BoxedPlatform,
}

impl Dispatcher {
    pub fn new(manager: Arc<ModuleManager>, platform: BoxedPlatform) -> Self {
        Self { manager, platform }
    }

    pub fn manager(&self) -> &Arc<ModuleManager> {
        &self.manager
    }

    pub fn platform(&self) -> &BoxedPlatform {
        &self.platform
    }

    /// Notifies listeners, then routes `event` by kind.
    pub async fn dispatch(&self, event: InboundEvent) -> DispatchOutcome {
        self.manager.notify_listeners(&event);
        match event {
            InboundEvent::Interaction(interaction) => self.dispatch_interaction(interaction).await,
            InboundEvent::Component(component) => self.dispatch_component(component).await,
            InboundEvent::Message(message) => self.dispatch_message(message).await,
        }
    }

    // ─── Slash commands ──────────────────────────────────────────────────────

    pub async fn dispatch_interaction(&self, interaction: Interaction) -> DispatchOutcome {
        let path = command_path(
            &interaction.path.command,
            interaction.path.group.as_deref(),
            interaction.path.subcommand.as_deref(),
        );
        let span = info_span!("dispatch", path = %path);
        self.dispatch_interaction_inner(interaction, path)
            .instrument(span)
            .await
    }

    async fn dispatch_interaction_inner(
        &self,
        interaction: Interaction,
        path: String,
    ) -> DispatchOutcome {
        match interaction.guild_id {
            None => {
                self.reply(interaction.id, PRIVATE_MESSAGE_REFUSAL, true).await;
                return DispatchOutcome::NotInGuild;
            }
            Some(guild) if guild != self.manager.target_guild() => {
                info!(guild = %guild, "Ignoring interaction from another guild");
                return DispatchOutcome::ForeignGuild;
            }
            Some(_) => {}
        }

        let Some(descriptor) = self.manager.lookup(&path) else {
            trace!("No command under path, registration is probably stale");
            return DispatchOutcome::UnknownPath;
        };

        if !self
            .manager
            .permissions()
            .member_has_permission(descriptor.permission(), &interaction.member)
        {
            debug!(
                user = %interaction.member.user_id,
                permission = %descriptor.permission().as_permission_string(),
                "Permission denied"
            );
            self.reply(interaction.id, PERMISSION_DENIED, true).await;
            return DispatchOutcome::PermissionDenied;
        }

        let args = match collect_args(&descriptor, &path, &interaction) {
            Ok(args) => args,
            Err(e) => {
                error!(error = %e, "Platform sent an invalid interaction");
                let message = format!("Error during command: {}", e.category());
                self.reply(interaction.id, &message, true).await;
                return DispatchOutcome::ProtocolViolation;
            }
        };

        let ctx = CallContext::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.platform),
            interaction,
        );
        let outcome = run_guarded(descriptor.invoke(ctx.clone(), args)).await;

        match outcome {
            Ok(()) => {
                if !ctx.is_acknowledged()
                    && let Err(e) = ctx.reply_ephemeral(COMMAND_COMPLETE).await
                {
                    warn!(error = %e, "Unable to acknowledge command");
                }
                DispatchOutcome::Completed
            }
            Err(category) => {
                if !ctx.is_acknowledged()
                    && let Err(e) = ctx.error(&format!("Error during command: {category}")).await
                {
                    warn!(error = %e, "Unable to report command failure");
                }
                DispatchOutcome::Failed
            }
        }
    }

    async fn reply(&self, interaction: InteractionId, content: &str, ephemeral: bool) {
        if let Err(e) = self.platform.reply(interaction, content, ephemeral).await {
            warn!(error = %e, "Unable to reply to interaction");
        }
    }

    // ─── Components ──────────────────────────────────────────────────────────

    /// Runs the callback registered under the component's id.
    ///
    /// Denials and misses are not answered; the interaction is deferred so
    /// the platform does not report a failure to the member.
    pub async fn dispatch_component(&self, event: ComponentEvent) -> DispatchOutcome {
        let span = info_span!("dispatch", component = %event.custom_id);
        self.dispatch_component_inner(event).instrument(span).await
    }

    async fn dispatch_component_inner(&self, event: ComponentEvent) -> DispatchOutcome {
        match event.guild_id {
            None => {
                self.defer(event.id).await;
                return DispatchOutcome::NotInGuild;
            }
            Some(guild) if guild != self.manager.target_guild() => {
                info!(guild = %guild, "Ignoring component from another guild");
                return DispatchOutcome::ForeignGuild;
            }
            Some(_) => {}
        }

        let callback = self
            .manager
            .components()
            .get(&event.custom_id)
            .filter(|callback| callback.kind() == event.kind);
        let Some(callback) = callback else {
            trace!("No callback under component id, it was probably swept");
            self.defer(event.id).await;
            return DispatchOutcome::UnknownPath;
        };

        if !self
            .manager
            .permissions()
            .member_has_permission(callback.permission(), &event.member)
        {
            debug!(user = %event.member.user_id, "Component permission denied");
            self.defer(event.id).await;
            return DispatchOutcome::PermissionDenied;
        }

        let ctx = ComponentContext::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.platform),
            event,
        );
        let outcome = match run_guarded(callback.invoke(ctx.clone())).await {
            Ok(()) => DispatchOutcome::Completed,
            Err(category) => {
                warn!(category, "Component callback failed");
                DispatchOutcome::Failed
            }
        };
        if !ctx.is_acknowledged()
            && let Err(e) = ctx.defer().await
        {
            warn!(error = %e, "Unable to defer component interaction");
        }
        outcome
    }

    async fn defer(&self, interaction: InteractionId) {
        if let Err(e) = self.platform.defer_component(interaction).await {
            warn!(error = %e, "Unable to defer component interaction");
        }
    }

    // ─── Text commands ───────────────────────────────────────────────────────

    pub async fn dispatch_message(&self, event: MessageEvent) -> DispatchOutcome {
        if event.webhook || event.guild_id != Some(self.manager.target_guild()) {
            return DispatchOutcome::Ignored;
        }

        let channel = event.channel_id;
        let prefix = self.manager.prefix_for(channel);
        let Some(text) = event.content.strip_prefix(prefix.as_str()) else {
            return DispatchOutcome::Ignored;
        };
        if text.trim().is_empty() {
            return DispatchOutcome::Ignored;
        }

        let index = self.manager.commands_for_channel(channel);
        let Some(hit) = index.find(text) else {
            trace!(channel = %channel, "No text command matched");
            return DispatchOutcome::UnknownPath;
        };
        let command = Arc::clone(hit.value);
        let args = hit.remainder.to_string();

        let span = info_span!("dispatch", command = %command.name());
        async move {
            if !self
                .manager
                .permissions()
                .member_has_permission(command.permission(), &event.author)
            {
                debug!(user = %event.author.user_id, "Permission denied");
                self.send(channel, PERMISSION_DENIED).await;
                return DispatchOutcome::PermissionDenied;
            }

            let ctx = TextContext::new(
                Arc::clone(&self.manager),
                Arc::clone(&self.platform),
                Arc::new(event),
                command.name(),
                prefix,
            );
            match run_guarded(command.invoke(ctx, args)).await {
                Ok(()) => DispatchOutcome::Completed,
                Err(category) => {
                    let message =
                        format!("Command {} resulted in an error: {category}", command.name());
                    self.send(channel, &message).await;
                    DispatchOutcome::Failed
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn send(&self, channel: ChannelId, content: &str) {
        if let Err(e) = self.platform.send_message(channel, content).await {
            warn!(error = %e, "Unable to send message");
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

/// Runs a handler future, turning errors and panics into a fault category.
async fn run_guarded(
    future: futures::future::BoxFuture<'static, CommandResult>,
) -> Result<(), &'static str> {
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(error = %e, category = e.category(), "Command failed");
            Err(e.category())
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            error!(panic = %message, "Command panicked");
            Err(PANIC_CATEGORY)
        }
    }
}

// =============================================================================
// Option conversion
// =============================================================================

/// Extracts every declared parameter, required first, from the option map.
fn collect_args(
    descriptor: &CommandDescriptor,
    path: &str,
    interaction: &Interaction,
) -> Result<Args, DispatchError> {
    let mut args = Args::new();
    for (parameter, required) in descriptor.parameters() {
        let name = parameter.name();
        let Some(value) = interaction.options.get(name) else {
            if required {
                return Err(DispatchError::MissingRequiredOption {
                    path: path.to_string(),
                    option: name.to_string(),
                });
            }
            args.push(name, None);
            continue;
        };
        let converted =
            convert(parameter.kind(), value).ok_or_else(|| DispatchError::OptionTypeMismatch {
                path: path.to_string(),
                option: name.to_string(),
                expected: parameter.kind(),
                got: value.kind(),
            })?;
        args.push(name, Some(converted));
    }
    Ok(args)
}

/// Converts one platform value into the argument shape of `kind`.
fn convert(kind: ParameterType, value: &PlatformValue) -> Option<ArgValue> {
    match kind {
        ParameterType::String => match value {
            PlatformValue::String(s) => Some(ArgValue::String(s.clone())),
            _ => None,
        },
        ParameterType::Integer => match value {
            PlatformValue::Integer(n) => Some(ArgValue::Integer(*n)),
            _ => None,
        },
        ParameterType::Boolean => match value {
            PlatformValue::Boolean(b) => Some(ArgValue::Boolean(*b)),
            _ => None,
        },
        ParameterType::User => match value {
            PlatformValue::User(id) => Some(ArgValue::User(*id)),
            _ => None,
        },
        ParameterType::Channel => match value {
            PlatformValue::Channel { id, kind } => Some(ArgValue::Channel(if kind.is_message_capable() {
                ChannelHandle::Message(*id)
            } else {
                ChannelHandle::Guild {
                    id: *id,
                    kind: *kind,
                }
            })),
            _ => None,
        },
        ParameterType::Role => match value {
            PlatformValue::Role(id) => Some(ArgValue::Role(*id)),
            _ => None,
        },
        ParameterType::Mentionable => match value {
            PlatformValue::Mentionable(m) => Some(ArgValue::Mentionable(*m)),
            PlatformValue::User(id) => Some(ArgValue::Mentionable(Mentionable::User(*id))),
            PlatformValue::Role(id) => Some(ArgValue::Mentionable(Mentionable::Role(*id))),
            _ => None,
        },
    }
}
