//! Test doubles shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gavel_core::{
    ApiError, ApiResult, BoxError, ChannelId, CommandData, CommandPrivilege, ComponentEvent,
    ComponentKind, GuildId, Interaction, InteractionId, InvokedPath, Member, MemoryBackend,
    MessageEvent, Platform, PlatformValue, RoleId, Store, UserId,
};
use parking_lot::Mutex;

use crate::compiler::{CommandDecl, ParamDecl};
use crate::dispatcher::Dispatcher;
use crate::manager::{ManagerSettings, ModuleManager};
use crate::module::{BotModule, ModuleDescriptor};
use crate::text::TextCommandDecl;

pub(crate) const GUILD: GuildId = GuildId(1000);
pub(crate) const CHANNEL: ChannelId = ChannelId(2000);
pub(crate) const OTHER_CHANNEL: ChannelId = ChannelId(2001);
/// Holds every permission in [`builtin_dispatcher`].
pub(crate) const ADMIN_USER: u64 = 1;

/// One outbound platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sent {
    Reply {
        content: String,
        ephemeral: bool,
    },
    Edit(String),
    Message {
        channel: ChannelId,
        content: String,
    },
    Deferred,
}

/// Platform that records every call.
#[derive(Default)]
pub(crate) struct RecordingPlatform {
    pub sent: Mutex<Vec<Sent>>,
    pub registered: Mutex<Vec<Vec<CommandData>>>,
    pub privileges: Mutex<Vec<Vec<CommandPrivilege>>>,
    pub fail_registration: bool,
}

impl RecordingPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Platform for RecordingPlatform {
    async fn register_commands(&self, _guild: GuildId, commands: Vec<CommandData>) -> ApiResult<()> {
        if self.fail_registration {
            return Err(ApiError::request("registration rejected"));
        }
        self.registered.lock().push(commands);
        Ok(())
    }

    async fn update_privileges(
        &self,
        _guild: GuildId,
        privileges: Vec<CommandPrivilege>,
    ) -> ApiResult<()> {
        self.privileges.lock().push(privileges);
        Ok(())
    }

    async fn reply(&self, _interaction: InteractionId, content: &str, ephemeral: bool) -> ApiResult<()> {
        self.sent.lock().push(Sent::Reply {
            content: content.to_string(),
            ephemeral,
        });
        Ok(())
    }

    async fn edit_reply(&self, _interaction: InteractionId, content: &str) -> ApiResult<()> {
        self.sent.lock().push(Sent::Edit(content.to_string()));
        Ok(())
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> ApiResult<()> {
        self.sent.lock().push(Sent::Message {
            channel,
            content: content.to_string(),
        });
        Ok(())
    }

    async fn defer_component(&self, _interaction: InteractionId) -> ApiResult<()> {
        self.sent.lock().push(Sent::Deferred);
        Ok(())
    }
}

// ─── Fixture modules ──────────────────────────────────────────────────────────

/// `alpha`: a public slash command with one required and one optional
/// parameter, plus the text command `alpha go`.
pub(crate) struct Alpha;

impl BotModule for Alpha {
    fn commands(self: Arc<Self>) -> Vec<CommandDecl> {
        vec![
            CommandDecl::new("alpha")
                .description("Echo a word")
                .everyone()
                .param(ParamDecl::new::<String>("word", "What to echo"))
                .param(ParamDecl::new::<Option<i64>>("times", "Repeat count").optional())
                .handler(|ctx, args| async move {
                    let word: String = args.get("word")?;
                    let times: Option<i64> = args.get("times")?;
                    let times = usize::try_from(times.unwrap_or(1)).unwrap_or(1);
                    ctx.reply(&vec![word; times].join(" ")).await?;
                    Ok(())
                }),
        ]
    }

    fn text_commands(self: Arc<Self>) -> Vec<TextCommandDecl> {
        vec![
            TextCommandDecl::new("alpha_go")
                .help("Echo the arguments")
                .everyone()
                .handler(|ctx, args| async move {
                    ctx.reply(&format!("go {args}")).await?;
                    Ok(())
                }),
        ]
    }
}

/// `beta`: a restricted slash command that never replies, one that fails
/// and one that panics.
pub(crate) struct Beta;

impl BotModule for Beta {
    fn commands(self: Arc<Self>) -> Vec<CommandDecl> {
        vec![
            CommandDecl::new("beta")
                .subcommand("quiet")
                .description("Does nothing")
                .handler(|_ctx, _args| async { Ok(()) }),
            CommandDecl::new("beta")
                .subcommand("fail")
                .description("Always fails")
                .handler(|_ctx, _args| async {
                    Err(crate::error::CommandError::failed("disk on fire at /var/lib"))
                }),
            CommandDecl::new("beta")
                .subcommand("explode")
                .description("Panics")
                .handler(|_ctx, args| async move {
                    if args.is_empty() {
                        panic!("handler bug");
                    }
                    Ok(())
                }),
        ]
    }

    fn text_commands(self: Arc<Self>) -> Vec<TextCommandDecl> {
        vec![
            TextCommandDecl::new("beta")
                .handler(|_ctx, _args| async {
                    Err(crate::error::CommandError::failed("text failure"))
                }),
        ]
    }
}

fn create_alpha() -> Result<Arc<dyn BotModule>, BoxError> {
    Ok(Arc::new(Alpha))
}

fn create_beta() -> Result<Arc<dyn BotModule>, BoxError> {
    Ok(Arc::new(Beta))
}

pub(crate) fn fixture_modules() -> Vec<ModuleDescriptor> {
    vec![
        ModuleDescriptor::new("alpha", "Echo commands", create_alpha),
        ModuleDescriptor::new("beta", "Restricted commands", create_beta),
    ]
}

/// A store with `alpha` and `beta` enabled and permitted guild-wide.
pub(crate) fn seeded_store() -> Arc<Store> {
    let backend = MemoryBackend::new()
        .with_entry("enabled_modules", r#"["admin","alpha","beta"]"#)
        .with_entry(
            "module_permissions",
            r#"{"permitted_in_guild":["admin","alpha","beta"]}"#,
        );
    Arc::new(Store::new(backend))
}

pub(crate) fn settings() -> ManagerSettings {
    ManagerSettings::new(GUILD)
}

pub(crate) fn manager_with(modules: Vec<ModuleDescriptor>) -> Arc<ModuleManager> {
    Arc::new(ModuleManager::new(seeded_store(), modules, settings()).unwrap())
}

pub(crate) fn manager() -> Arc<ModuleManager> {
    manager_with(fixture_modules())
}

/// Built-in modules plus the fixtures, all enabled and guild-permitted, with
/// the command tree already synchronized.
#[cfg(feature = "builtin-modules")]
pub(crate) async fn builtin_dispatcher() -> (Dispatcher, Arc<RecordingPlatform>) {
    let all = r#"["admin","alpha","beta","help","ping"]"#;
    let backend = MemoryBackend::new()
        .with_entry("enabled_modules", all)
        .with_entry(
            "module_permissions",
            format!(r#"{{"permitted_in_guild":{all}}}"#),
        );
    let mut modules = crate::builtin::ALL.to_vec();
    modules.extend(fixture_modules());
    let manager = Arc::new(
        ModuleManager::new(Arc::new(Store::new(backend)), modules, settings()).unwrap(),
    );
    manager.permissions().grant_all(UserId(ADMIN_USER));

    let platform = RecordingPlatform::new();
    manager.sync_commands(platform.as_ref()).await.unwrap();
    (Dispatcher::new(manager, platform.clone()), platform)
}

pub(crate) fn member(user: u64, roles: &[u64]) -> Member {
    Member::new(UserId(user), roles.iter().copied().map(RoleId))
}

pub(crate) fn interaction(path: InvokedPath, member: Member) -> Interaction {
    Interaction {
        id: InteractionId(1),
        guild_id: Some(GUILD),
        channel_id: CHANNEL,
        member,
        path,
        options: HashMap::new(),
    }
}

pub(crate) fn with_option(
    mut interaction: Interaction,
    name: &str,
    value: PlatformValue,
) -> Interaction {
    interaction.options.insert(name.to_string(), value);
    interaction
}

pub(crate) fn message(content: &str, author: Member) -> MessageEvent {
    MessageEvent {
        guild_id: Some(GUILD),
        channel_id: CHANNEL,
        author,
        content: content.to_string(),
        webhook: false,
    }
}

pub(crate) fn component(kind: ComponentKind, custom_id: &str, member: Member) -> ComponentEvent {
    ComponentEvent {
        id: InteractionId(2),
        guild_id: Some(GUILD),
        channel_id: CHANNEL,
        member,
        kind,
        custom_id: custom_id.to_string(),
        values: Vec::new(),
    }
}
