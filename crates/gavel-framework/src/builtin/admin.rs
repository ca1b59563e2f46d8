//! Guild administration.
//!
//! | Command                                   | Effect                                  |
//! |-------------------------------------------|-----------------------------------------|
//! | `/module enable\|disable <module>`        | enablement for the next start           |
//! | `/module status <module>`, `/module list` | enablement and load state               |
//! | `/permit module <module> [channel]`       | visibility, guild-wide without channel  |
//! | `/block module <module> [channel]`        | same, in reverse                        |
//! | `/permission grant\|revoke <p> [user] [role]` | named permission grants             |
//! | `/permission grant-all\|revoke-all <user>` | the all-permissions list              |
//! | `/prefix set <prefix> [channel]`          | text prefix override                    |
//! | `/prefix clear [channel]`, `/prefix show` | drop or show the override               |
//! | `/caches invalidate [reload]`             | flush visibility caches                 |
//! | `/permissions trim`                       | drop redundant permit/block entries     |
//! | `/health`                                 | component health                        |
//!
//! Guild-wide visibility changes, `cmd:` grants and all-permission grants
//! change the registered tree or its privileges, so those re-sync commands
//! with the platform before replying.

use std::sync::Arc;

use gavel_core::{BoxError, RoleId, UserId};

use crate::compiler::{CommandDecl, ParamDecl};
use crate::context::CallContext;
use crate::descriptor::{Args, ChannelHandle};
use crate::error::{CommandError, CommandResult};
use crate::module::{BotModule, GroupDescription, ModuleDescriptor};
use crate::registry::ADMIN_MODULE;

pub const DESCRIPTOR: ModuleDescriptor =
    ModuleDescriptor::new(ADMIN_MODULE, "Guild administration", create);

crate::register_module!(ADMIN_MODULE_DESCRIPTOR, DESCRIPTOR);

struct Admin;

fn create() -> Result<Arc<dyn BotModule>, BoxError> {
    Ok(Arc::new(Admin))
}

impl BotModule for Admin {
    fn commands(self: Arc<Self>) -> Vec<CommandDecl> {
        vec![
            module_decl("enable", "Enable a module from the next start").handler(module_enable),
            module_decl("disable", "Disable a module from the next start").handler(module_disable),
            module_decl("status", "Show whether a module is enabled").handler(module_status),
            CommandDecl::new("module_list")
                .name("module")
                .subcommand("list")
                .description("List every module and its status")
                .handler(module_list),
            visibility_decl("permit", "Permit a module guild-wide or in one channel")
                .handler(|ctx, args| change_visibility(ctx, args, true)),
            visibility_decl("block", "Block a module guild-wide or in one channel")
                .handler(|ctx, args| change_visibility(ctx, args, false)),
            permission_decl("grant", "Grant a named permission")
                .handler(|ctx, args| change_permission(ctx, args, true)),
            permission_decl("revoke", "Revoke a named permission")
                .handler(|ctx, args| change_permission(ctx, args, false)),
            all_permissions_decl("grant-all", "Grant every permission to a user")
                .handler(|ctx, args| change_all_permissions(ctx, args, true)),
            all_permissions_decl("revoke-all", "Take a user off the all-permissions list")
                .handler(|ctx, args| change_all_permissions(ctx, args, false)),
            prefix_decl("set", "Set the text command prefix")
                .param(ParamDecl::new::<String>("prefix", "New prefix"))
                .param(channel_param())
                .handler(prefix_set),
            prefix_decl("clear", "Drop a text command prefix override")
                .param(channel_param())
                .handler(prefix_clear),
            prefix_decl("show", "Show the text command prefix in effect")
                .param(channel_param())
                .handler(prefix_show),
            CommandDecl::new("caches_invalidate")
                .name("caches")
                .subcommand("invalidate")
                .description("Flush every visibility cache")
                .param(
                    ParamDecl::new::<Option<bool>>("reload", "Rebuild right away, default true")
                        .optional(),
                )
                .handler(caches_invalidate),
            CommandDecl::new("permissions_trim")
                .name("permissions")
                .subcommand("trim")
                .description("Remove redundant and stale module permissions")
                .handler(permissions_trim),
            CommandDecl::new("health")
                .description("Show component health")
                .handler(health),
        ]
    }

    fn group_descriptions(&self) -> Vec<GroupDescription> {
        vec![
            GroupDescription::command("module", "Manage modules"),
            GroupDescription::command("permit", "Make modules visible"),
            GroupDescription::command("block", "Hide modules"),
            GroupDescription::command("permission", "Manage permission grants"),
            GroupDescription::command("prefix", "Manage text command prefixes"),
            GroupDescription::command("caches", "Manage caches"),
            GroupDescription::command("permissions", "Maintain module permissions"),
        ]
    }
}

fn module_decl(sub: &str, description: &str) -> CommandDecl {
    CommandDecl::new(format!("module_{sub}"))
        .name("module")
        .subcommand(sub)
        .description(description)
        .param(ParamDecl::new::<String>("module", "Module name"))
}

fn visibility_decl(command: &str, description: &str) -> CommandDecl {
    CommandDecl::new(format!("{command}_module"))
        .name(command)
        .subcommand("module")
        .description(description)
        .param(ParamDecl::new::<String>("module", "Module name"))
        .param(channel_param())
}

fn channel_param() -> ParamDecl {
    ParamDecl::new::<Option<ChannelHandle>>("channel", "Channel, guild-wide if omitted").optional()
}

fn permission_decl(sub: &str, description: &str) -> CommandDecl {
    CommandDecl::new(format!("permission_{sub}"))
        .name("permission")
        .subcommand(sub)
        .description(description)
        .param(ParamDecl::new::<String>("permission", "Permission name"))
        .param(ParamDecl::new::<Option<UserId>>("user", "User to change").optional())
        .param(ParamDecl::new::<Option<RoleId>>("role", "Role to change").optional())
}

fn all_permissions_decl(sub: &str, description: &str) -> CommandDecl {
    CommandDecl::new(format!("permission_{}", sub.replace('-', "_")))
        .name("permission")
        .subcommand(sub)
        .description(description)
        .param(ParamDecl::new::<UserId>("user", "User to change"))
}

fn prefix_decl(sub: &str, description: &str) -> CommandDecl {
    CommandDecl::new(format!("prefix_{sub}"))
        .name("prefix")
        .subcommand(sub)
        .description(description)
}

/// The `module` argument, lowercased, if it names a registered module.
///
/// Replies and returns `None` otherwise.
async fn known_module(ctx: &CallContext, args: &Args) -> CommandResult<Option<String>> {
    let name = args.get::<String>("module")?.to_lowercase();
    if ctx.manager().registry().module_exists(&name) {
        return Ok(Some(name));
    }
    ctx.error(&format!("Module {name} does not exist")).await?;
    Ok(None)
}

async fn resync(ctx: &CallContext) -> CommandResult {
    ctx.manager()
        .sync_commands(ctx.platform().as_ref())
        .await
        .map_err(CommandError::other)?;
    Ok(())
}

// ─── module ──────────────────────────────────────────────────────────────────

async fn module_enable(ctx: CallContext, args: Args) -> CommandResult {
    let Some(name) = known_module(&ctx, &args).await? else {
        return Ok(());
    };
    let reply = if ctx.manager().enable_module(&name) {
        format!("Module {name} enabled, it will load after a restart")
    } else {
        format!("Module {name} is already enabled")
    };
    ctx.reply(&reply).await?;
    Ok(())
}

async fn module_disable(ctx: CallContext, args: Args) -> CommandResult {
    let Some(name) = known_module(&ctx, &args).await? else {
        return Ok(());
    };
    let reply = if ctx.manager().disable_module(&name) {
        format!("Module {name} disabled, it will unload after a restart")
    } else {
        format!("Module {name} is already disabled")
    };
    ctx.reply(&reply).await?;
    Ok(())
}

async fn module_status(ctx: CallContext, args: Args) -> CommandResult {
    let Some(name) = known_module(&ctx, &args).await? else {
        return Ok(());
    };
    if let Some(status) = ctx.manager().registry().status(&name) {
        ctx.reply(&format!("Module {name} is {status}")).await?;
    }
    Ok(())
}

async fn module_list(ctx: CallContext, _args: Args) -> CommandResult {
    let registry = ctx.manager().registry();
    let errors = registry.load_errors();
    let lines: Vec<String> = registry
        .module_names()
        .into_iter()
        .filter_map(|name| {
            let status = registry.status(name)?;
            Some(match errors.get(name) {
                Some(error) => format!("**{name}**: {status} ({error})"),
                None => format!("**{name}**: {status}"),
            })
        })
        .collect();
    ctx.reply(&lines.join("\n")).await?;
    Ok(())
}

// ─── permit / block ──────────────────────────────────────────────────────────

async fn change_visibility(ctx: CallContext, args: Args, permit: bool) -> CommandResult {
    let Some(name) = known_module(&ctx, &args).await? else {
        return Ok(());
    };
    let channel: Option<ChannelHandle> = args.get("channel")?;
    let manager = ctx.manager();

    let reply = match (channel, permit) {
        (Some(channel), true) => manager.permit_in_channel(channel.id(), &name).to_string(),
        (Some(channel), false) => manager.block_in_channel(channel.id(), &name).to_string(),
        (None, true) => {
            if manager.permit_in_guild(&name) {
                resync(&ctx).await?;
                format!("Module {name} permitted in the guild")
            } else {
                format!("Module {name} is already permitted in the guild")
            }
        }
        (None, false) => {
            if manager.block_in_guild(&name) {
                resync(&ctx).await?;
                format!("Module {name} blocked in the guild")
            } else {
                format!("Module {name} was not permitted in the guild")
            }
        }
    };
    ctx.reply(&reply).await?;
    Ok(())
}

// ─── permission ──────────────────────────────────────────────────────────────

async fn change_permission(ctx: CallContext, args: Args, grant: bool) -> CommandResult {
    let permission: String = args.get("permission")?;
    let user: Option<UserId> = args.get("user")?;
    let role: Option<RoleId> = args.get("role")?;
    if user.is_none() && role.is_none() {
        ctx.error("Specify a user or a role").await?;
        return Ok(());
    }

    let manager = ctx.manager();
    let mut lines = Vec::new();
    let mut changed = false;
    if let Some(user) = user {
        let done = if grant {
            manager.grant_user(user, &permission)
        } else {
            manager.revoke_user(user, &permission)
        };
        changed |= done;
        lines.push(describe_change(grant, done, &permission, &format!("user {user}")));
    }
    if let Some(role) = role {
        let done = if grant {
            manager.grant_role(role, &permission)
        } else {
            manager.revoke_role(role, &permission)
        };
        changed |= done;
        lines.push(describe_change(grant, done, &permission, &format!("role {role}")));
    }

    if changed && permission.starts_with("cmd:") {
        resync(&ctx).await?;
    }
    ctx.reply(&lines.join("\n")).await?;
    Ok(())
}

async fn change_all_permissions(ctx: CallContext, args: Args, grant: bool) -> CommandResult {
    let user: UserId = args.get("user")?;
    let manager = ctx.manager();
    let changed = if grant {
        manager.grant_all(user)
    } else {
        manager.revoke_all(user)
    };
    if changed {
        resync(&ctx).await?;
    }
    let reply = match (grant, changed) {
        (true, true) => format!("User {user} now has every permission"),
        (true, false) => format!("User {user} already has every permission"),
        (false, true) => format!("User {user} no longer has every permission"),
        (false, false) => format!("User {user} was not on the all-permissions list"),
    };
    ctx.reply(&reply).await?;
    Ok(())
}

fn describe_change(grant: bool, done: bool, permission: &str, target: &str) -> String {
    match (grant, done) {
        (true, true) => format!("Granted {permission} to {target}"),
        (true, false) => format!("The {target} already has {permission}"),
        (false, true) => format!("Revoked {permission} from {target}"),
        (false, false) => format!("The {target} does not have {permission}"),
    }
}

// ─── prefix ──────────────────────────────────────────────────────────────────

fn scope(channel: Option<ChannelHandle>) -> String {
    match channel {
        Some(channel) => format!("channel {}", channel.id()),
        None => "the guild".to_string(),
    }
}

async fn prefix_set(ctx: CallContext, args: Args) -> CommandResult {
    let prefix: String = args.get("prefix")?;
    let channel: Option<ChannelHandle> = args.get("channel")?;
    if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
        ctx.error("A prefix must be non-empty and contain no whitespace")
            .await?;
        return Ok(());
    }
    let manager = ctx.manager();
    match channel {
        Some(channel) => manager.set_channel_prefix(channel.id(), Some(prefix.clone())),
        None => manager.set_guild_prefix(Some(prefix.clone())),
    };
    ctx.reply(&format!("Prefix in {} set to `{prefix}`", scope(channel)))
        .await?;
    Ok(())
}

async fn prefix_clear(ctx: CallContext, args: Args) -> CommandResult {
    let channel: Option<ChannelHandle> = args.get("channel")?;
    let manager = ctx.manager();
    let previous = match channel {
        Some(channel) => manager.set_channel_prefix(channel.id(), None),
        None => manager.set_guild_prefix(None),
    };
    let reply = match previous {
        Some(previous) => format!("Cleared prefix `{previous}` in {}", scope(channel)),
        None => format!("No prefix override in {}", scope(channel)),
    };
    ctx.reply(&reply).await?;
    Ok(())
}

async fn prefix_show(ctx: CallContext, args: Args) -> CommandResult {
    let channel = args
        .get::<Option<ChannelHandle>>("channel")?
        .map_or(ctx.channel_id(), |c| c.id());
    let prefix = ctx.manager().prefix_for(channel);
    ctx.reply(&format!("Prefix in channel {channel} is `{prefix}`"))
        .await?;
    Ok(())
}

// ─── maintenance ─────────────────────────────────────────────────────────────

async fn caches_invalidate(ctx: CallContext, args: Args) -> CommandResult {
    let reload = args.get::<Option<bool>>("reload")?.unwrap_or(true);
    ctx.manager().invalidate_caches_with(reload);
    let stats = ctx.manager().cache_stats();
    ctx.reply(&format!("Caches invalidated ({stats})")).await?;
    Ok(())
}

async fn permissions_trim(ctx: CallContext, _args: Args) -> CommandResult {
    let reply = if ctx.manager().trim_permissions() {
        "Trimmed module permissions"
    } else {
        "Module permissions are already minimal"
    };
    ctx.reply(reply).await?;
    Ok(())
}

async fn health(ctx: CallContext, _args: Args) -> CommandResult {
    let lines: Vec<String> = ctx
        .manager()
        .health()
        .iter()
        .map(ToString::to_string)
        .collect();
    ctx.reply(&lines.join("\n")).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_core::{ChannelId, ChannelKind, Interaction, InvokedPath, PlatformValue};

    use crate::dispatcher::DispatchOutcome;
    use crate::module::ModuleStatus;
    use crate::testing::{
        ADMIN_USER, CHANNEL, RecordingPlatform, Sent, builtin_dispatcher, interaction, member,
        with_option,
    };

    fn admin_call(command: &str, sub: Option<&str>, options: &[(&str, PlatformValue)]) -> Interaction {
        let mut path = InvokedPath::command(command);
        if let Some(sub) = sub {
            path = path.subcommand(sub);
        }
        let mut event = interaction(path, member(ADMIN_USER, &[]));
        for (name, value) in options {
            event = with_option(event, name, value.clone());
        }
        event
    }

    fn text(value: &str) -> PlatformValue {
        PlatformValue::String(value.to_string())
    }

    fn last_reply(platform: &RecordingPlatform) -> String {
        match platform.sent().last() {
            Some(Sent::Reply { content, .. }) => content.clone(),
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_requires_permission() {
        let (dispatcher, platform) = builtin_dispatcher().await;
        let mut event = admin_call("health", None, &[]);
        event.member = member(9, &[]);
        assert_eq!(
            dispatcher.dispatch_interaction(event).await,
            DispatchOutcome::PermissionDenied
        );
        assert_eq!(platform.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_module_enablement() {
        let (dispatcher, platform) = builtin_dispatcher().await;
        let outcome = dispatcher
            .dispatch_interaction(admin_call("module", Some("disable"), &[("module", text("Alpha"))]))
            .await;
        assert_eq!(outcome, DispatchOutcome::Completed);
        assert_eq!(
            last_reply(&platform),
            "Module alpha disabled, it will unload after a restart"
        );
        assert_eq!(
            dispatcher.manager().registry().status("alpha"),
            Some(ModuleStatus::PendingDisabled)
        );

        dispatcher
            .dispatch_interaction(admin_call("module", Some("status"), &[("module", text("alpha"))]))
            .await;
        assert_eq!(
            last_reply(&platform),
            "Module alpha is disabled (restart required)"
        );

        dispatcher
            .dispatch_interaction(admin_call("module", Some("enable"), &[("module", text("ghost"))]))
            .await;
        assert_eq!(
            platform.sent().last(),
            Some(&Sent::Reply {
                content: "Module ghost does not exist".into(),
                ephemeral: true
            })
        );
    }

    #[tokio::test]
    async fn test_module_list() {
        let (dispatcher, platform) = builtin_dispatcher().await;
        dispatcher
            .dispatch_interaction(admin_call("module", Some("list"), &[]))
            .await;
        let listed = last_reply(&platform);
        assert!(listed.contains("**admin**: enabled"));
        assert!(listed.contains("**ping**: enabled"));
    }

    #[tokio::test]
    async fn test_block_in_channel_keeps_registration() {
        let (dispatcher, platform) = builtin_dispatcher().await;
        let channel = PlatformValue::Channel {
            id: CHANNEL,
            kind: ChannelKind::Text,
        };
        dispatcher
            .dispatch_interaction(admin_call(
                "block",
                Some("module"),
                &[("module", text("beta")), ("channel", channel)],
            ))
            .await;
        assert_eq!(
            last_reply(&platform),
            "Module is permitted in the guild, now blocked in channel"
        );
        assert!(!dispatcher.manager().resolve_channel(CHANNEL).contains("beta"));
        assert_eq!(platform.registered.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_block_in_guild_resyncs_tree() {
        let (dispatcher, platform) = builtin_dispatcher().await;
        assert!(dispatcher.manager().lookup("beta/quiet").is_some());

        dispatcher
            .dispatch_interaction(admin_call("block", Some("module"), &[("module", text("beta"))]))
            .await;
        assert_eq!(last_reply(&platform), "Module beta blocked in the guild");
        assert_eq!(platform.registered.lock().len(), 2);
        assert!(dispatcher.manager().lookup("beta/quiet").is_none());

        dispatcher
            .dispatch_interaction(admin_call("permit", Some("module"), &[("module", text("beta"))]))
            .await;
        assert_eq!(last_reply(&platform), "Module beta permitted in the guild");
        assert!(dispatcher.manager().lookup("beta/quiet").is_some());
    }

    #[tokio::test]
    async fn test_permission_grant_updates_privileges() {
        let (dispatcher, platform) = builtin_dispatcher().await;
        dispatcher
            .dispatch_interaction(admin_call(
                "permission",
                Some("grant"),
                &[("permission", text("cmd:beta")), ("user", PlatformValue::User(UserId(5)))],
            ))
            .await;
        assert_eq!(last_reply(&platform), "Granted cmd:beta to user 5");

        let privileges = platform.privileges.lock();
        let beta = privileges
            .last()
            .and_then(|p| p.iter().find(|p| p.command == "beta"))
            .cloned();
        assert!(beta.is_some_and(|p| p.users.contains(&UserId(5))));
    }

    #[tokio::test]
    async fn test_permission_needs_a_target() {
        let (dispatcher, platform) = builtin_dispatcher().await;
        dispatcher
            .dispatch_interaction(admin_call(
                "permission",
                Some("revoke"),
                &[("permission", text("cmd:beta"))],
            ))
            .await;
        assert_eq!(
            platform.sent().last(),
            Some(&Sent::Reply {
                content: "Specify a user or a role".into(),
                ephemeral: true
            })
        );
    }

    #[tokio::test]
    async fn test_all_permissions_list_resyncs_privileges() {
        let (dispatcher, platform) = builtin_dispatcher().await;
        let user = ("user", PlatformValue::User(UserId(7)));

        dispatcher
            .dispatch_interaction(admin_call("permission", Some("grant-all"), &[user.clone()]))
            .await;
        assert_eq!(last_reply(&platform), "User 7 now has every permission");
        assert_eq!(platform.privileges.lock().len(), 2);
        assert!(dispatcher.manager().permissions().snapshot().has_all_permissions(UserId(7)));

        dispatcher
            .dispatch_interaction(admin_call("permission", Some("grant-all"), &[user.clone()]))
            .await;
        assert_eq!(last_reply(&platform), "User 7 already has every permission");
        assert_eq!(platform.privileges.lock().len(), 2);

        dispatcher
            .dispatch_interaction(admin_call("permission", Some("revoke-all"), &[user]))
            .await;
        assert_eq!(last_reply(&platform), "User 7 no longer has every permission");
        assert!(!dispatcher.manager().permissions().snapshot().has_all_permissions(UserId(7)));
    }

    #[tokio::test]
    async fn test_prefix_overrides() {
        let (dispatcher, platform) = builtin_dispatcher().await;
        let manager = dispatcher.manager();
        let channel = (
            "channel",
            PlatformValue::Channel {
                id: CHANNEL,
                kind: ChannelKind::Text,
            },
        );
        let other = ChannelId(CHANNEL.0 + 50);

        dispatcher
            .dispatch_interaction(admin_call("prefix", Some("set"), &[("prefix", text("?"))]))
            .await;
        assert_eq!(last_reply(&platform), "Prefix in the guild set to `?`");
        assert_eq!(manager.prefix_for(other), "?");

        dispatcher
            .dispatch_interaction(admin_call(
                "prefix",
                Some("set"),
                &[("prefix", text("$$")), channel.clone()],
            ))
            .await;
        assert_eq!(manager.prefix_for(CHANNEL), "$$");
        assert_eq!(manager.prefix_for(other), "?");

        dispatcher
            .dispatch_interaction(admin_call("prefix", Some("set"), &[("prefix", text("a b"))]))
            .await;
        assert_eq!(
            platform.sent().last(),
            Some(&Sent::Reply {
                content: "A prefix must be non-empty and contain no whitespace".into(),
                ephemeral: true
            })
        );

        dispatcher
            .dispatch_interaction(admin_call("prefix", Some("clear"), &[channel.clone()]))
            .await;
        assert_eq!(
            last_reply(&platform),
            format!("Cleared prefix `$$` in channel {CHANNEL}")
        );
        dispatcher
            .dispatch_interaction(admin_call("prefix", Some("show"), &[]))
            .await;
        assert_eq!(last_reply(&platform), format!("Prefix in channel {CHANNEL} is `?`"));

        dispatcher
            .dispatch_interaction(admin_call("prefix", Some("clear"), &[channel]))
            .await;
        assert_eq!(
            last_reply(&platform),
            format!("No prefix override in channel {CHANNEL}")
        );
    }

    #[tokio::test]
    async fn test_cache_invalidation_without_reload() {
        let (dispatcher, platform) = builtin_dispatcher().await;
        dispatcher.manager().modules_for_channel(CHANNEL);

        dispatcher
            .dispatch_interaction(admin_call(
                "caches",
                Some("invalidate"),
                &[("reload", PlatformValue::Boolean(false))],
            ))
            .await;
        assert!(last_reply(&platform).contains("0 channels cached"));

        dispatcher.manager().modules_for_channel(CHANNEL);
        dispatcher
            .dispatch_interaction(admin_call("caches", Some("invalidate"), &[]))
            .await;
        assert!(last_reply(&platform).contains("1 channels cached"));
    }

    #[tokio::test]
    async fn test_maintenance_commands() {
        let (dispatcher, platform) = builtin_dispatcher().await;

        dispatcher
            .dispatch_interaction(admin_call("caches", Some("invalidate"), &[]))
            .await;
        assert!(last_reply(&platform).starts_with("Caches invalidated ("));

        dispatcher.manager().permit_in_channel(CHANNEL, "ghost");
        dispatcher
            .dispatch_interaction(admin_call("permissions", Some("trim"), &[]))
            .await;
        assert_eq!(last_reply(&platform), "Trimmed module permissions");

        dispatcher
            .dispatch_interaction(admin_call("health", None, &[]))
            .await;
        let report = last_reply(&platform);
        assert!(report.contains("ModuleRegistry"));
        assert!(report.contains("Persistence"));
    }
}
