//! Lists what is available in the calling channel.

use std::sync::Arc;

use gavel_core::BoxError;

use crate::context::TextContext;
use crate::error::CommandResult;
use crate::module::{BotModule, ModuleDescriptor};
use crate::text::TextCommandDecl;

pub const DESCRIPTOR: ModuleDescriptor =
    ModuleDescriptor::new("help", "List available commands and modules", create);

crate::register_module!(HELP_MODULE, DESCRIPTOR);

struct Help;

fn create() -> Result<Arc<dyn BotModule>, BoxError> {
    Ok(Arc::new(Help))
}

impl BotModule for Help {
    fn text_commands(self: Arc<Self>) -> Vec<TextCommandDecl> {
        vec![
            TextCommandDecl::new("list_commands")
                .help("List the commands available in this channel")
                .everyone()
                .handler(|ctx, _args| list_commands(ctx)),
            TextCommandDecl::new("list_modules")
                .help("List the modules active in this channel")
                .everyone()
                .handler(|ctx, _args| list_modules(ctx)),
        ]
    }
}

async fn list_commands(ctx: TextContext) -> CommandResult {
    let commands = ctx.manager().list_text_commands_for_channel(ctx.channel_id());
    let reply = if commands.is_empty() {
        "No commands are available in this channel".to_string()
    } else {
        commands
            .iter()
            .map(|c| {
                if c.help().is_empty() {
                    format!("`{}{}`", ctx.prefix(), c.syntax())
                } else {
                    format!("`{}{}` {}", ctx.prefix(), c.syntax(), c.help())
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    ctx.reply(&reply).await?;
    Ok(())
}

async fn list_modules(ctx: TextContext) -> CommandResult {
    let modules = ctx.manager().modules_for_channel(ctx.channel_id());
    let reply = if modules.is_empty() {
        "No modules are active in this channel".to_string()
    } else {
        modules
            .iter()
            .map(|m| format!("**{}**: {}", m.name(), m.description()))
            .collect::<Vec<_>>()
            .join("\n")
    };
    ctx.reply(&reply).await?;
    Ok(())
}
