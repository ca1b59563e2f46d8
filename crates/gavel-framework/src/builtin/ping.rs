//! Liveness check.

use std::sync::Arc;

use gavel_core::BoxError;

use crate::compiler::CommandDecl;
use crate::module::{BotModule, ModuleDescriptor};
use crate::text::TextCommandDecl;

pub const DESCRIPTOR: ModuleDescriptor =
    ModuleDescriptor::new("ping", "Check that the bot is responding", create);

crate::register_module!(PING_MODULE, DESCRIPTOR);

const PONG: &str = "Pong!";

struct Ping;

fn create() -> Result<Arc<dyn BotModule>, BoxError> {
    Ok(Arc::new(Ping))
}

impl BotModule for Ping {
    fn commands(self: Arc<Self>) -> Vec<CommandDecl> {
        vec![
            CommandDecl::new("ping")
                .description("Check that the bot is responding")
                .everyone()
                .handler(|ctx, _args| async move {
                    ctx.reply(PONG).await?;
                    Ok(())
                }),
        ]
    }

    fn text_commands(self: Arc<Self>) -> Vec<TextCommandDecl> {
        vec![
            TextCommandDecl::new("ping")
                .help("Check that the bot is responding")
                .everyone()
                .handler(|ctx, _args| async move {
                    ctx.reply(PONG).await?;
                    Ok(())
                }),
        ]
    }
}
