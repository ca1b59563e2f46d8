//! # Gavel
//!
//! A command engine for a bot serving one guild. Modules declare slash and text commands;
//! Gavel decides where each module is visible, who may run each command, registers the
//! resulting tree with the platform and routes every inbound event to its handler.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────────┐   ┌───────────────────────────────┐
//! │ Gateway  │──▶│ GavelRuntime    │──▶│ Dispatcher                    │──▶ handler
//! │ (events) │   │ (worker pool)   │   │  path index / text trie       │
//! └──────────┘   └─────────────────┘   │  permission check             │
//!                        │             └───────────────────────────────┘
//!                        ▼                            ▲
//!                ┌─────────────────┐   ┌───────────────────────────────┐
//!                │ Store (JSON)    │◀──│ ModuleManager                 │
//!                └─────────────────┘   │  registry, grants, permit/block│
//!                                      │  visibility caches, tree      │
//!                                      └───────────────────────────────┘
//! ```
//!
//! - [`core`]: identifiers, parameter and permission models, persistence, platform trait
//! - [`framework`]: declarations, modules, visibility, tree assembly, dispatch
//! - [`runtime`]: configuration, logging, JSON storage and the event loop
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gavel::prelude::*;
//!
//! struct Greeter;
//!
//! impl BotModule for Greeter {
//!     fn commands(self: Arc<Self>) -> Vec<CommandDecl> {
//!         vec![CommandDecl::new("hello")
//!             .description("Say hello")
//!             .everyone()
//!             .handler(|ctx, _args| async move {
//!                 ctx.reply("Hello!").await?;
//!                 Ok(())
//!             })]
//!     }
//! }
//!
//! fn create() -> Result<Arc<dyn BotModule>, BoxError> {
//!     Ok(Arc::new(Greeter))
//! }
//!
//! register_module!(GREETER, ModuleDescriptor::new("greeter", "Greetings", create));
//!
//! #[tokio::main]
//! async fn main() -> RuntimeResult<()> {
//!     let runtime = GavelRuntime::builder().platform(my_platform()).build()?;
//!     runtime.run().await
//! }
//! ```
//!
//! ## Features
//!
//! - `builtin-modules` *(default)*: `admin`, `help` and `ping`
//! - `toml-config` *(default)*, `yaml-config`: configuration file formats
//! - `json-log`: JSON log lines

pub use gavel_core as core;
pub use gavel_framework as framework;
pub use gavel_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use gavel::prelude::*;
/// ```
pub mod prelude {
    // Runtime
    pub use gavel_runtime::{GavelRuntime, InboundEvent, RuntimeError, RuntimeResult};

    // Declaring modules
    pub use gavel_framework::{
        Args, BotModule, CallContext, CommandDecl, CommandError, CommandResult, ComponentContext,
        GroupDescription, ModuleDescriptor, ParamDecl, TextCommandDecl, TextContext,
        register_module,
    };

    // Argument types
    pub use gavel_framework::ChannelHandle;
    pub use gavel_core::{ChannelId, GuildId, RoleId, UserId};

    // Platform integration
    pub use gavel_core::{
        BoxError, BoxedPlatform, ComponentEvent, ComponentKind, Interaction, MessageEvent, Platform,
    };
}
