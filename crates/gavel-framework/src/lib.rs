//! # Gavel Framework
//!
//! Turns module declarations into a live, permission-checked command surface.
//!
//! ```text
//! ModuleDescriptor ──► ModuleRegistry ──► compiler ──► CommandDescriptor
//!                                                            │
//!          PermitBlockConfig ──► VisibilityCache ──► tree assembler ──► PathIndex
//!                                                            │              │
//!                                                     Platform (register)   │
//!                                                                           ▼
//!                              Interaction / MessageEvent ──────────► Dispatcher
//! ```
//!
//! - **Declarations**: [`CommandDecl`] and [`TextCommandDecl`] builders, compiled by
//!   [`compile_commands`] and [`compile_text_commands`]
//! - **Modules**: [`BotModule`], [`ModuleDescriptor`] and [`register_module!`]
//! - **State hub**: [`ModuleManager`] owns registry, grants, permit/block sets,
//!   caches and the live path index
//! - **Tree**: [`assemble`] builds the registrable tree and the dispatch index
//! - **Dispatch**: [`Dispatcher`] for slash interactions, component callbacks
//!   and prefixed text, after fanning each [`InboundEvent`] out to module
//!   listeners
//! - **Components**: [`ComponentRegistry`] of button and select-menu callbacks
//!
//! The `builtin-modules` feature (default) adds the `admin`, `help` and
//! `ping` modules.

pub mod cache;
pub mod compiler;
pub mod component;
pub mod context;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod manager;
pub mod module;
pub mod prefix;
pub mod registry;
pub mod text;
pub mod tree;
pub mod trie;
pub mod visibility;

#[cfg(feature = "builtin-modules")]
pub mod builtin;

#[cfg(test)]
mod testing;

#[doc(hidden)]
pub mod __private {
    pub use linkme;
}

pub use cache::{CacheStats, VisibilityCache};
pub use compiler::{CommandDecl, CompiledCommands, ParamDecl, SkipReason, compile_commands};
pub use component::{ComponentCallback, ComponentFn, ComponentRegistry, StaleCheck};
pub use context::{CallContext, ComponentContext, TextContext};
pub use descriptor::{ArgType, ArgValue, Args, ChannelHandle, CommandDescriptor, command_path};
pub use dispatcher::{DispatchOutcome, Dispatcher, InboundEvent};
pub use error::{
    CommandError, CommandResult, DispatchError, FrameworkError, FrameworkResult, ModuleLoadError,
    TreeError,
};
pub use manager::{ManagerSettings, ModuleManager, SyncSummary};
pub use module::{
    BOT_MODULES, BotModule, GroupDescription, ModuleDescriptor, ModuleFactory, ModuleStatus,
};
pub use prefix::PrefixSettings;
pub use registry::{EnabledModules, LoadedModule, ModuleRegistry};
pub use text::{TextCommand, TextCommandDecl, compile_text_commands};
pub use tree::{AssembledTree, PathIndex, TreeAssembler, TreeDiagnostic, assemble};
pub use trie::CommandTrie;
pub use visibility::{BlockOutcome, PermitBlockConfig, PermitOutcome};
