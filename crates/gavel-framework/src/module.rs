//! Bot modules: the unit of enablement and visibility.
//!
//! A module is a value implementing [`BotModule`], created from a static,
//! `Copy` [`ModuleDescriptor`]. Modules are collected once at startup, either
//! passed explicitly to the runtime builder or contributed at link time with
//! [`register_module!`](crate::register_module).
//!
//! ```rust,ignore
//! struct Ping;
//!
//! impl BotModule for Ping {
//!     fn commands(self: Arc<Self>) -> Vec<CommandDecl> {
//!         vec![CommandDecl::new("ping")
//!             .description("Check that the bot is alive")
//!             .everyone()
//!             .handler(|ctx, _args| async move {
//!                 ctx.reply("Pong!").await?;
//!                 Ok(())
//!             })]
//!     }
//! }
//!
//! gavel_framework::register_module!(
//!     PING,
//!     ModuleDescriptor::new("ping", "Liveness check", || Ok(Arc::new(Ping)))
//! );
//! ```

use std::fmt;
use std::sync::Arc;

use gavel_core::{BoxError, DefinitionResult, validate_description, validate_name};
use linkme::distributed_slice;

use crate::compiler::CommandDecl;
use crate::dispatcher::InboundEvent;
use crate::text::TextCommandDecl;

// ─── BotModule ────────────────────────────────────────────────────────────────

/// A loaded module instance.
///
/// Command declarations take `self: Arc<Self>` so handlers can capture the
/// instance and reach its state.
pub trait BotModule: Send + Sync + 'static {
    /// Slash command declarations.
    fn commands(self: Arc<Self>) -> Vec<CommandDecl> {
        Vec::new()
    }

    /// Free-text command declarations.
    fn text_commands(self: Arc<Self>) -> Vec<TextCommandDecl> {
        Vec::new()
    }

    /// Descriptions for tree nodes that have no leaf command of their own.
    fn group_descriptions(&self) -> Vec<GroupDescription> {
        Vec::new()
    }

    /// Sees every inbound event before it is routed.
    ///
    /// Runs on the dispatch task, so it must not block. Spawn for real work.
    fn on_event(&self, _event: &InboundEvent) {}
}

/// Factory signature stored in a [`ModuleDescriptor`].
pub type ModuleFactory = fn() -> Result<Arc<dyn BotModule>, BoxError>;

// ─── ModuleDescriptor ─────────────────────────────────────────────────────────

/// A static, `Copy` handle that names and instantiates a module.
#[derive(Clone, Copy)]
pub struct ModuleDescriptor {
    /// Lowercase module name, used in persisted settings and admin commands.
    pub name: &'static str,
    pub description: &'static str,
    pub create: ModuleFactory,
}

impl ModuleDescriptor {
    pub const fn new(name: &'static str, description: &'static str, create: ModuleFactory) -> Self {
        Self {
            name,
            description,
            create,
        }
    }

    #[inline]
    pub fn instantiate(&self) -> Result<Arc<dyn BotModule>, BoxError> {
        (self.create)()
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Modules contributed at link time.
#[distributed_slice]
pub static BOT_MODULES: [ModuleDescriptor];

/// Adds a [`ModuleDescriptor`] to [`BOT_MODULES`].
#[macro_export]
macro_rules! register_module {
    ($static_name:ident, $descriptor:expr $(,)?) => {
        #[$crate::__private::linkme::distributed_slice($crate::module::BOT_MODULES)]
        #[linkme(crate = $crate::__private::linkme)]
        static $static_name: $crate::module::ModuleDescriptor = $descriptor;
    };
}

// ─── ModuleStatus ─────────────────────────────────────────────────────────────

/// Cross of the persisted desire and the runtime load state.
///
/// ```text
///                 loaded        not loaded
/// enabled     │ Enabled       │ PendingEnabled
/// disabled    │ PendingDisabled │ Disabled
/// ```
///
/// Instances are never unloaded at runtime, so the pending states only
/// resolve on restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Enabled,
    PendingEnabled,
    Disabled,
    PendingDisabled,
}

impl ModuleStatus {
    pub fn from_state(enabled: bool, loaded: bool) -> Self {
        match (enabled, loaded) {
            (true, true) => Self::Enabled,
            (true, false) => Self::PendingEnabled,
            (false, true) => Self::PendingDisabled,
            (false, false) => Self::Disabled,
        }
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enabled => "enabled",
            Self::PendingEnabled => "enabled (restart required)",
            Self::Disabled => "disabled",
            Self::PendingDisabled => "disabled (restart required)",
        })
    }
}

// ─── GroupDescription ─────────────────────────────────────────────────────────

/// Description for a top-level command or a subcommand group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescription {
    pub command: String,
    pub group: Option<String>,
    pub description: String,
}

impl GroupDescription {
    /// Describes the top-level node `command`.
    pub fn command(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            group: None,
            description: description.into(),
        }
    }

    /// Describes the group `group` under `command`.
    pub fn group(
        command: impl Into<String>,
        group: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            group: Some(group.into()),
            description: description.into(),
        }
    }

    pub fn validate(&self) -> DefinitionResult<()> {
        validate_name("command", &self.command)?;
        let owner = match &self.group {
            Some(group) => {
                validate_name("subcommand group", group)?;
                format!("{}/{group}", self.command)
            }
            None => self.command.clone(),
        };
        validate_description(&owner, &self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_core::DefinitionError;

    struct Empty;
    impl BotModule for Empty {}

    fn create_empty() -> Result<Arc<dyn BotModule>, BoxError> {
        Ok(Arc::new(Empty))
    }

    crate::register_module!(
        LINKED_TEST_MODULE,
        ModuleDescriptor::new("linked-test", "Registered through the slice", create_empty)
    );

    #[test]
    fn test_linked_module_is_collected() {
        let found = BOT_MODULES.iter().find(|d| d.name == "linked-test");
        let descriptor = found.copied().unwrap();
        assert!(descriptor.instantiate().is_ok());
    }

    #[test]
    fn test_status_cross() {
        assert_eq!(ModuleStatus::from_state(true, true), ModuleStatus::Enabled);
        assert_eq!(ModuleStatus::from_state(true, false), ModuleStatus::PendingEnabled);
        assert_eq!(ModuleStatus::from_state(false, true), ModuleStatus::PendingDisabled);
        assert_eq!(ModuleStatus::from_state(false, false), ModuleStatus::Disabled);
    }

    #[test]
    fn test_group_description_validation() {
        assert!(GroupDescription::group("admin", "caches", "Cache control").validate().is_ok());
        assert!(matches!(
            GroupDescription::command("admin", "").validate(),
            Err(DefinitionError::DescriptionLength { .. })
        ));
        assert!(matches!(
            GroupDescription::group("admin", "bad group", "x").validate(),
            Err(DefinitionError::NameCharset { .. })
        ));
    }
}
