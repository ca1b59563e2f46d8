//! Module registry.
//!
//! Owns the module catalog, the persisted enablement set and the loaded
//! instances. The lifecycle of one module:
//!
//! ```text
//! process start ── enabled? ──► load ──┬──► LoadedModule (kept until exit)
//!                                      └──► load error (never retried)
//! enable()/disable() ──► persisted desire only, applied on next start
//! ```
//!
//! The set of modules allowed to load is snapshotted from the enablement
//! set when the registry is built. Loading is compute-if-absent under one
//! lock, so two concurrent lookups never construct the same module twice.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use gavel_core::{HealthReport, HealthStatus, PersistenceResult, PersistentObject, Shared, Store};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::compiler::{SkippedDeclaration, compile_commands};
use crate::descriptor::CommandDescriptor;
use crate::error::ModuleLoadError;
use crate::module::{BotModule, GroupDescription, ModuleDescriptor, ModuleStatus};
use crate::text::{TextCommand, compile_text_commands};

/// Module enabled on a cold start, so the bot can always be administered.
pub const ADMIN_MODULE: &str = "admin";

// =============================================================================
// EnabledModules
// =============================================================================

/// Persisted set of modules that should be loaded on start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnabledModules(BTreeSet<String>);

impl Default for EnabledModules {
    fn default() -> Self {
        Self(BTreeSet::from([ADMIN_MODULE.to_string()]))
    }
}

impl PersistentObject for EnabledModules {
    const KEY: &'static str = "enabled_modules";
}

impl EnabledModules {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn insert(&mut self, name: &str) -> bool {
        self.0.insert(name.to_string())
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

// =============================================================================
// LoadedModule
// =============================================================================

/// A module instance together with its compiled commands.
pub struct LoadedModule {
    name: String,
    description: String,
    instance: Arc<dyn BotModule>,
    commands: Vec<Arc<CommandDescriptor>>,
    text_commands: Vec<Arc<TextCommand>>,
    group_descriptions: Vec<GroupDescription>,
    skipped: Vec<SkippedDeclaration>,
}

impl LoadedModule {
    fn compile(descriptor: &ModuleDescriptor) -> Result<Self, ModuleLoadError> {
        let instance = descriptor
            .instantiate()
            .map_err(ModuleLoadError::Construction)?;

        let compiled = compile_commands(descriptor.name, Arc::clone(&instance).commands())?;
        let text_commands =
            compile_text_commands(descriptor.name, Arc::clone(&instance).text_commands())?;
        let group_descriptions = instance.group_descriptions();
        for description in &group_descriptions {
            description.validate()?;
        }

        Ok(Self {
            name: descriptor.name.to_string(),
            description: descriptor.description.to_string(),
            instance,
            commands: compiled.descriptors.into_iter().map(Arc::new).collect(),
            text_commands: text_commands.into_iter().map(Arc::new).collect(),
            group_descriptions,
            skipped: compiled.skipped,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn instance(&self) -> &Arc<dyn BotModule> {
        &self.instance
    }

    pub fn commands(&self) -> &[Arc<CommandDescriptor>] {
        &self.commands
    }

    pub fn text_commands(&self) -> &[Arc<TextCommand>] {
        &self.text_commands
    }

    pub fn group_descriptions(&self) -> &[GroupDescription] {
        &self.group_descriptions
    }

    /// Declarations the compiler dropped.
    pub fn skipped(&self) -> &[SkippedDeclaration] {
        &self.skipped
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name)
            .field("commands", &self.commands.len())
            .field("text_commands", &self.text_commands.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ModuleRegistry
// =============================================================================

/// Catalog, enablement and loaded instances of every module.
pub struct ModuleRegistry {
    catalog: BTreeMap<&'static str, ModuleDescriptor>,
    enabled: Shared<EnabledModules>,
    /// Enablement as of process start; only these may load.
    startup: BTreeSet<String>,
    loaded: Mutex<HashMap<String, Arc<LoadedModule>>>,
    load_errors: Mutex<BTreeMap<String, String>>,
}

impl ModuleRegistry {
    /// Builds a registry over `modules` with an already-loaded enablement set.
    ///
    /// Duplicate module names keep the first descriptor.
    pub fn new(
        modules: impl IntoIterator<Item = ModuleDescriptor>,
        enabled: Shared<EnabledModules>,
    ) -> Self {
        let mut catalog = BTreeMap::new();
        for descriptor in modules {
            if catalog.contains_key(descriptor.name) {
                warn!(module = descriptor.name, "Duplicate module name, keeping the first");
                continue;
            }
            catalog.insert(descriptor.name, descriptor);
        }
        let startup = enabled.read().iter().map(str::to_string).collect();
        Self {
            catalog,
            enabled,
            startup,
            loaded: Mutex::new(HashMap::new()),
            load_errors: Mutex::new(BTreeMap::new()),
        }
    }

    /// Builds a registry whose enablement set lives in `store`.
    pub fn load(
        store: &Store,
        modules: impl IntoIterator<Item = ModuleDescriptor>,
    ) -> PersistenceResult<Self> {
        let enabled = store.load(EnabledModules::default)?;
        Ok(Self::new(modules, enabled))
    }

    /// Loads every module enabled at startup. Returns how many are loaded.
    pub fn load_startup(&self) -> usize {
        let names: Vec<String> = self.startup.iter().cloned().collect();
        let loaded = names
            .iter()
            .filter(|name| self.active_module(name).is_some())
            .count();
        info!(
            loaded,
            failed = self.load_errors.lock().len(),
            "Startup modules loaded"
        );
        loaded
    }

    /// The loaded instance of `name`, loading it on first use.
    ///
    /// Returns `None` for modules not enabled at startup and for modules
    /// whose load failed.
    pub fn active_module(&self, name: &str) -> Option<Arc<LoadedModule>> {
        if !self.startup.contains(name) {
            return None;
        }
        let mut loaded = self.loaded.lock();
        if let Some(module) = loaded.get(name) {
            return Some(Arc::clone(module));
        }
        if self.load_errors.lock().contains_key(name) {
            return None;
        }

        match self.construct(name) {
            Ok(module) => {
                let module = Arc::new(module);
                loaded.insert(name.to_string(), Arc::clone(&module));
                Some(module)
            }
            Err(e) => {
                error!(module = name, error = %e, "Unable to load module");
                self.load_errors.lock().insert(name.to_string(), e.to_string());
                None
            }
        }
    }

    fn construct(&self, name: &str) -> Result<LoadedModule, ModuleLoadError> {
        let descriptor = self.catalog.get(name).ok_or(ModuleLoadError::NotFound)?;
        info!(module = name, "Loading module");
        let module = LoadedModule::compile(descriptor)?;
        debug!(
            module = name,
            commands = module.commands.len(),
            text_commands = module.text_commands.len(),
            skipped = module.skipped.len(),
            "Module loaded"
        );
        Ok(module)
    }

    /// Loaded instances of the given names, in order, skipping any that are
    /// not active.
    pub fn active_modules<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Vec<Arc<LoadedModule>> {
        names
            .into_iter()
            .filter_map(|name| self.active_module(name))
            .collect()
    }

    /// Every module currently loaded, sorted by name.
    pub fn loaded_modules(&self) -> Vec<Arc<LoadedModule>> {
        let mut modules: Vec<_> = self.loaded.lock().values().cloned().collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));
        modules
    }

    pub fn module_exists(&self, name: &str) -> bool {
        self.catalog.contains_key(name)
    }

    /// Every registered module name, sorted.
    pub fn module_names(&self) -> Vec<&'static str> {
        self.catalog.keys().copied().collect()
    }

    pub fn module_description(&self, name: &str) -> Option<&'static str> {
        self.catalog.get(name).map(|d| d.description)
    }

    /// `None` if no module of that name is registered.
    pub fn status(&self, name: &str) -> Option<ModuleStatus> {
        if !self.module_exists(name) {
            return None;
        }
        let enabled = self.enabled.read().contains(name);
        let loaded = self.loaded.lock().contains_key(name);
        Some(ModuleStatus::from_state(enabled, loaded))
    }

    /// Marks `name` enabled for the next start.
    ///
    /// Returns `false` for unknown modules and when nothing changed.
    pub fn enable(&self, name: &str) -> bool {
        if !self.module_exists(name) {
            return false;
        }
        let changed = self.enabled.write().insert(name);
        if changed {
            info!(module = name, "Enabled module");
        }
        changed
    }

    /// Marks `name` disabled for the next start.
    pub fn disable(&self, name: &str) -> bool {
        if !self.module_exists(name) {
            return false;
        }
        let changed = self.enabled.write().remove(name);
        if changed {
            info!(module = name, "Disabled module");
        }
        changed
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.read().contains(name)
    }

    /// Recorded load failures, keyed by module name.
    pub fn load_errors(&self) -> BTreeMap<String, String> {
        self.load_errors.lock().clone()
    }

    pub fn health(&self) -> HealthReport {
        let failed = self.load_errors.lock().len();
        if failed > 0 {
            HealthReport::new("ModuleRegistry", HealthStatus::ErrorNoncritical)
                .with_message(format!("Error loading {failed} modules"))
        } else {
            HealthReport::new("ModuleRegistry", HealthStatus::Running)
        }
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("catalog", &self.catalog.keys().collect::<Vec<_>>())
            .field("startup", &self.startup)
            .field("loaded", &self.loaded.lock().len())
            .finish_non_exhaustive()
    }
}
