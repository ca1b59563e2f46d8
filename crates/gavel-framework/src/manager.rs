//! The module manager: one explicit hub for everything dispatch needs.
//!
//! [`ModuleManager`] owns the module registry, the permission tables, the
//! permit/block sets, the prefix settings, the visibility cache, the live
//! path index and the component callbacks. It is built once at startup and shared as an
//! `Arc<ModuleManager>` with the dispatcher and with every call context.
//!
//! # Locking
//!
//! ```text
//! cache (Mutex) ──► permit/block config (RwLock) ──► registry
//! ```
//!
//! Locks are always taken in this order. Every permission-affecting write
//! holds the cache lock across "mutate, clear, rebuild", so a reader sees
//! either the state before the write or the state after it. The path index
//! sits behind its own lock and is replaced whole, never edited.

use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use gavel_core::{
    ChannelId, GuildId, HealthReport, PersistenceResult, PermissionManager, Platform, RoleId,
    Shared, Store, UserId,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStats, ModuleList, TextIndex, VisibilityCache};
use crate::component::ComponentRegistry;
use crate::descriptor::CommandDescriptor;
use crate::dispatcher::InboundEvent;
use crate::error::FrameworkResult;
use crate::module::ModuleDescriptor;
use crate::prefix::{DEFAULT_PREFIX, PrefixSettings};
use crate::registry::{LoadedModule, ModuleRegistry};
use crate::text::TextCommand;
use crate::tree::{AssembledTree, PathIndex, TreeAssembler};
use crate::trie::CommandTrie;
use crate::visibility::{BlockOutcome, PermitBlockConfig, PermitOutcome};

// =============================================================================
// Settings
// =============================================================================

/// Deployment settings for a [`ModuleManager`].
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// The single guild this deployment serves.
    pub target_guild: GuildId,
    /// The guild's default role; role permissions on it mean everyone.
    pub public_role: RoleId,
    /// Treat any command tree conflict as fatal.
    pub strict_conflicts: bool,
    /// Rebuild caches for known channels right after each flush.
    pub eager_cache_rebuild: bool,
    /// Prefix used until a guild or channel override exists.
    pub default_prefix: String,
}

impl ManagerSettings {
    /// Settings for `target_guild`, whose public role shares its id.
    pub fn new(target_guild: GuildId) -> Self {
        Self {
            target_guild,
            public_role: RoleId(target_guild.get()),
            strict_conflicts: false,
            eager_cache_rebuild: true,
            default_prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    pub fn public_role(mut self, role: RoleId) -> Self {
        self.public_role = role;
        self
    }

    pub fn strict_conflicts(mut self, strict: bool) -> Self {
        self.strict_conflicts = strict;
        self
    }

    pub fn eager_cache_rebuild(mut self, eager: bool) -> Self {
        self.eager_cache_rebuild = eager;
        self
    }

    pub fn default_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.default_prefix = prefix.into();
        self
    }
}

/// What one [`ModuleManager::sync_commands`] pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub commands: usize,
    pub paths: usize,
    pub privileges: usize,
    pub diagnostics: usize,
}

// =============================================================================
// ModuleManager
// =============================================================================

pub struct ModuleManager {
    settings: ManagerSettings,
    store: Arc<Store>,
    registry: ModuleRegistry,
    permissions: PermissionManager,
    config: Shared<PermitBlockConfig>,
    prefixes: Shared<PrefixSettings>,
    cache: Mutex<VisibilityCache>,
    index: RwLock<Arc<PathIndex>>,
    components: ComponentRegistry,
}

impl ModuleManager {
    /// Loads persisted state from `store` and every startup module.
    ///
    /// The path index starts empty; it is filled by
    /// [`sync_commands`](Self::sync_commands) or [`install_index`](Self::install_index).
    pub fn new(
        store: Arc<Store>,
        modules: impl IntoIterator<Item = ModuleDescriptor>,
        settings: ManagerSettings,
    ) -> FrameworkResult<Self> {
        let registry = ModuleRegistry::load(&store, modules)?;
        let permissions = PermissionManager::load(&store, settings.public_role)?;
        let default_prefix = settings.default_prefix.clone();
        let prefixes = store.load({
            let default_prefix = default_prefix.clone();
            move || PrefixSettings::new(default_prefix)
        })?;
        prefixes.write().set_global(default_prefix);
        let config = store.load(PermitBlockConfig::default)?;

        let repaired = config.write().repair();
        if !repaired.is_empty() {
            store.save(&config)?;
        }

        let mut cache = VisibilityCache::new();
        cache.remember_channels(config.read().channels());

        registry.load_startup();

        Ok(Self {
            settings,
            store,
            registry,
            permissions,
            config,
            prefixes,
            cache: Mutex::new(cache),
            index: RwLock::new(Arc::new(PathIndex::new())),
            components: ComponentRegistry::new(),
        })
    }

    /// A manager over a fresh in-memory store.
    pub fn in_memory(
        modules: impl IntoIterator<Item = ModuleDescriptor>,
        settings: ManagerSettings,
    ) -> FrameworkResult<Self> {
        Self::new(Arc::new(Store::in_memory()), modules, settings)
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn target_guild(&self) -> GuildId {
        self.settings.target_guild
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn permissions(&self) -> &PermissionManager {
        &self.permissions
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Button and select-menu callbacks.
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Writes every persisted record now.
    pub fn persist(&self) -> PersistenceResult<()> {
        self.store.save_all()
    }

    // ─── Enablement ──────────────────────────────────────────────────────────

    /// Enables `name` for the next start. See [`ModuleRegistry::enable`].
    pub fn enable_module(&self, name: &str) -> bool {
        let mut cache = self.cache.lock();
        let changed = self.registry.enable(name);
        self.flush(&mut cache);
        changed
    }

    /// Disables `name` for the next start. See [`ModuleRegistry::disable`].
    pub fn disable_module(&self, name: &str) -> bool {
        let mut cache = self.cache.lock();
        let changed = self.registry.disable(name);
        self.flush(&mut cache);
        changed
    }

    // ─── Visibility ──────────────────────────────────────────────────────────

    /// Names of the modules permitted in `channel`.
    pub fn resolve_channel(&self, channel: ChannelId) -> BTreeSet<String> {
        self.config.read().resolve_channel(channel)
    }

    /// Names of the modules permitted guild-wide.
    pub fn resolve_guild(&self) -> BTreeSet<String> {
        self.config.read().resolve_guild()
    }

    pub fn permit_in_guild(&self, module: &str) -> bool {
        self.write_visibility(|config| config.permit_in_guild(module))
    }

    pub fn block_in_guild(&self, module: &str) -> bool {
        self.write_visibility(|config| config.block_in_guild(module))
    }

    pub fn permit_in_channel(&self, channel: ChannelId, module: &str) -> PermitOutcome {
        self.write_visibility(|config| config.permit_in_channel(channel, module))
    }

    pub fn block_in_channel(&self, channel: ChannelId, module: &str) -> BlockOutcome {
        self.write_visibility(|config| config.block_in_channel(channel, module))
    }

    /// Drops redundant permit/block entries and unknown module names.
    pub fn trim_permissions(&self) -> bool {
        self.write_visibility(|config| config.trim(|m| self.registry.module_exists(m)))
    }

    /// A copy of the permit/block sets.
    pub fn permit_block_config(&self) -> PermitBlockConfig {
        self.config.read().clone()
    }

    fn write_visibility<R>(&self, mutate: impl FnOnce(&mut PermitBlockConfig) -> R) -> R {
        let mut cache = self.cache.lock();
        let result = mutate(&mut self.config.write());
        self.flush(&mut cache);
        result
    }

    // ─── Grants ──────────────────────────────────────────────────────────────

    pub fn grant_user(&self, user: UserId, permission: &str) -> bool {
        self.write_grants(|p| p.grant_user(user, permission))
    }

    pub fn revoke_user(&self, user: UserId, permission: &str) -> bool {
        self.write_grants(|p| p.revoke_user(user, permission))
    }

    pub fn grant_role(&self, role: RoleId, permission: &str) -> bool {
        self.write_grants(|p| p.grant_role(role, permission))
    }

    pub fn revoke_role(&self, role: RoleId, permission: &str) -> bool {
        self.write_grants(|p| p.revoke_role(role, permission))
    }

    /// Gives `user` every permission, present and future.
    pub fn grant_all(&self, user: UserId) -> bool {
        self.write_grants(|p| p.grant_all(user))
    }

    pub fn revoke_all(&self, user: UserId) -> bool {
        self.write_grants(|p| p.revoke_all(user))
    }

    fn write_grants(&self, mutate: impl FnOnce(&PermissionManager) -> bool) -> bool {
        let mut cache = self.cache.lock();
        let changed = mutate(&self.permissions);
        self.flush(&mut cache);
        changed
    }

    // ─── Cached lookups ──────────────────────────────────────────────────────

    /// Loaded modules visible in `channel`, sorted by name.
    pub fn modules_for_channel(&self, channel: ChannelId) -> ModuleList {
        let mut cache = self.cache.lock();
        self.channel_modules_locked(&mut cache, channel)
    }

    /// Loaded modules visible guild-wide, sorted by name.
    pub fn modules_for_guild(&self) -> ModuleList {
        let mut cache = self.cache.lock();
        self.guild_modules_locked(&mut cache)
    }

    /// The text command trie for `channel`.
    pub fn commands_for_channel(&self, channel: ChannelId) -> TextIndex {
        let mut cache = self.cache.lock();
        self.channel_commands_locked(&mut cache, channel)
    }

    /// Text commands visible in `channel`, sorted by display name.
    pub fn list_text_commands_for_channel(&self, channel: ChannelId) -> Vec<Arc<TextCommand>> {
        let mut commands: Vec<Arc<TextCommand>> = self
            .commands_for_channel(channel)
            .values()
            .into_iter()
            .cloned()
            .collect();
        commands.sort_by(|a, b| a.name().cmp(b.name()));
        commands
    }

    /// Computes and caches visibility for `channels` ahead of first use.
    pub fn preload(&self, channels: impl IntoIterator<Item = ChannelId>) {
        let mut cache = self.cache.lock();
        for channel in channels {
            self.channel_commands_locked(&mut cache, channel);
        }
        self.guild_modules_locked(&mut cache);
    }

    /// Drops every cached visibility result.
    pub fn invalidate_caches(&self) {
        self.invalidate_caches_with(self.settings.eager_cache_rebuild);
    }

    /// Drops every cached visibility result, rebuilding recently read
    /// channels only when `rebuild` is set.
    pub fn invalidate_caches_with(&self, rebuild: bool) {
        let mut cache = self.cache.lock();
        self.flush_with(&mut cache, rebuild);
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    fn channel_modules_locked(&self, cache: &mut VisibilityCache, channel: ChannelId) -> ModuleList {
        cache.channel_modules(channel, || {
            let names = self.config.read().resolve_channel(channel);
            self.active(names)
        })
    }

    fn channel_commands_locked(&self, cache: &mut VisibilityCache, channel: ChannelId) -> TextIndex {
        let modules = self.channel_modules_locked(cache, channel);
        cache.channel_commands(channel, || Arc::new(text_index(&modules)))
    }

    fn guild_modules_locked(&self, cache: &mut VisibilityCache) -> ModuleList {
        cache.guild_modules(|| {
            let names = self.config.read().resolve_guild();
            self.active(names)
        })
    }

    fn active(&self, names: BTreeSet<String>) -> ModuleList {
        Arc::from(self.registry.active_modules(names.iter().map(String::as_str)))
    }

    /// Clears the cache and, when configured, rebuilds it for the channels
    /// read since the previous flush.
    ///
    /// Rebuilt channels are not tracked again, so a channel idle between two
    /// writes drops out of the rebuild set.
    fn flush(&self, cache: &mut VisibilityCache) {
        self.flush_with(cache, self.settings.eager_cache_rebuild);
    }

    fn flush_with(&self, cache: &mut VisibilityCache, rebuild: bool) {
        let channels = cache.clear();
        if !rebuild {
            debug!("Visibility caches flushed");
            return;
        }
        for channel in &channels {
            self.channel_commands_locked(cache, *channel);
        }
        self.guild_modules_locked(cache);
        cache.untrack();
        debug!(channels = channels.len(), "Visibility caches flushed and rebuilt");
    }

    // ─── Command tree ────────────────────────────────────────────────────────

    /// Assembles the tree for the modules visible guild-wide.
    pub fn assemble_tree(&self) -> AssembledTree {
        let modules = self.modules_for_guild();
        let mut assembler = TreeAssembler::new().public_role(self.settings.public_role);
        assembler.insert_modules(modules.iter().map(Arc::as_ref));
        assembler.finish()
    }

    /// Registers the current tree with the platform, then swaps in its index.
    pub async fn sync_commands(&self, platform: &dyn Platform) -> FrameworkResult<SyncSummary> {
        let tree = self.assemble_tree();
        tree.check(self.settings.strict_conflicts)?;

        let privileges = tree.privileges(&self.permissions);
        let summary = SyncSummary {
            commands: tree.commands.len(),
            paths: tree.index.len(),
            privileges: privileges.len(),
            diagnostics: tree.diagnostics.len(),
        };

        platform
            .register_commands(self.settings.target_guild, tree.commands)
            .await?;
        platform
            .update_privileges(self.settings.target_guild, privileges)
            .await?;
        self.install_index(tree.index);

        info!(
            commands = summary.commands,
            paths = summary.paths,
            privileges = summary.privileges,
            diagnostics = summary.diagnostics,
            "Command tree synchronized"
        );
        Ok(summary)
    }

    /// Replaces the live path index.
    pub fn install_index(&self, index: PathIndex) {
        *self.index.write() = Arc::new(index);
    }

    pub fn path_index(&self) -> Arc<PathIndex> {
        self.index.read().clone()
    }

    pub fn lookup(&self, path: &str) -> Option<Arc<CommandDescriptor>> {
        self.index.read().get(path).cloned()
    }

    // ─── Listeners ───────────────────────────────────────────────────────────

    /// Hands `event` to every loaded module's listener, in name order.
    ///
    /// A listener that panics is logged and skipped; the others still run.
    /// Returns how many listeners panicked.
    pub fn notify_listeners(&self, event: &InboundEvent) -> usize {
        let mut failed = 0;
        for module in self.registry.loaded_modules() {
            let instance = module.instance();
            if catch_unwind(AssertUnwindSafe(|| instance.on_event(event))).is_err() {
                error!(module = module.name(), "Event listener panicked");
                failed += 1;
            }
        }
        failed
    }

    // ─── Prefixes ────────────────────────────────────────────────────────────

    /// The text command prefix for `channel`.
    pub fn prefix_for(&self, channel: ChannelId) -> String {
        self.prefixes
            .read()
            .resolve(self.settings.target_guild, channel)
            .to_string()
    }

    pub fn set_guild_prefix(&self, prefix: Option<String>) -> Option<String> {
        self.prefixes
            .write()
            .set_guild(self.settings.target_guild, prefix)
    }

    pub fn set_channel_prefix(&self, channel: ChannelId, prefix: Option<String>) -> Option<String> {
        self.prefixes.write().set_channel(channel, prefix)
    }

    // ─── Health ──────────────────────────────────────────────────────────────

    pub fn health(&self) -> Vec<HealthReport> {
        vec![self.registry.health(), self.store.health()]
    }
}

impl std::fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleManager")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("paths", &self.index.read().len())
            .finish_non_exhaustive()
    }
}

fn text_index(modules: &[Arc<LoadedModule>]) -> CommandTrie<Arc<TextCommand>> {
    let mut trie = CommandTrie::new();
    for module in modules {
        for command in module.text_commands() {
            if !trie.insert(command.name(), Arc::clone(command)) {
                warn!(
                    module = module.name(),
                    command = command.name(),
                    "Duplicate text command, keeping the first"
                );
            }
        }
    }
    trie
}
