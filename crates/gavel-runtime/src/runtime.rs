//! Runtime orchestration.
//!
//! ```text
//!  gateway ──InboundEvent──▶ EventSink::submit ──▶ tokio task ──(worker permit)──▶ Dispatcher
//!                                                                                     │
//!  autosave task ──every storage.autosave_secs──▶ Store::save_all ◀──── stop() ───────┘
//!
//!  sweep task ──every commands.component_sweep_secs──▶ ComponentRegistry::sweep
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use gavel_runtime::GavelRuntime;
//!
//! let runtime = GavelRuntime::builder()
//!     .config_file("config/gavel.toml")
//!     .platform(my_platform)
//!     .build()?;
//!
//! let events = runtime.sink();
//! tokio::spawn(async move {
//!     while let Some(event) = gateway.next().await {
//!         events.submit(event);
//!     }
//! });
//!
//! runtime.run().await?;
//! ```
//!
//! A stopped runtime cannot be started again.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gavel_core::{BoxedPlatform, HealthReport, HealthStatus, Store};
pub use gavel_framework::InboundEvent;
use gavel_framework::{
    BOT_MODULES, DispatchOutcome, Dispatcher, ModuleDescriptor, ModuleManager, SyncSummary,
};
use tokio::signal;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ConfigLoader, GavelConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::storage::JsonFileBackend;

// =============================================================================
// EventSink
// =============================================================================

/// Cloneable handle that hands inbound events to the worker pool.
#[derive(Clone)]
pub struct EventSink {
    dispatcher: Dispatcher,
    workers: Arc<Semaphore>,
}

impl EventSink {
    /// Dispatches `event` on its own task.
    ///
    /// At most `commands.worker_limit` events run at once; the rest wait for a permit. Events
    /// still waiting when the runtime stops are dropped as [`DispatchOutcome::Ignored`].
    pub fn submit(&self, event: impl Into<InboundEvent>) -> JoinHandle<DispatchOutcome> {
        let event = event.into();
        let dispatcher = self.dispatcher.clone();
        let workers = Arc::clone(&self.workers);

        tokio::spawn(async move {
            let Ok(_permit) = workers.acquire_owned().await else {
                debug!("Runtime stopped, dropping event");
                return DispatchOutcome::Ignored;
            };
            let outcome = dispatcher.dispatch(event).await;
            trace!(?outcome, "Event handled");
            outcome
        })
    }

    /// Permits currently free.
    pub fn idle_workers(&self) -> usize {
        self.workers.available_permits()
    }
}

// =============================================================================
// GavelRuntime
// =============================================================================

/// The running bot: module manager, dispatcher, worker pool and the periodic
/// autosave and component sweep tasks.
pub struct GavelRuntime {
    config: GavelConfig,
    manager: Arc<ModuleManager>,
    sink: EventSink,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl GavelRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &GavelConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<ModuleManager> {
        &self.manager
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.sink.dispatcher
    }

    /// A handle for the gateway to feed events through.
    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// Shorthand for `self.sink().submit(event)`.
    pub fn submit(&self, event: impl Into<InboundEvent>) -> JoinHandle<DispatchOutcome> {
        self.sink.submit(event)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Registers the command tree and starts autosaving and sweeping.
    pub async fn start(&self) -> RuntimeResult<Option<SyncSummary>> {
        if self.shutdown.is_cancelled() {
            warn!("Runtime was stopped and cannot be restarted");
            return Ok(None);
        }
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Runtime is already running");
            return Ok(None);
        }

        info!(guild = %self.manager.target_guild(), "Starting Gavel runtime");

        let summary = match self
            .manager
            .sync_commands(self.sink.dispatcher.platform().as_ref())
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                return Err(e.into());
            }
        };

        *self.tasks.lock().await = vec![self.spawn_autosave(), self.spawn_component_sweep()];

        info!(
            commands = summary.commands,
            paths = summary.paths,
            workers = self.config.commands.worker_limit,
            "Runtime started"
        );
        Ok(Some(summary))
    }

    /// Stops accepting events, ends the periodic tasks and writes every record once more.
    pub async fn stop(&self) -> RuntimeResult<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            warn!("Runtime is not running");
            return Ok(());
        }

        info!("Stopping Gavel runtime");
        self.shutdown.cancel();
        self.sink.workers.close();

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for handle in tasks {
            handle.await?;
        }

        let store = Arc::clone(self.manager.store());
        tokio::task::spawn_blocking(move || store.save_all()).await??;

        info!("Runtime stopped");
        Ok(())
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("Gavel runtime is now running. Press Ctrl+C to stop.");

        let waited = wait_for_shutdown().await;
        self.stop().await?;
        waited
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await
    }

    /// Module, persistence and runtime health, in that order.
    pub fn health_report(&self) -> Vec<HealthReport> {
        let status = if self.is_running() {
            HealthStatus::Running
        } else if self.shutdown.is_cancelled() {
            HealthStatus::Stopped
        } else {
            HealthStatus::Starting
        };
        let runtime = HealthReport::new("Runtime", status).with_message(format!(
            "{}/{} workers idle",
            self.sink.idle_workers(),
            self.config.commands.worker_limit
        ));

        let mut reports = self.manager.health();
        reports.push(runtime);
        reports
    }

    fn spawn_autosave(&self) -> JoinHandle<()> {
        let store = Arc::clone(self.manager.store());
        let token = self.shutdown.child_token();
        let period = self.config.storage.autosave_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let store = Arc::clone(&store);
                        match tokio::task::spawn_blocking(move || store.save_all()).await {
                            Ok(Ok(())) => debug!("Autosave complete"),
                            Ok(Err(e)) => error!(error = %e, "Autosave failed"),
                            Err(e) => error!(error = %e, "Autosave task failed"),
                        }
                    }
                }
            }
            trace!("Autosave task finished");
        })
    }

    fn spawn_component_sweep(&self) -> JoinHandle<()> {
        let manager = Arc::clone(&self.manager);
        let token = self.shutdown.child_token();
        let period = self.config.commands.component_sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = manager.components().sweep();
                        trace!(removed, "Component sweep complete");
                    }
                }
            }
            trace!("Component sweep task finished");
        })
    }
}

impl std::fmt::Debug for GavelRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GavelRuntime")
            .field("manager", &self.manager)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Waits for Ctrl+C, or SIGTERM on unix.
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(RuntimeError::Signal)?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.map_err(RuntimeError::Signal)?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map_err(RuntimeError::Signal)?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`GavelRuntime`].
///
/// Without an explicit module list the runtime uses every module linked into
/// [`BOT_MODULES`]; without an explicit store it opens a [`JsonFileBackend`] in
/// `storage.data_dir`.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    modules: Vec<ModuleDescriptor>,
    platform: Option<BoxedPlatform>,
    store: Option<Arc<Store>>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            modules: Vec::new(),
            platform: None,
            store: None,
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Overrides loaded configuration.
    pub fn merge(mut self, config: GavelConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn module(mut self, module: ModuleDescriptor) -> Self {
        self.modules.push(module);
        self
    }

    pub fn modules(mut self, modules: impl IntoIterator<Item = ModuleDescriptor>) -> Self {
        self.modules.extend(modules);
        self
    }

    /// Adds every module in [`BOT_MODULES`].
    pub fn linked_modules(self) -> Self {
        self.modules(BOT_MODULES.iter().copied())
    }

    pub fn platform(mut self, platform: BoxedPlatform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Uses `store` instead of opening `storage.data_dir`.
    pub fn store(mut self, store: Arc<Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Loads and validates configuration, initializes logging and loads persisted state.
    pub fn build(self) -> RuntimeResult<GavelRuntime> {
        let platform = self.platform.ok_or(RuntimeError::NoPlatform)?;
        let config = self.config_loader.load()?;
        validate_config(&config)?;
        logging::init_from_config(&config.logging);

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(Store::new(JsonFileBackend::open(&config.storage.data_dir)?)),
        };

        let modules = if self.modules.is_empty() {
            BOT_MODULES.iter().copied().collect()
        } else {
            self.modules
        };
        let manager = Arc::new(ModuleManager::new(
            store,
            dedup_modules(modules),
            config.manager_settings(),
        )?);

        info!(
            guild = config.bot.target_guild,
            data_dir = %config.storage.data_dir.display(),
            autosave = ?Duration::from_secs(config.storage.autosave_secs),
            "Runtime initialized from configuration"
        );

        let sink = EventSink {
            dispatcher: Dispatcher::new(Arc::clone(&manager), platform),
            workers: Arc::new(Semaphore::new(config.commands.worker_limit)),
        };

        Ok(GavelRuntime {
            config,
            manager,
            sink,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps the first descriptor for each module name.
fn dedup_modules(modules: Vec<ModuleDescriptor>) -> Vec<ModuleDescriptor> {
    let mut seen = HashSet::new();
    modules
        .into_iter()
        .filter(|module| {
            let fresh = seen.insert(module.name);
            if !fresh {
                debug!(module = module.name, "Skipping repeated module descriptor");
            }
            fresh
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use gavel_core::{
        ApiResult, ChannelId, CommandData, CommandPrivilege, ComponentEvent, ComponentKind, GuildId,
        Interaction, InteractionId, InvokedPath, Member, MemoryBackend, MessageEvent, Permission,
        PersistentObject, Platform, RoleId, StorageBackend, UserId,
    };
    use gavel_framework::builtin;
    use parking_lot::Mutex as SyncMutex;
    use serde::{Deserialize, Serialize};

    use super::*;

    const GUILD: u64 = 1000;
    const CHANNEL: ChannelId = ChannelId(2000);

    #[derive(Default)]
    struct FakePlatform {
        registered: SyncMutex<Vec<String>>,
        said: SyncMutex<Vec<String>>,
    }

    #[async_trait]
    impl Platform for FakePlatform {
        async fn register_commands(&self, _guild: GuildId, commands: Vec<CommandData>) -> ApiResult<()> {
            self.registered
                .lock()
                .extend(commands.into_iter().map(|c| c.name));
            Ok(())
        }

        async fn update_privileges(
            &self,
            _guild: GuildId,
            _privileges: Vec<CommandPrivilege>,
        ) -> ApiResult<()> {
            Ok(())
        }

        async fn reply(&self, _interaction: InteractionId, content: &str, _ephemeral: bool) -> ApiResult<()> {
            self.said.lock().push(content.to_string());
            Ok(())
        }

        async fn edit_reply(&self, _interaction: InteractionId, content: &str) -> ApiResult<()> {
            self.said.lock().push(content.to_string());
            Ok(())
        }

        async fn send_message(&self, _channel: ChannelId, content: &str) -> ApiResult<()> {
            self.said.lock().push(content.to_string());
            Ok(())
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Counter {
        hits: u32,
    }

    impl PersistentObject for Counter {
        const KEY: &'static str = "counter";
    }

    fn seeded_backend() -> Arc<MemoryBackend> {
        Arc::new(
            MemoryBackend::new()
                .with_entry("enabled_modules", r#"["admin","ping"]"#)
                .with_entry(
                    "module_permissions",
                    r#"{"permitted_in_guild":["admin","ping"]}"#,
                ),
        )
    }

    fn config(worker_limit: usize) -> GavelConfig {
        let mut config = GavelConfig::default();
        config.bot.target_guild = GUILD;
        config.commands.worker_limit = worker_limit;
        config
    }

    fn build(backend: Arc<MemoryBackend>, platform: Arc<FakePlatform>) -> GavelRuntime {
        GavelRuntime::builder()
            .without_env()
            .merge(config(2))
            .modules(builtin::ALL)
            .store(Arc::new(Store::from_backend(backend)))
            .platform(platform)
            .build()
            .unwrap()
    }

    fn ping_message() -> MessageEvent {
        MessageEvent {
            guild_id: Some(GuildId(GUILD)),
            channel_id: CHANNEL,
            author: Member::new(UserId(5), Vec::<RoleId>::new()),
            content: "!ping".into(),
            webhook: false,
        }
    }

    #[test]
    fn test_build_requires_platform() {
        let result = GavelRuntime::builder().without_env().merge(config(1)).build();
        assert!(matches!(result, Err(RuntimeError::NoPlatform)));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let result = GavelRuntime::builder()
            .without_env()
            .merge(config(0))
            .platform(Arc::new(FakePlatform::default()))
            .store(Arc::new(Store::in_memory()))
            .build();
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[test]
    fn test_dedup_keeps_first() {
        let modules = dedup_modules(vec![builtin::ping::DESCRIPTOR, builtin::ping::DESCRIPTOR]);
        assert_eq!(modules.len(), 1);
    }

    #[tokio::test]
    async fn test_start_registers_and_dispatches() {
        let platform = Arc::new(FakePlatform::default());
        let runtime = build(seeded_backend(), Arc::clone(&platform));

        let summary = runtime.start().await.unwrap().unwrap();
        assert!(summary.commands >= 2);
        assert!(platform.registered.lock().contains(&"ping".to_string()));
        assert!(runtime.is_running());

        let outcome = runtime.submit(ping_message()).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Completed);
        assert_eq!(platform.said.lock().as_slice(), ["Pong!".to_string()]);

        let interaction = Interaction {
            id: InteractionId(9),
            guild_id: Some(GuildId(GUILD)),
            channel_id: CHANNEL,
            member: Member::new(UserId(5), Vec::<RoleId>::new()),
            path: InvokedPath::command("ping"),
            options: HashMap::new(),
        };
        let outcome = runtime.submit(interaction).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Completed);

        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_start_is_noop() {
        let runtime = build(seeded_backend(), Arc::new(FakePlatform::default()));
        assert!(runtime.start().await.unwrap().is_some());
        assert!(runtime.start().await.unwrap().is_none());
        runtime.stop().await.unwrap();
        assert!(runtime.start().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stop_saves_and_drops_events() {
        let backend = seeded_backend();
        let runtime = build(Arc::clone(&backend), Arc::new(FakePlatform::default()));
        runtime.start().await.unwrap();

        let counter = runtime.manager().store().load(Counter::default).unwrap();
        counter.write().hits = 3;
        runtime.stop().await.unwrap();

        let saved = backend.read(Counter::KEY).unwrap().unwrap();
        let saved: Counter = serde_json::from_slice(&saved).unwrap();
        assert_eq!(saved.hits, 3);

        let outcome = runtime.submit(ping_message()).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert!(!runtime.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_runs_on_interval() {
        let backend = seeded_backend();
        let runtime = build(Arc::clone(&backend), Arc::new(FakePlatform::default()));
        runtime.start().await.unwrap();

        let counter = runtime.manager().store().load(Counter::default).unwrap();
        counter.write().hits = 7;

        tokio::time::sleep(runtime.config().storage.autosave_interval() + Duration::from_secs(1))
            .await;
        for _ in 0..50 {
            let saved = backend.read(Counter::KEY).unwrap().unwrap();
            let saved: Counter = serde_json::from_slice(&saved).unwrap();
            if saved.hits == 7 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let saved: Counter =
            serde_json::from_slice(&backend.read(Counter::KEY).unwrap().unwrap()).unwrap();
        assert_eq!(saved.hits, 7);

        runtime.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_component_sweep_runs_on_interval() {
        let runtime = build(seeded_backend(), Arc::new(FakePlatform::default()));
        runtime.start().await.unwrap();

        let components = runtime.manager().components();
        let stale = components.button(Permission::Everyone, || true, |_ctx| async { Ok(()) });
        let live = components.button(Permission::Everyone, || false, |ctx| async move {
            ctx.reply("Pressed").await?;
            Ok(())
        });

        let period = runtime.config().commands.component_sweep_interval();
        tokio::time::sleep(period + Duration::from_secs(1)).await;
        for _ in 0..50 {
            if components.len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(components.get(&stale).is_none());

        let press = ComponentEvent {
            id: InteractionId(11),
            guild_id: Some(GuildId(GUILD)),
            channel_id: CHANNEL,
            member: Member::new(UserId(5), Vec::<RoleId>::new()),
            kind: ComponentKind::Button,
            custom_id: live,
            values: Vec::new(),
        };
        assert_eq!(runtime.submit(press).await.unwrap(), DispatchOutcome::Completed);

        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_until_stops() {
        let runtime = build(seeded_backend(), Arc::new(FakePlatform::default()));
        runtime.run_until(std::future::ready(())).await.unwrap();
        assert!(!runtime.is_running());

        let reports = runtime.health_report();
        let last = reports.last().unwrap();
        assert_eq!(last.component, "Runtime");
        assert_eq!(last.status, HealthStatus::Stopped);
    }
}
