//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use gavel_core::{GuildId, RoleId};
use gavel_framework::ManagerSettings;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GavelConfig {
    /// The guild this deployment serves.
    #[serde(default)]
    pub bot: BotConfig,

    /// Where and how often persisted records are written.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Command engine behavior.
    #[serde(default)]
    pub commands: CommandsConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GavelConfig {
    /// Settings for the module manager.
    pub fn manager_settings(&self) -> ManagerSettings {
        let guild = GuildId(self.bot.target_guild);
        let public_role = self.bot.public_role.unwrap_or(self.bot.target_guild);
        ManagerSettings::new(guild)
            .public_role(RoleId(public_role))
            .strict_conflicts(self.commands.strict_conflicts)
            .eager_cache_rebuild(self.commands.eager_cache_rebuild)
            .default_prefix(self.commands.default_prefix.clone())
    }
}

// ─── bot ──────────────────────────────────────────────────────────────────────

/// Tenant settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BotConfig {
    /// Snowflake of the single guild served. Must be set.
    #[serde(default)]
    pub target_guild: u64,

    /// The guild's default role. Defaults to the guild id.
    #[serde(default)]
    pub public_role: Option<u64>,
}

// ─── storage ──────────────────────────────────────────────────────────────────

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON file per record.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Seconds between automatic saves.
    #[serde(default = "default_autosave_secs")]
    pub autosave_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            autosave_secs: default_autosave_secs(),
        }
    }
}

impl StorageConfig {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_secs)
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_autosave_secs() -> u64 {
    3600
}

// ─── commands ─────────────────────────────────────────────────────────────────

/// Command engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// Refuse to register a command tree with any conflict.
    #[serde(default)]
    pub strict_conflicts: bool,

    /// Rebuild visibility caches after each flush for the channels read
    /// since the previous one.
    #[serde(default = "default_true")]
    pub eager_cache_rebuild: bool,

    /// Text command prefix used without a guild or channel override.
    #[serde(default = "default_prefix")]
    pub default_prefix: String,

    /// Events handled concurrently.
    #[serde(default = "default_worker_limit")]
    pub worker_limit: usize,

    /// Seconds between sweeps of stale button and select-menu callbacks.
    #[serde(default = "default_component_sweep_secs")]
    pub component_sweep_secs: u64,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            strict_conflicts: false,
            eager_cache_rebuild: true,
            default_prefix: default_prefix(),
            worker_limit: default_worker_limit(),
            component_sweep_secs: default_component_sweep_secs(),
        }
    }
}

impl CommandsConfig {
    pub fn component_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.component_sweep_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_prefix() -> String {
    gavel_framework::prefix::DEFAULT_PREFIX.to_string()
}

fn default_worker_limit() -> usize {
    16
}

fn default_component_sweep_secs() -> u64 {
    600
}

// ─── logging ──────────────────────────────────────────────────────────────────

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Log file for [`LogOutput::File`].
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Per-target levels, e.g. `gavel_framework = "debug"`.
    #[serde(default)]
    pub filters: BTreeMap<String, LogLevel>,
}
