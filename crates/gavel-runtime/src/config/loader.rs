//! Configuration loading with figment.
//!
//! Sources, lowest to highest:
//!
//! 1. Built-in defaults
//! 2. The config file: the one named with [`ConfigLoader::file`], otherwise
//!    `gavel.toml` (or `gavel.yaml` with `yaml-config`) in the working
//!    directory if present
//! 3. `GAVEL_*` environment variables
//! 4. Programmatic overrides
//!
//! Environment variables use `__` between table and key:
//! `GAVEL_BOT__TARGET_GUILD=1234` sets `bot.target_guild`.

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info};

use super::error::{ConfigError, ConfigResult};
use super::schema::GavelConfig;

/// Layers the configuration sources into one [`GavelConfig`].
pub struct ConfigLoader {
    file: Option<PathBuf>,
    load_env: bool,
    overrides: Figment,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            load_env: true,
            overrides: Figment::new(),
        }
    }

    /// Loads `path` instead of looking in the working directory. The file
    /// must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Reads `GAVEL_*` variables (the default).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Layers `config` above every other source.
    pub fn merge(mut self, config: GavelConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    pub fn load(self) -> ConfigResult<GavelConfig> {
        let mut figment = Figment::from(Serialized::defaults(GavelConfig::default()));

        match self.file {
            Some(path) if !path.exists() => return Err(ConfigError::FileNotFound(path)),
            Some(path) => figment = merge_file(figment, &path)?,
            None => {
                if let Some(path) = default_file() {
                    figment = merge_file(figment, &path)?;
                } else {
                    debug!("No configuration file in the working directory, using defaults");
                }
            }
        }

        if self.load_env {
            figment = figment.merge(Env::prefixed("GAVEL_").split("__"));
        }

        let config: GavelConfig = figment
            .merge(self.overrides)
            .extract()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        debug!(
            target_guild = config.bot.target_guild,
            logging_level = %config.logging.level,
            "Configuration loaded"
        );
        Ok(config)
    }
}

/// The first default-named file present in the working directory.
fn default_file() -> Option<PathBuf> {
    let mut names: Vec<&str> = Vec::new();
    #[cfg(feature = "toml-config")]
    names.push("gavel.toml");
    #[cfg(feature = "yaml-config")]
    names.extend(["gavel.yaml", "gavel.yml"]);

    names.into_iter().map(PathBuf::from).find(|path| path.exists())
}

/// Merges one file, picking the format from its extension.
fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    info!(path = %path.display(), "Loading configuration file");
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        ext => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Loads configuration from the working directory and the environment.
pub fn load_config() -> ConfigResult<GavelConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from `path` plus the environment.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<GavelConfig> {
    ConfigLoader::new().file(path).load()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gavel-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = ConfigLoader::new().without_env().load().unwrap();
        assert_eq!(config.logging.level.as_str(), "info");
        assert_eq!(config.storage.autosave_secs, 3600);
        assert_eq!(config.commands.worker_limit, 16);
        assert_eq!(config.commands.component_sweep_secs, 600);
    }

    #[test]
    fn test_programmatic_override() {
        let mut overrides = GavelConfig::default();
        overrides.bot.target_guild = 77;
        let config = ConfigLoader::new()
            .without_env()
            .merge(overrides)
            .load()
            .unwrap();
        assert_eq!(config.bot.target_guild, 77);
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::new()
            .file("/definitely/not/here/gavel.toml")
            .without_env()
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let path = scratch_file("gavel.ini", "target_guild = 5\n");
        let result = ConfigLoader::new().file(path).without_env().load();
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(ext)) if ext == "ini"));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_overrides_sit_above_the_file() {
        let path = scratch_file(
            "layered.toml",
            "[bot]\ntarget_guild = 5\n\n[commands]\ndefault_prefix = \"?\"\n",
        );
        let mut overrides = GavelConfig::default();
        overrides.bot.target_guild = 9;
        overrides.commands.default_prefix = "?".into();

        let config = ConfigLoader::new()
            .file(&path)
            .without_env()
            .merge(overrides)
            .load()
            .unwrap();
        assert_eq!(config.bot.target_guild, 9);
        assert_eq!(config.commands.default_prefix, "?");

        let config = load_config_from_file(&path).unwrap();
        assert_eq!(config.commands.default_prefix, "?");
    }
}
