//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{CommandsConfig, GavelConfig, StorageConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &GavelConfig) -> ConfigResult<()> {
    if config.bot.target_guild == 0 {
        return Err(ConfigError::missing_field("bot.target_guild"));
    }
    validate_storage_config(&config.storage)?;
    validate_commands_config(&config.commands)?;
    Ok(())
}

fn validate_storage_config(storage: &StorageConfig) -> ConfigResult<()> {
    if storage.autosave_secs == 0 {
        return Err(ConfigError::validation(
            "Autosave interval must be greater than 0",
        ));
    }
    if storage.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::missing_field("storage.data_dir"));
    }
    Ok(())
}

fn validate_commands_config(commands: &CommandsConfig) -> ConfigResult<()> {
    if commands.worker_limit == 0 {
        return Err(ConfigError::validation("Worker limit must be greater than 0"));
    }
    if commands.component_sweep_secs == 0 {
        return Err(ConfigError::validation(
            "Component sweep interval must be greater than 0",
        ));
    }
    if commands.default_prefix.trim().is_empty() {
        return Err(ConfigError::validation("Default prefix cannot be empty"));
    }
    if commands.default_prefix.chars().any(char::is_whitespace) {
        return Err(ConfigError::validation(
            "Default prefix cannot contain whitespace",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> GavelConfig {
        let mut config = GavelConfig::default();
        config.bot.target_guild = 1000;
        config
    }

    #[test]
    fn test_validate_defaults_with_guild() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_validate_missing_guild() {
        let result = validate_config(&GavelConfig::default());
        assert!(matches!(result, Err(ConfigError::MissingField { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = valid();
        config.commands.worker_limit = 0;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.storage.autosave_secs = 0;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.commands.component_sweep_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_prefix() {
        let mut config = valid();
        config.commands.default_prefix = "  ".into();
        assert!(validate_config(&config).is_err());

        config.commands.default_prefix = "? ".into();
        assert!(validate_config(&config).is_err());

        config.commands.default_prefix = "$$".into();
        assert!(validate_config(&config).is_ok());
    }
}
