use std::path::{Path, PathBuf};

use crate::config::schema::AppConfig;
use crate::error::ConfigError;

/// Environment variables that override file values.
pub const ENV_DB_PATH: &str = "DB_PATH";
pub const ENV_TEMP_DIR: &str = "TEMP_DIR";
pub const ENV_GOOGLE_CLIENT_ID: &str = "GOOGLE_CLIENT_ID";

/// Loads the configuration: defaults, then the optional JSON file, then
/// environment overrides. The result is validated.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
            serde_json::from_str(&content)?
        }
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    validate_config(&config)?;

    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Applies environment overrides through `lookup`. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(path) = get(ENV_DB_PATH) {
        config.database_path = PathBuf::from(path);
    }
    if let Some(dir) = get(ENV_TEMP_DIR) {
        config.temp_directory = PathBuf::from(dir);
    }
    if let Some(client_id) = get(ENV_GOOGLE_CLIENT_ID) {
        config.drive.client_id = Some(client_id);
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    let checks = [
        (config.poll_interval_secs == 0, "poll_interval_secs must be greater than 0"),
        (config.cleanup_interval_secs == 0, "cleanup_interval_secs must be greater than 0"),
        (config.stale_after_secs == 0, "stale_after_secs must be greater than 0"),
        (config.persist_attempts == 0, "persist_attempts must be at least 1"),
        (config.temp_directory.as_os_str().is_empty(), "temp_directory must not be empty"),
        (config.database_path.as_os_str().is_empty(), "database_path must not be empty"),
    ];

    if let Some((_, message)) = checks.iter().find(|(failed, _)| *failed) {
        return Err(ConfigError::Validation {
            message: message.to_string(),
        });
    }

    Ok(())
}
