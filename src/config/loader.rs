//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding the initial route-table capacity.
pub const MAX_ROUTES_ENV: &str = "ACTION_GATEWAY_MAX_ROUTES";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: ServerConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply overrides read from the process environment.
pub fn apply_env_overrides(config: &mut ServerConfig) {
    let raw = std::env::var(MAX_ROUTES_ENV).ok();
    if let Some(capacity) = parse_max_routes(raw.as_deref()) {
        config.routes.initial_capacity = capacity;
    } else if let Some(raw) = raw {
        tracing::warn!(
            env = MAX_ROUTES_ENV,
            value = %raw,
            default = config.routes.initial_capacity,
            "Ignoring invalid route capacity"
        );
    }
    tracing::debug!(capacity = config.routes.initial_capacity, "Route table capacity");
}

/// A positive integer, or nothing.
pub fn parse_max_routes(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_max_routes() {
        assert_eq!(parse_max_routes(Some("512")), Some(512));
        assert_eq!(parse_max_routes(Some(" 64 ")), Some(64));
        assert_eq!(parse_max_routes(Some("0")), None);
        assert_eq!(parse_max_routes(Some("-3")), None);
        assert_eq!(parse_max_routes(Some("many")), None);
        assert_eq!(parse_max_routes(None), None);
    }

    #[test]
    fn test_load_config_from_file() {
        let path = std::env::temp_dir().join(format!("gateway-{}.toml", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            "run_mode = \"deployment\"\n[listener]\nbind_address = \"127.0.0.1:7000\"\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert!(config.run_mode.is_deployment());
        assert_eq!(config.listener.bind_address, "127.0.0.1:7000");

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_config_reports_validation() {
        let path = std::env::temp_dir().join(format!("gateway-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, "[traffic]\ndefault_freq = -1.0\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("traffic.default_freq"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
