//! Tracing subscriber setup.

use crate::config::LogConfig;
use crate::result::{EnsayoError, EnsayoResult};
use tracing_subscriber::EnvFilter;

/// Build the filter for `config`; `RUST_LOG` wins when set
fn env_filter(config: &LogConfig) -> EnsayoResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| EnsayoError::config(format!("invalid log level '{}': {e}", config.level)))
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed, which is not an
/// error: embedding hosts usually bring their own.
pub fn init_logging(config: &LogConfig) -> EnsayoResult<bool> {
    let filter = env_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let installed = if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_config_error() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LogConfig {
            level: "ensayo=loud".into(),
            ..LogConfig::default()
        };
        assert!(matches!(
            init_logging(&config).unwrap_err(),
            EnsayoError::Config { .. }
        ));
    }

    #[test]
    fn test_second_init_is_harmless() {
        let config = LogConfig::default();
        let _ = init_logging(&config).unwrap();
        assert!(!init_logging(&config).unwrap());
    }
}
