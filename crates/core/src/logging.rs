//! tracing subscriber setup

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Install a global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", config.level, e)))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match config.format.as_str() {
        "pretty" => builder.pretty().try_init(),
        "compact" => builder.compact().try_init(),
        other => {
            return Err(Error::Config(format!(
                "Unknown log format '{}' (expected 'pretty' or 'compact')",
                other
            )))
        }
    };

    installed.map_err(|e| Error::Config(format!("Failed to install logger: {}", e)))
}
