//! tracing-subscriber installation for the binary

use crate::config::LoggingConfig;
use crate::error::{Result, ScoutError};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `[logging] level`. Output goes to stderr so command
/// output on stdout stays machine-readable.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ScoutError::Config(format!("Invalid log level '{}': {}", config.level, e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match config.format.as_str() {
        "json" => builder.json().try_init(),
        "pretty" => builder.pretty().try_init(),
        _ => builder.compact().try_init(),
    };
    installed.map_err(|e| ScoutError::Config(format!("Failed to install logger: {}", e)))
}
