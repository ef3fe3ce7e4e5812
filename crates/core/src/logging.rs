use tracing::Level;

use crate::config::{LogFormat, LoggingConfig};

/// Installs the global `tracing` subscriber described by `config`.
///
/// Returns `false` when the host already installed a subscriber; the host's one is kept.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let log_level = config.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .compact()
            .try_init()
            .is_ok(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .pretty()
            .try_init()
            .is_ok(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .json()
            .try_init()
            .is_ok(),
    }
}
