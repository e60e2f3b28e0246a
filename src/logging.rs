//! Console diagnostics through `tracing`.
//!
//! The library only emits events; the binary installs the subscriber.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub include_target: bool,
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: Level::INFO,
            include_target: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// DEBUG level with module targets, used by `--verbose`.
    pub fn verbose() -> Self {
        LogConfig {
            level: Level::DEBUG,
            include_target: true,
            ansi_colors: true,
        }
    }
}

/// Installs a global compact fmt subscriber.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}
