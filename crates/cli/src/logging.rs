use tracing::Level;
use waypoint_core::config::{AppConfig, LogFormat};

/// Installs the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable. A second call is a no-op.
pub fn init_logging(config: &AppConfig) {
    let level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder =
        tracing_subscriber::fmt().with_target(false).with_max_level(level).with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
