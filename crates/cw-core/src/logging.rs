//! Logging initialization using the `tracing` ecosystem.
//!
//! The console always gets human-readable output. When a log directory is
//! configured, a second layer writes daily-rotated files named after the
//! module, either as plain text or as one JSON object per line for shipping
//! to a log collector. `RUST_LOG` overrides the level given on the command line.

use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogFormat;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global tracing subscriber.
///
/// Fails if `log_level` is not a valid filter directive or a subscriber is
/// already installed.
pub fn init_logging(
    log_level: &str,
    log_dir: Option<&str>,
    module_name: &str,
    file_format: LogFormat,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))?;

    let mut layers: Vec<BoxedLayer> = vec![fmt::layer().with_target(true).with_ansi(true).boxed()];
    if let Some(dir) = log_dir {
        let appender = tracing_appender::rolling::daily(dir, format!("{module_name}.log"));
        let file = fmt::layer().with_writer(appender).with_ansi(false).with_target(true);
        layers.push(match file_format {
            LogFormat::Text => file.boxed(),
            LogFormat::Json => file.json().boxed(),
        });
    }

    tracing_subscriber::registry().with(layers).with(env_filter).try_init()?;
    tracing::info!(level = log_level, ?file_format, dir = log_dir.unwrap_or("-"), "logging initialized");
    Ok(())
}
