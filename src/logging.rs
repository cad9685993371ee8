//! Tracing subscriber initialisation from [`crate::config::LoggingConfig`].
//!
//! Text or JSON formatting, level via `RUST_LOG` with the configured
//! level as the default, optional daily-rolling file output. Returns the
//! appender guard; dropping it flushes buffered log lines, so keep it
//! alive for the process lifetime.

use crate::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global subscriber. Safe to call more than once; later
/// calls are no-ops (first writer wins), which keeps test setups simple.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "quiver-storage.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let builder = fmt().with_env_filter(filter).with_writer(writer).with_ansi(false);
            let result = if config.format == "json" {
                builder.json().try_init()
            } else {
                builder.try_init()
            };
            let _ = result;
            Some(guard)
        }
        None => {
            let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
            let result = if config.format == "json" {
                builder.json().try_init()
            } else {
                builder.try_init()
            };
            let _ = result;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        let config = LoggingConfig::default();
        init(&config);
        init(&config);
        tracing::info!("logging initialised twice without panicking");
    }

    #[test]
    fn file_output_creates_guard() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = LoggingConfig {
            level: "debug".into(),
            format: "json".into(),
            dir: Some(dir.path().to_path_buf()),
        };
        let guard = init(&config);
        assert!(guard.is_some());
    }
}
