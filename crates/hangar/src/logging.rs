//! Tracing setup: stderr plus a daily log file in the loader's state directory.

use camino::Utf8Path;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. `RUST_LOG` takes precedence over `default_filter`.
///
/// The returned guard flushes the file writer on drop and must be held until exit.
pub fn init_logging(log_dir: &Utf8Path, default_filter: &str) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| "info".into());

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_guard, file_layer) = match std::fs::create_dir_all(log_dir) {
        Err(e) => {
            eprintln!("Failed to create log directory {}: {}", log_dir, e);
            (None, None)
        }
        Ok(()) => match rolling::RollingFileAppender::builder()
            .rotation(rolling::Rotation::DAILY)
            .filename_prefix("hangar")
            .filename_suffix("log")
            .build(log_dir)
        {
            Ok(file_appender) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false);
                (Some(guard), Some(layer))
            }
            Err(e) => {
                eprintln!("Failed to create log file appender in {}: {}", log_dir, e);
                (None, None)
            }
        },
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer);
    if let Some(layer) = file_layer {
        registry.with(layer).init();
    } else {
        registry.init();
    }

    file_guard
}
