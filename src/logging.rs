use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

const LOG_FILE_PREFIX: &str = "lingua.log";

/// Keeps the non-blocking file writer alive; dropping it flushes and stops
/// the background thread.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

pub fn init_tracing(config: &Config) -> Option<FileLogGuard> {
    let env_filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(true);
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    if config.log_to_file {
        match std::fs::create_dir_all(&config.log_dir) {
            Ok(()) => {
                let appender =
                    RollingFileAppender::new(Rotation::DAILY, &config.log_dir, LOG_FILE_PREFIX);
                let (file_writer, guard) = tracing_appender::non_blocking(appender);
                let file_layer = fmt::layer()
                    .with_writer(file_writer)
                    .with_ansi(false)
                    .with_target(true);

                registry.with(file_layer).init();
                return Some(FileLogGuard { _guard: guard });
            }
            Err(err) => {
                eprintln!("failed to create log directory {}: {err}", config.log_dir);
            }
        }
    }

    registry.init();
    None
}
