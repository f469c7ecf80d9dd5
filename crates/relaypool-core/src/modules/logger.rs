//! Logging initialization.
//!
//! Console output always; a daily-rolling file when a log directory is given.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

struct LocalTimer;

impl fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().to_rfc3339())
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `default_level`. The returned guard flushes the file
/// writer and must live as long as the process.
pub fn init_logger(default_level: &str, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let _ = tracing_log::LogTracer::init();

    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let console_layer = fmt::Layer::new()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_timer(LocalTimer);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("Failed to create log directory {}: {}", dir.display(), e);
                (None, None)
            } else {
                let file_appender = tracing_appender::rolling::daily(dir, "relaypool.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                let layer = fmt::Layer::new()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true)
                    .with_level(true)
                    .with_timer(LocalTimer);
                (Some(layer), Some(guard))
            }
        },
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    tracing::info!(
        "Log system initialized ({})",
        if guard.is_some() { "console + file" } else { "console" }
    );
    guard
}
