//! Tracing subscriber setup
//!
//! Logs go to `hermitcrab.log` under the data directory and, for
//! interactive use, to stderr. `RUST_LOG` overrides the default `info` level.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    /// Mirror logs to stderr
    pub stderr: bool,
    /// Emit JSON lines instead of text
    pub json: bool,
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// the life of the process.
pub fn init_logging(log_path: &Path, options: LogOptions) -> WorkerGuard {
    let log_dir = log_path.parent().unwrap_or(Path::new("."));
    let file_name = log_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "hermitcrab.log".to_string());
    let _ = std::fs::create_dir_all(log_dir);

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_text, file_json) = if options.json {
        let layer = fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true);
        (None, Some(layer))
    } else {
        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true);
        (Some(layer), None)
    };

    let stderr_layer = options.stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_text)
        .with(file_json)
        .with(stderr_layer)
        .init();

    guard
}
