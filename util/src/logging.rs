//! Logging bootstrap shared by the workspace binaries.

use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global `tracing` subscriber.
///
/// Events go to a daily rolling file next to `log_file` and, when
/// `log_to_stdout` is set, to stdout as well. The `LOG_LEVEL` directive
/// (e.g. `services=debug,db=info`) wins over `log_level` when present.
///
/// Keep the returned guard alive for the lifetime of the process, dropping it
/// flushes and stops the background file writer.
pub fn init_logging(log_file: &str, log_level: &str, log_to_stdout: bool) -> WorkerGuard {
    let path = Path::new(log_file);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("logs"));
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkin.log".into());

    fs::create_dir_all(dir).ok();

    let file_appender = rolling::daily(dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    let stdout_layer = log_to_stdout.then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(true)
    });

    let env_filter =
        EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    guard
}
