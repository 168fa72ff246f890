//! Tracing-based structured logging, grounded on the teacher's
//! `infrastructure::logging::logger::LoggerImpl` — a daily-rotating file
//! layer (always JSON) plus an optional stdout layer whose format follows
//! configuration.

use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Held for the lifetime of the process; dropping it stops the background
/// flush thread for the non-blocking file writer.
pub struct LoggerGuard {
    _file_guard: WorkerGuard,
}

/// Initialize the global tracing subscriber: a JSON file layer under
/// `logs_dir` rotated daily, and a stdout layer formatted per `log_format`
/// (`"json"` or anything else falling back to pretty).
pub fn init(logs_dir: &std::path::Path, log_level: &str, log_format: &str) -> anyhow::Result<LoggerGuard> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.parse()?)
        .from_env_lossy();

    std::fs::create_dir_all(logs_dir)?;
    let file_appender = rolling::daily(logs_dir, "codeswarm.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter.clone());

    if log_format == "json" {
        let stdout_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stdout)
            .with_target(true)
            .with_filter(env_filter);

        tracing_subscriber::registry().with(file_layer).with(stdout_layer).init();
    } else {
        let stdout_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(io::stdout)
            .with_target(true)
            .with_filter(env_filter);

        tracing_subscriber::registry().with(file_layer).with(stdout_layer).init();
    }

    Ok(LoggerGuard { _file_guard: file_guard })
}
