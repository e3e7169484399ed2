// Local crates
use crate::helpers::load_config::TracingConfig;

// External crates
use anyhow::{Context, Result};
use std::panic;
use tracing::error;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    Layer,
    filter::{Directive, EnvFilter},
    fmt,
    prelude::*,
    registry::Registry,
};

/// Environment variable overriding the configured filter, e.g. `STEPLOG_LOG=streamer=trace`.
pub const FILTER_ENV: &str = "STEPLOG_LOG";

const LOG_FILE_NAME: &str = "steplog.log";

/// Install the global subscriber.
///
/// Diagnostics go to stderr so stdout carries nothing but the streamed log lines. When
/// `log_dir` is set, a daily rolling file receives the same events, as JSON if asked.
/// Keep the returned guard alive until exit so buffered file lines are flushed.
pub fn init_tracing(config: &TracingConfig) -> Result<Option<WorkerGuard>> {
    let mut filter = EnvFilter::try_from_env(FILTER_ENV)
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // process spawning is noisy at debug
    if let Ok(directive) = "tokio::process=warn".parse::<Directive>() {
        filter = filter.add_directive(directive);
    }

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = if config.json {
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_file(true)
                    .with_line_number(true)
                    .with_thread_ids(true)
                    .with_timer(fmt::time::UtcTime::rfc_3339())
                    .boxed()
            } else {
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true)
                    .with_thread_ids(true)
                    .with_timer(fmt::time::UtcTime::rfc_3339())
                    .boxed()
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .with(ErrorLayer::default());

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")?;
    Ok(guard)
}

/// Log panics through tracing before the default hook prints them.
pub fn init_panic_handler() {
    panic::set_hook(Box::new(|panic_info| {
        let msg = match panic_info.payload().downcast_ref::<&str>() {
            Some(s) => (*s).to_string(),
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => s.clone(),
                None => "Unknown panic".to_string(),
            },
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            message = %msg,
            location = %location,
            "steplog panicked!"
        );
    }));
}
