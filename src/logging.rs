//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to the console and, when
//! the log directory is writable, to a JSON file per process.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Keeps the file writer flushing for the life of the process
static LOGGER_GUARD: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Directory for JSON log files, relative to the working directory
pub const LOG_DIR: &str = "log";

/// Initialize structured logging with environment-specific configuration
///
/// Safe to call more than once; only the first call installs a subscriber.
/// `RUST_LOG` overrides the environment's default level.
pub fn init_structured_logging() {
    LOGGER_GUARD.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(filter());

        let log_dir = PathBuf::from(LOG_DIR);
        let pid = process::id();
        let file_name = format!(
            "{}.{}.{}.log",
            environment,
            pid,
            Utc::now().format("%Y%m%d_%H%M%S")
        );

        let (file_layer, guard) = match fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::never(&log_dir, &file_name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(filter());
                (Some(layer), Some(guard))
            }
            Err(_) => (None, None),
        };

        // A subscriber may already be installed by the host application or a test
        if tracing_subscriber::registry()
            .with(console)
            .with(file_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
            return None;
        }

        match &guard {
            Some(_) => tracing::info!(
                pid = pid,
                environment = %environment,
                log_file = %log_dir.join(&file_name).display(),
                "Structured logging initialized with file output"
            ),
            None => tracing::warn!(
                pid = pid,
                environment = %environment,
                log_dir = %log_dir.display(),
                "Log directory not writable, logging to console only"
            ),
        }

        guard
    });
}

/// Get current environment from environment variables
pub fn get_environment() -> String {
    std::env::var("RESILIENCE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log the outcome of a dependency operation (bootstrap, health check, close)
pub fn log_dependency_operation(
    dependency: &str,
    operation: &str,
    status: &str,
    duration_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        dependency = %dependency,
        operation = %operation,
        status = %status,
        duration_ms = duration_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "DEPENDENCY_OPERATION"
    );
}
