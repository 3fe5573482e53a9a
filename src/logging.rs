use crate::config::AppConfig;
use tracing::Span;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use uuid::Uuid;

/// Target of the per-saga spans, filterable on its own (`fund_transfer::saga=off`)
pub const SAGA_TARGET: &str = "fund_transfer::saga";

/// Span wrapping one orchestrator invocation.
///
/// Every event logged inside it carries `operation` and `transaction_id`, so
/// the file log can be grepped by correlation id even for lines that do not
/// repeat it.
pub fn saga_span(operation: &'static str, transaction_id: Uuid) -> Span {
    tracing::info_span!(
        target: SAGA_TARGET,
        "saga",
        service = env!("CARGO_PKG_NAME"),
        operation,
        transaction_id = %transaction_id,
    )
}

/// Install the global subscriber. Keep the guard alive for the life of the process.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // sqlx logs every statement at info
    let filter_str = format!("{},sqlx=warn", config.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_str));

    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        // Saga fields land in "span" / "spans" of each record
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().json().with_target(true).with_current_span(true);
        registry.with(file_layer).with(stdout_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    guard
}
