use clap::ValueEnum;
use metrics::counter;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when RUST_LOG is not set
const DEFAULT_FILTER: &str = "chat_fallback=info,tower_http=info";

/// Encoding of emitted log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Initialize structured logging and metrics collection
pub fn init_logging_and_metrics(format: LogFormat) {
    // Set up environment filter for log levels
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    match format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_current_span(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
    info!(format = ?format, "Logging and tracing initialized");
    // Register the metrics so they are reported before the first request
    counter!("chat_fallback.total_requests").absolute(0);
    counter!("chat_fallback.total_errors").absolute(0);
    counter!("chat_fallback.total_rate_limit_errors").absolute(0);
    info!("Metrics collection initialized");
}
