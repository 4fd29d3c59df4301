use anyhow::{Result, anyhow};
use axum::Router;
use metrics::{counter, histogram};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::logs::{LogFormat, init_logging_and_metrics};
use crate::server::http::{router, validate_fallback_path};
use crate::server::limit::create_rate_limit_layer;
use crate::utils::{format_duration, generate_request_id};

/// Address the HTTP server binds to when neither a bind address nor a socket is given
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Configuration for server startup
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub socket_path: Option<String>,
    pub fallback_path: String,
    pub rate_limit_rps: Option<u32>,
    pub rate_limit_burst: u32,
    pub request_timeout: Duration,
    pub log_format: LogFormat,
}

/// Start the fallback server based on the provided configuration
pub async fn start_server(config: ServerConfig) -> Result<()> {
    // Initialize structured logging and metrics
    init_logging_and_metrics(config.log_format);
    // Output debugging information
    info!(
        bind_address = config.bind_address.as_deref().unwrap_or("N/A"),
        socket_path = config.socket_path.as_deref().unwrap_or("N/A"),
        fallback_path = %config.fallback_path,
        rate_limit_rps = ?config.rate_limit_rps,
        rate_limit_burst = config.rate_limit_burst,
        request_timeout = %format_duration(config.request_timeout),
        "Server configuration loaded"
    );
    if rate_limit_shares_key(&config) {
        warn!(
            "Rate limiting over a Unix socket keys clients on forwarding headers only, \
             requests without them share one budget"
        );
    }
    let router = build_router(&config)?;
    match (config.bind_address.as_deref(), config.socket_path.as_deref()) {
        // We are running as a HTTP server
        (bind_address, None) => {
            let bind_address = bind_address.unwrap_or(DEFAULT_BIND_ADDRESS);
            let listener = TcpListener::bind(bind_address)
                .await
                .map_err(|e| anyhow!("Failed to bind to address {bind_address}: {e}"))?;
            serve_tcp(listener, router, shutdown_signal()).await
        }
        // We are running as a Unix socket
        (None, Some(socket_path)) => serve_unix(socket_path, router, shutdown_signal()).await,
        // This should never happen due to CLI argument groups
        (Some(_), Some(_)) => Err(anyhow!(
            "Cannot specify both --bind-address and --socket-path"
        )),
    }
}

/// Whether clients without forwarding headers fall into a single rate limit bucket
///
/// A Unix socket has no peer address, so only forwarding headers can tell
/// clients apart.
pub fn rate_limit_shares_key(config: &ServerConfig) -> bool {
    config.rate_limit_rps.is_some() && config.socket_path.is_some()
}

/// Bound request handling time, answering 504 once exceeded
pub fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(axum::http::StatusCode::GATEWAY_TIMEOUT, timeout)
}

/// Assemble the router with request tracing, timeout and optional rate limiting
pub fn build_router(config: &ServerConfig) -> Result<Router> {
    validate_fallback_path(&config.fallback_path)?;
    // Create tracing layer for request logging
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = generate_request_id();
            tracing::info_span!(
                "http_request",
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            debug!(
                method = %request.method(),
                uri = %request.uri(),
                "HTTP request started"
            );
        })
        .on_response(
            |response: &axum::http::Response<_>, latency: Duration, _span: &tracing::Span| {
                let status = response.status();
                counter!("chat_fallback.total_requests").increment(1);
                histogram!("chat_fallback.request_duration_ms")
                    .record(latency.as_secs_f64() * 1000.0);
                // 503 is the expected answer on the fallback path
                if status.is_client_error()
                    || (status.is_server_error()
                        && status != axum::http::StatusCode::SERVICE_UNAVAILABLE)
                {
                    counter!("chat_fallback.total_errors").increment(1);
                    warn!(
                        status = %status,
                        latency = %format_duration(latency),
                        "HTTP request failed"
                    );
                } else {
                    info!(
                        status = %status,
                        latency = %format_duration(latency),
                        "HTTP request completed"
                    );
                }
            },
        );
    let mut router = router(&config.fallback_path)
        .layer(timeout_layer(config.request_timeout))
        .layer(trace_layer);
    // Add rate limiting if specified
    if let Some(rps) = config.rate_limit_rps {
        router = router.layer(create_rate_limit_layer(rps, config.rate_limit_burst)?);
    }
    Ok(router)
}

/// Serve the router over TCP until the shutdown future completes
pub async fn serve_tcp<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(
        bind_address = %listener.local_addr()?,
        "Starting fallback server in HTTP mode"
    );
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    info!("Fallback server stopped");
    Ok(())
}

/// Serve the router over a Unix socket until the shutdown future completes
#[cfg(unix)]
pub async fn serve_unix<F>(socket_path: &str, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let socket_path = std::path::Path::new(socket_path);
    // Remove existing socket file if it exists
    if socket_path.exists() {
        tokio::fs::remove_file(socket_path).await?;
        info!(
            socket_path = %socket_path.display(),
            "Removed existing Unix socket file"
        );
    }
    let listener = tokio::net::UnixListener::bind(socket_path)
        .map_err(|e| anyhow!("Failed to bind to socket {}: {e}", socket_path.display()))?;
    info!(
        socket_path = %socket_path.display(),
        "Starting fallback server in Unix socket mode"
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    if let Err(e) = tokio::fs::remove_file(socket_path).await {
        warn!(error = %e, "Failed to remove Unix socket file");
    }
    info!("Fallback server stopped");
    Ok(())
}

#[cfg(not(unix))]
pub async fn serve_unix<F>(_socket_path: &str, _router: Router, _shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    Err(anyhow!("Unix sockets are not supported on this platform"))
}

/// Resolve once Ctrl+C or SIGTERM is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
