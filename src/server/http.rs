use anyhow::{Result, anyhow};
use axum::{Router, http::StatusCode, routing::get};

/// Body returned while the chat service is unreachable
pub const FALLBACK_MESSAGE: &str = "Chat is currently unavailable. Please try again later.";

/// Path the fallback responder is mounted at unless configured otherwise
pub const DEFAULT_FALLBACK_PATH: &str = "/fallback";

/// Path of the load balancer health probe
pub const HEALTH_PATH: &str = "/health";

/// Health check endpoint for load balancer health status checking
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Fallback endpoint invoked by the gateway when the chat service is down
pub async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::SERVICE_UNAVAILABLE, FALLBACK_MESSAGE)
}

/// Check that a fallback path can be mounted on the router
///
/// The router panics on malformed paths, so this runs before the router
/// is assembled and turns those cases into a configuration error.
pub fn validate_fallback_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(anyhow!("Fallback path must not be empty"));
    }
    if !path.starts_with('/') {
        return Err(anyhow!("Fallback path must start with '/': {path}"));
    }
    if path.contains(['{', '}']) {
        return Err(anyhow!(
            "Fallback path must not contain capture braces: {path}"
        ));
    }
    if path
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
    {
        return Err(anyhow!(
            "Fallback path must not contain ':' or '*' segments: {path}"
        ));
    }
    if path == HEALTH_PATH {
        return Err(anyhow!(
            "Fallback path must not collide with the health endpoint {HEALTH_PATH}"
        ));
    }
    Ok(())
}

/// Build the router serving the fallback and health endpoints
///
/// Only GET and POST are bound on the fallback path. Any other method is
/// answered by the router itself with 405 Method Not Allowed.
pub fn router(fallback_path: &str) -> Router {
    Router::new()
        .route(fallback_path, get(fallback).post(fallback))
        .route(HEALTH_PATH, get(health))
}
