use anyhow::{Result, anyhow};
use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::http::{Response, StatusCode};
use governor::middleware::NoOpMiddleware;
use metrics::counter;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_governor::{
    GovernorLayer, errors::GovernorError, governor::GovernorConfigBuilder,
    key_extractor::KeyExtractor,
};
use tracing::{debug, warn};

/// Body returned to clients over their request budget
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded";

/// Headers inspected for the originating client address, in order of preference
const CLIENT_IP_HEADERS: [&str; 4] = [
    "X-Real-IP",        // Nginx
    "X-Client-IP",      // Proxies
    "CF-Connecting-IP", // Cloudflare
    "True-Client-IP",   // Akamai
];

/// Key extractor that identifies the client behind the gateway
///
/// Forwarding headers set by the gateway take precedence over the peer
/// address, since the peer is usually the gateway itself.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ClientIpKeyExtractor;

impl KeyExtractor for ClientIpKeyExtractor {
    type Key = String;

    fn extract<B>(&self, req: &Request<B>) -> Result<Self::Key, GovernorError> {
        let headers = req.headers();
        let ip = headers
            .get("X-Forwarded-For")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                CLIENT_IP_HEADERS.iter().find_map(|name| {
                    headers
                        .get(*name)
                        .and_then(|h| h.to_str().ok())
                        .map(|s| s.trim())
                        .filter(|s| !s.is_empty())
                })
            });
        if let Some(ip) = ip {
            debug!(ip = ip, "Extracted client address from headers");
            return Ok(ip.to_string());
        }
        // Only present when served with connect info over TCP
        if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
            debug!(ip = ?addr.ip(), "Extracted client address from socket");
            return Ok(addr.ip().to_string());
        }
        debug!("Could not identify client, using shared rate limit key");
        Ok("unknown".to_string())
    }
}

/// Interval after which one request of a client's quota is replenished
pub fn replenish_interval_nanos(rps: u32) -> u64 {
    (1_000_000_000 / u64::from(rps.max(1))).max(1)
}

/// Create a rate limiting layer allowing `rps` requests per second per client
pub fn create_rate_limit_layer(
    rps: u32,
    burst: u32,
) -> Result<GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware, Body>> {
    if rps == 0 || burst == 0 {
        return Err(anyhow!(
            "Rate limit requires a non-zero rate and burst (rps={rps}, burst={burst})"
        ));
    }
    debug!(rps, burst, "Configuring the HTTP rate limiter");
    let config = GovernorConfigBuilder::default()
        .per_nanosecond(replenish_interval_nanos(rps))
        .burst_size(burst)
        .key_extractor(ClientIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("Failed to create rate limit configuration"))?;
    Ok(GovernorLayer::new(Arc::new(config)).error_handler(|e| {
        warn!("Rate limit exceeded: {e}");
        counter!("chat_fallback.total_errors").increment(1);
        counter!("chat_fallback.total_rate_limit_errors").increment(1);
        let mut response = Response::new(Body::from(RATE_LIMIT_MESSAGE));
        *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        response
    }))
}
