use std::net::{IpAddr, SocketAddr};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{ClientIdentity, RateLimitDecision, RateLimiter};
use crate::config::FailurePolicy;
use crate::error::ApiError;
use crate::middleware::Principal;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: RateLimiter,
    /// Read the client address from proxy headers instead of the socket.
    pub trust_proxy_headers: bool,
}

/// Enforces the per-identity quota and reports it in `X-RateLimit-*` headers.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let identity = client_identity(&req, state.trust_proxy_headers);

    match state.limiter.check(&identity).await {
        Ok(decision) if decision.allowed => {
            let mut res = next.run(req).await;
            apply_headers(res.headers_mut(), &decision);
            res
        }
        Ok(decision) => {
            tracing::info!(
                identity = %identity,
                limit = decision.limit,
                retry_after_secs = decision.retry_after_secs,
                "rate limit exceeded"
            );
            let mut res = ApiError::RateLimited {
                retry_after_secs: decision.retry_after_secs,
            }
            .into_response();
            apply_headers(res.headers_mut(), &decision);
            res.headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(decision.retry_after_secs));
            res
        }
        Err(e) => match state.limiter.failure_policy() {
            FailurePolicy::Open => {
                tracing::warn!(identity = %identity, error = %e, "rate limit check failed, allowing request");
                let mut res = next.run(req).await;
                res.headers_mut()
                    .insert(LIMIT_HEADER, HeaderValue::from(state.limiter.limit()));
                res
            }
            FailurePolicy::Closed => {
                tracing::error!(identity = %identity, error = %e, "rate limit check failed, rejecting request");
                ApiError::Internal(format!("rate limit check failed: {e}")).into_response()
            }
        },
    }
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_at));
}

/// Principal first, then the client address.
pub(crate) fn client_identity<B>(req: &Request<B>, trust_proxy_headers: bool) -> ClientIdentity {
    if let Some(principal) = req.extensions().get::<Principal>() {
        return ClientIdentity::User(principal.id.clone());
    }
    if trust_proxy_headers && let Some(ip) = forwarded_ip(req.headers()) {
        return ClientIdentity::Ip(ip);
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| ClientIdentity::Ip(addr.ip()))
        .unwrap_or(ClientIdentity::Unknown)
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok());
    real_ip.or_else(|| {
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|hop| hop.trim().parse().ok())
    })
}
