use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{HeaderName, HeaderValue, Request, request::Parts},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::ApiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Identity resolved upstream and forwarded in a trusted header.
///
/// Token verification happens before requests reach this service; the
/// gateway strips any client-supplied copy of the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
}

impl Principal {
    /// The principal as an event creator id.
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.id).ok()
    }
}

/// Extracting a `Principal` makes the route require one.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("authentication required".into()))
    }
}

/// Propagates or assigns `X-Request-Id` and exposes it to the trace span.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);
    let value = req
        .headers()
        .get(&header_name)
        .cloned()
        .filter(|v| !v.is_empty())
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    if let Some(ref v) = value {
        req.extensions_mut().insert(v.clone());
    }

    let mut res = next.run(req).await;
    if let Some(v) = value {
        res.headers_mut().insert(header_name, v);
    }
    res
}

/// Turns the configured principal header into a [`Principal`] extension.
pub async fn resolve_principal(
    State(header): State<HeaderName>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let principal = req
        .headers()
        .get(&header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| Principal { id: id.to_string() });

    if let Some(principal) = principal {
        tracing::debug!(principal = %principal.id, "principal resolved");
        req.extensions_mut().insert(principal);
    }
    next.run(req).await
}
