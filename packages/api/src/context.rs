// ABOUTME: Tenant context extraction for API requests
// ABOUTME: Pulls org and actor identity from headers; no org, no request

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::Json as ResponseJson,
};

use vantage_core::{Actor, RequestContext};

use crate::response::ApiResponse;

pub const ORG_HEADER: &str = "x-org-id";
pub const ACTOR_HEADER: &str = "x-actor-email";

/// Extracted request scope. Upstream auth middleware has already
/// verified the caller; these headers carry what it resolved.
#[derive(Debug, Clone)]
pub struct ApiContext(pub RequestContext);

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl<S> FromRequestParts<S> for ApiContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, ResponseJson<ApiResponse<()>>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(org_id) = header_value(parts, ORG_HEADER) else {
            return Err((
                StatusCode::BAD_REQUEST,
                ResponseJson(ApiResponse::<()>::error(format!(
                    "Missing {} header",
                    ORG_HEADER
                ))),
            ));
        };

        // Requests without an actor email are system calls (the delivery
        // scheduler, retention jobs).
        let actor = match header_value(parts, ACTOR_HEADER) {
            Some(email) => Actor::user(email),
            None => Actor::system(),
        };

        Ok(ApiContext(RequestContext::new(org_id, actor)))
    }
}
