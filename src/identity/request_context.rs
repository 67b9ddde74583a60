use axum::http::HeaderMap;
use uuid::Uuid;

use super::Principal;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request state threaded through the token handler.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub principal: Principal,
}

impl RequestContext {
    pub fn new(request_id: String, principal: Principal) -> Self {
        Self { request_id, principal }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self { request_id: Uuid::new_v4().to_string(), principal: Principal::anonymous() }
    }
}

/// Reuse the caller's request id when it is present and printable, otherwise mint one.
pub fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
