use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use uploadstream_service::authenticate;

use crate::{AppState, HttpError};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const USER_ID_HEADER: &str = "x-user-id";

/// API key from `x-api-key`, or from `Authorization: Bearer <key>`.
fn api_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(key);
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Rejects unauthenticated requests and stores the caller's
/// [`uploadstream_service::Principal`] in the request extensions.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let headers = request.headers();
    let owner_id = headers.get(USER_ID_HEADER).and_then(|v| v.to_str().ok());
    let principal = authenticate(state.credentials.as_ref(), api_key(headers), owner_id)?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
