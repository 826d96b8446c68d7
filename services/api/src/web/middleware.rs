//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::error::ApiError;
use crate::web::auth::session_id_from_headers;
use crate::web::state::AppState;

/// Middleware that validates the auth session cookie and resolves the caller.
///
/// If valid, inserts the `Principal` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let session_id = session_id_from_headers(req.headers())
        .map(str::to_string)
        .ok_or(ApiError::Unauthorized)?;

    let principal = state.identity.resolve(&session_id).await.map_err(|e| {
        debug!("Rejected auth session: {}", e);
        ApiError::from(e)
    })?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
