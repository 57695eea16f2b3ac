//! Token authentication and route guards.
//!
//! Authentication is split in two: a middleware that decodes whatever token
//! the request carries without ever rejecting, and per-route guards that
//! decide whether the decoded identity (or its absence) is acceptable. A
//! garbage token therefore behaves exactly like no token at all.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::token::Claims;

/// Identity attached to every request by [`authenticate`]. `None` means the
/// request carried no token, or one that failed verification.
#[derive(Debug, Clone, Default)]
pub struct AuthContext(pub Option<Claims>);

/// Decode the `Authorization: Bearer <token>` header, if present, and stash
/// the claims in request extensions. Never rejects; authorization decisions
/// belong to the guards below.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let claims = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .and_then(|token| state.tokens.verify(token).ok());

    request.extensions_mut().insert(AuthContext(claims));

    next.run(request).await
}

/// Require any authenticated identity.
pub fn ensure_logged_in(ctx: &AuthContext) -> Result<&Claims, ApiError> {
    ctx.0.as_ref().ok_or(ApiError::Unauthorized)
}

/// Require the identity to be `target` or an admin.
pub fn ensure_correct_user_or_admin<'a>(
    ctx: &'a AuthContext,
    target: &str,
) -> Result<&'a Claims, ApiError> {
    let claims = ensure_logged_in(ctx)?;

    if claims.is_admin || claims.username == target {
        Ok(claims)
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// Require an admin identity.
pub fn ensure_admin(ctx: &AuthContext) -> Result<&Claims, ApiError> {
    let claims = ensure_logged_in(ctx)?;

    if claims.is_admin {
        Ok(claims)
    } else {
        Err(ApiError::Unauthorized)
    }
}
