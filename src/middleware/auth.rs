// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access token authentication middleware.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// Cookie carrying the access token.
pub const ACCESS_COOKIE: &str = "accessToken";

/// Authenticated user extracted from the access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// Viewer identity for routes where authentication is optional.
#[derive(Debug, Clone, Default)]
pub struct Viewer(pub Option<String>);

/// Access token from the cookie, else from an `Authorization: Bearer` header.
fn access_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(ACCESS_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Verify the token and make sure its user still exists.
async fn authenticate(state: &AppState, token: &str) -> Result<String, AppError> {
    let claims = state.tokens.verify_access_token(token)?;

    state
        .db
        .get_user(&claims.sub)
        .await?
        .map(|user| user.id)
        .ok_or_else(|| AppError::Unauthorized("Invalid access token".to_string()))
}

/// Middleware that requires a valid access token.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = access_token(&jar, request.headers())
        .ok_or_else(|| AppError::Unauthorized("Unauthorized request".to_string()))?;

    let user_id = authenticate(&state, &token).await?;
    request.extensions_mut().insert(AuthUser { user_id });

    Ok(next.run(request).await)
}

/// Middleware that identifies the viewer if it can. A missing or bad token
/// makes the request anonymous rather than failing it.
pub async fn identify_viewer(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let viewer = match access_token(&jar, request.headers()) {
        Some(token) => match authenticate(&state, &token).await {
            Ok(user_id) => Some(user_id),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unusable access token");
                None
            }
        },
        None => None,
    };
    request.extensions_mut().insert(Viewer(viewer));

    next.run(request).await
}
