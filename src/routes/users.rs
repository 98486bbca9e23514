// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User, session and channel routes under `/api/v1/users`.
//!
//! Multipart uploads are staged into the configured upload directory under
//! random names before the account service hands them to object storage.

use crate::error::{AppError, Result};
use crate::middleware::auth::{AuthUser, Viewer, ACCESS_COOKIE};
use crate::models::{ChannelProfile, PublicUser, WatchHistoryEntry};
use crate::services::{ImageKind, RegisterInput, TokenPair};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Routes that need no authentication.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh-token", post(refresh_token))
}

/// Routes that identify the viewer when they can.
pub fn viewer_routes() -> Router<Arc<AppState>> {
    Router::new().route("/c/{username}", get(channel_profile))
}

/// Routes behind the access token gate.
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/logout", post(logout))
        .route("/change-password", post(change_password))
        .route("/current-user", get(current_user))
        .route("/update-account", patch(update_account))
        .route("/avatar", patch(update_avatar))
        .route("/cover-image", patch(update_cover_image))
        .route("/history", get(watch_history))
}

// ─── Response envelope ───────────────────────────────────────

/// Uniform success body.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub status_code: u16,
    pub data: T,
    pub message: String,
    pub success: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status: StatusCode, data: T, message: &str) -> Self {
        Self {
            status_code: status.as_u16(),
            data,
            message: message.to_string(),
            success: status.is_success(),
        }
    }

    pub fn ok(data: T, message: &str) -> Self {
        Self::new(StatusCode::OK, data, message)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// Empty `data` object.
#[derive(Serialize)]
pub struct Empty {}

// ─── Cookies ─────────────────────────────────────────────────

fn session_cookie(name: &'static str, value: String, ttl_secs: u64) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(
            i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        ))
        .build()
}

fn with_session_cookies(state: &AppState, jar: CookieJar, tokens: &TokenPair) -> CookieJar {
    jar.add(session_cookie(
        ACCESS_COOKIE,
        tokens.access_token.clone(),
        state.tokens.access_ttl_secs(),
    ))
    .add(session_cookie(
        REFRESH_COOKIE,
        tokens.refresh_token.clone(),
        state.tokens.refresh_ttl_secs(),
    ))
}

/// Expire both cookies. Removal cookies are added outright, since the jar
/// only removes cookies the request actually sent.
fn without_session_cookies(jar: CookieJar) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, String::new(), 0))
        .add(session_cookie(REFRESH_COOKIE, String::new(), 0))
}

// ─── Multipart staging ───────────────────────────────────────

/// Text fields and staged files from one multipart body.
#[derive(Debug, Default)]
struct StagedForm {
    text: HashMap<String, String>,
    files: HashMap<String, PathBuf>,
}

impl StagedForm {
    fn text(&self, name: &str) -> String {
        self.text.get(name).cloned().unwrap_or_default()
    }

    async fn discard(self) {
        for path in self.files.values() {
            if let Err(e) = tokio::fs::remove_file(path).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged upload");
            }
        }
    }
}

/// Random file name that keeps a short alphanumeric extension.
fn staged_name(original: Option<&str>) -> String {
    let ext = original
        .and_then(|name| FsPath::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()));

    match ext {
        Some(ext) => format!("{}.{}", uuid::Uuid::new_v4(), ext.to_ascii_lowercase()),
        None => uuid::Uuid::new_v4().to_string(),
    }
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::BadRequest(format!("Invalid multipart body: {}", e))
}

async fn read_fields(
    upload_dir: &FsPath,
    multipart: &mut Multipart,
    file_fields: &[&str],
    form: &mut StagedForm,
) -> Result<()> {
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create upload directory: {}", e))?;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if file_fields.contains(&name.as_str()) {
            if form.files.contains_key(&name) {
                continue;
            }
            let file_name = field.file_name().map(str::to_string);
            let bytes = field.bytes().await.map_err(bad_multipart)?;
            if bytes.is_empty() {
                continue;
            }
            let path = upload_dir.join(staged_name(file_name.as_deref()));
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to stage upload: {}", e))?;
            tracing::debug!(field = %name, size = bytes.len(), "Upload staged");
            form.files.insert(name, path);
        } else {
            let value = field.text().await.map_err(bad_multipart)?;
            form.text.insert(name, value);
        }
    }
    Ok(())
}

/// Read a multipart body, staging the named file fields. Nothing is left
/// behind on disk if reading fails halfway.
async fn read_form(state: &AppState, mut multipart: Multipart, file_fields: &[&str]) -> Result<StagedForm> {
    let mut form = StagedForm::default();
    match read_fields(&state.config.upload_dir, &mut multipart, file_fields, &mut form).await {
        Ok(()) => Ok(form),
        Err(e) => {
            form.discard().await;
            Err(e)
        }
    }
}

// ─── Registration and sessions ───────────────────────────────

async fn register(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<ApiResponse<PublicUser>> {
    let mut form = read_form(&state, multipart, &["avatar", "coverImage"]).await?;

    let input = RegisterInput {
        full_name: form.text("fullName"),
        email: form.text("email"),
        username: form.text("username"),
        password: form.text("password"),
        avatar_path: form.files.remove("avatar"),
        cover_image_path: form.files.remove("coverImage"),
    };
    let user = state.accounts.register(input).await?;

    Ok(ApiResponse::new(
        StatusCode::CREATED,
        user,
        "User registered successfully",
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LoginData {
    pub user: PublicUser,
    pub access_token: String,
    pub refresh_token: String,
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, ApiResponse<LoginData>)> {
    let outcome = state
        .sessions
        .login(req.username.as_deref(), req.email.as_deref(), &req.password)
        .await?;

    let jar = with_session_cookies(&state, jar, &outcome.tokens);
    let data = LoginData {
        user: outcome.user,
        access_token: outcome.tokens.access_token,
        refresh_token: outcome.tokens.refresh_token,
    };
    Ok((jar, ApiResponse::ok(data, "User logged in successfully")))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TokenData {
    pub access_token: String,
    pub refresh_token: String,
}

/// Rotate the refresh token. Cookie first, then a JSON body field; the body
/// is optional so a cookie-only client can send nothing.
async fn refresh_token(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, ApiResponse<TokenData>)> {
    let from_cookie = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());
    let incoming = match from_cookie {
        Some(token) => Some(token),
        None => serde_json::from_slice::<RefreshRequest>(&body)
            .unwrap_or_default()
            .refresh_token,
    };

    let tokens = state.sessions.refresh(incoming.as_deref()).await?;

    let jar = with_session_cookies(&state, jar, &tokens);
    let data = TokenData {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    };
    Ok((jar, ApiResponse::ok(data, "Access token refreshed")))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<Empty>)> {
    state.sessions.logout(&user.user_id).await?;
    Ok((
        without_session_cookies(jar),
        ApiResponse::ok(Empty {}, "User logged out"),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password: String,
}

async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<ApiResponse<Empty>> {
    state
        .sessions
        .change_password(&user.user_id, &req.old_password, &req.new_password)
        .await?;
    Ok(ApiResponse::ok(Empty {}, "Password changed successfully"))
}

// ─── Account ─────────────────────────────────────────────────

async fn current_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<ApiResponse<PublicUser>> {
    let user = state.accounts.current_user(&user.user_id).await?;
    Ok(ApiResponse::ok(user, "User fetched successfully"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
}

async fn update_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateAccountRequest>,
) -> Result<ApiResponse<PublicUser>> {
    let user = state
        .accounts
        .update_account_details(&user.user_id, &req.full_name, &req.email)
        .await?;
    Ok(ApiResponse::ok(user, "Account details updated successfully"))
}

async fn update_image(
    state: &AppState,
    user: &AuthUser,
    multipart: Multipart,
    kind: ImageKind,
    field: &str,
) -> Result<PublicUser> {
    let mut form = read_form(state, multipart, &[field]).await?;
    let staged = form.files.remove(field);
    state.accounts.update_image(&user.user_id, kind, staged).await
}

async fn update_avatar(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<ApiResponse<PublicUser>> {
    let user = update_image(&state, &user, multipart, ImageKind::Avatar, "avatar").await?;
    Ok(ApiResponse::ok(user, "Avatar image updated successfully"))
}

async fn update_cover_image(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<ApiResponse<PublicUser>> {
    let user = update_image(
        &state,
        &user,
        multipart,
        ImageKind::CoverImage,
        "coverImage",
    )
    .await?;
    Ok(ApiResponse::ok(user, "Cover image updated successfully"))
}

// ─── Views ───────────────────────────────────────────────────

async fn channel_profile(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<Viewer>,
    Path(username): Path<String>,
) -> Result<ApiResponse<ChannelProfile>> {
    let profile = state
        .views
        .channel_profile(viewer.0.as_deref(), &username)
        .await?;
    Ok(ApiResponse::ok(profile, "User channel fetched successfully"))
}

async fn watch_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<ApiResponse<Vec<WatchHistoryEntry>>> {
    let history = state.views.watch_history(&user.user_id).await?;
    Ok(ApiResponse::ok(history, "Watch history fetched successfully"))
}
