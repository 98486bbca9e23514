// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session lifecycle: login, refresh, logout and password change.
//!
//! Cookie transport is handled by the route layer; this service only
//! decides who gets which tokens.

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::user::normalize_handle;
use crate::models::{PublicUser, UserPatch};
use crate::services::password::{hash_password_async, verify_password_async};
use crate::services::tokens::{TokenPair, TokenService};
use std::sync::Arc;

/// A successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: PublicUser,
    pub tokens: TokenPair,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(normalize_handle)
        .filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct SessionService {
    db: Arc<dyn Store>,
    tokens: TokenService,
}

impl SessionService {
    pub fn new(db: Arc<dyn Store>, tokens: TokenService) -> Self {
        Self { db, tokens }
    }

    /// Authenticate with username or email plus password.
    pub async fn login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        password: &str,
    ) -> Result<LoginOutcome> {
        let username = non_blank(username);
        let email = non_blank(email);
        if username.is_none() && email.is_none() {
            return Err(AppError::BadRequest(
                "username or email is required".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(AppError::BadRequest("password is required".to_string()));
        }

        let user = self
            .db
            .find_user_by_login(username.as_deref(), email.as_deref())
            .await?
            .ok_or_else(|| AppError::NotFound("User does not exist".to_string()))?;

        let valid =
            verify_password_async(password.to_string(), user.password_hash.clone()).await?;
        if !valid {
            tracing::info!(user_id = %user.id, "Login rejected: bad password");
            return Err(AppError::Unauthorized(
                "Invalid user credentials".to_string(),
            ));
        }

        let tokens = self.tokens.issue_token_pair(&user.id).await?;
        tracing::info!(user_id = %user.id, "User logged in");

        Ok(LoginOutcome {
            user: PublicUser::from(&user),
            tokens,
        })
    }

    /// Exchange a refresh token for a new pair. Errors carry their specific
    /// reason so the client can tell "log in again" apart from other failures.
    pub async fn refresh(&self, incoming: Option<&str>) -> Result<TokenPair> {
        let validated = self.tokens.validate_refresh_token(incoming).await?;
        self.tokens.rotate(&validated).await
    }

    /// Revoke the user's refresh token. The caller is already authenticated.
    pub async fn logout(&self, user_id: &str) -> Result<()> {
        self.db.clear_refresh_token(user_id).await?;
        tracing::info!(user_id, "User logged out");
        Ok(())
    }

    /// Replace the password after checking the old one.
    pub async fn change_password(
        &self,
        user_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User does not exist".to_string()))?;

        let valid =
            verify_password_async(old_password.to_string(), user.password_hash.clone()).await?;
        if !valid {
            return Err(AppError::BadRequest("Invalid old password".to_string()));
        }
        if new_password.trim().is_empty() {
            return Err(AppError::BadRequest("New password is required".to_string()));
        }

        let patch = UserPatch {
            password_hash: Some(hash_password_async(new_password.to_string()).await?),
            ..Default::default()
        };
        self.db
            .update_user_fields(user_id, &patch)
            .await?
            .ok_or_else(|| AppError::NotFound("User does not exist".to_string()))?;

        tracing::info!(user_id, "Password changed");
        Ok(())
    }
}
