// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access/refresh token minting, validation and rotation.
//!
//! Access tokens and refresh tokens are HS256 JWTs signed with different
//! keys. Only the SHA-256 digest of the current refresh token is stored on
//! the user record; that single field is the whole revocation state:
//! - login overwrites it unconditionally,
//! - rotation overwrites it only if it still holds the presented token,
//! - logout removes it.

use crate::config::Config;
use crate::db::{RefreshSwap, Store};
use crate::error::{AppError, Result};
use crate::models::User;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

/// Claims carried by an access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessClaims {
    /// Subject (user ID)
    pub sub: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    /// Random token ID so tokens minted in the same second differ
    pub jti: String,
}

/// Claims carried by a refresh token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshClaims {
    /// Subject (user ID)
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    pub jti: String,
}

/// A freshly minted token pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// A refresh token that passed all three checks.
#[derive(Debug, Clone)]
pub struct ValidatedRefresh {
    pub user: User,
    /// Digest of the presented token, used as the swap precondition
    token_hash: String,
}

/// SHA-256 hex digest of a token, as stored on the user record.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn invalid_refresh() -> AppError {
    AppError::Unauthorized("Invalid refresh token".to_string())
}

fn unix_now() -> anyhow::Result<usize> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize)
}

fn expires_at(now: usize, ttl_secs: u64) -> anyhow::Result<usize> {
    usize::try_from(ttl_secs)
        .ok()
        .and_then(|ttl| now.checked_add(ttl))
        .ok_or_else(|| anyhow::anyhow!("token lifetime {}s is out of range", ttl_secs))
}

/// HS256 only, and no grace period after `exp`.
fn strict_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation
}

/// Mints, validates and rotates session tokens against the user store.
#[derive(Clone)]
pub struct TokenService {
    db: Arc<dyn Store>,
    access_key: Vec<u8>,
    refresh_key: Vec<u8>,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl TokenService {
    pub fn new(config: &Config, db: Arc<dyn Store>) -> Self {
        Self {
            db,
            access_key: config.access_token_secret.clone(),
            refresh_key: config.refresh_token_secret.clone(),
            access_ttl_secs: config.access_token_ttl_secs,
            refresh_ttl_secs: config.refresh_token_ttl_secs,
        }
    }

    pub fn access_ttl_secs(&self) -> u64 {
        self.access_ttl_secs
    }

    pub fn refresh_ttl_secs(&self) -> u64 {
        self.refresh_ttl_secs
    }

    /// Sign both tokens for `user`. Nothing is persisted.
    fn mint(&self, user: &User) -> anyhow::Result<TokenPair> {
        let now = unix_now()?;
        let header = Header::new(Algorithm::HS256);

        let access = AccessClaims {
            sub: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            iat: now,
            exp: expires_at(now, self.access_ttl_secs)?,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let refresh = RefreshClaims {
            sub: user.id.clone(),
            iat: now,
            exp: expires_at(now, self.refresh_ttl_secs)?,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        Ok(TokenPair {
            access_token: encode(&header, &access, &EncodingKey::from_secret(&self.access_key))?,
            refresh_token: encode(
                &header,
                &refresh,
                &EncodingKey::from_secret(&self.refresh_key),
            )?,
        })
    }

    async fn try_issue(&self, user_id: &str) -> anyhow::Result<TokenPair> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {} not found", user_id))?;

        let pair = self.mint(&user)?;
        let stored = self
            .db
            .swap_refresh_token(
                &user.id,
                RefreshSwap::Unconditional,
                &hash_token(&pair.refresh_token),
            )
            .await?;
        if !stored {
            anyhow::bail!("user {} disappeared while storing refresh token", user_id);
        }

        Ok(pair)
    }

    /// Mint a pair for `user_id` and make its refresh token the current one.
    ///
    /// Every failure is reported as a generic internal error; the cause is
    /// only logged.
    pub async fn issue_token_pair(&self, user_id: &str) -> Result<TokenPair> {
        self.try_issue(user_id).await.map_err(|e| {
            tracing::error!(user_id, error = %e, "Token issuance failed");
            AppError::Internal(anyhow::anyhow!(
                "Something went wrong while generating access and refresh token"
            ))
        })
    }

    /// Check a presented refresh token: signature and expiry, then that the
    /// user exists, then that it is the user's current token.
    pub async fn validate_refresh_token(&self, token: Option<&str>) -> Result<ValidatedRefresh> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Unauthorized request".to_string()))?;

        let claims = decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(&self.refresh_key),
            &strict_validation(),
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => {
                AppError::Unauthorized("Refresh token is expired".to_string())
            }
            _ => invalid_refresh(),
        })?
        .claims;

        let user = self
            .db
            .get_user(&claims.sub)
            .await?
            .ok_or_else(invalid_refresh)?;

        let token_hash = hash_token(token);
        let matches_current = user
            .refresh_token_hash
            .as_deref()
            .map(|stored| bool::from(stored.as_bytes().ct_eq(token_hash.as_bytes())))
            .unwrap_or(false);
        if !matches_current {
            tracing::warn!(user_id = %user.id, "Refresh token is not the current one");
            return Err(AppError::Unauthorized(
                AppError::REFRESH_TOKEN_USED.to_string(),
            ));
        }

        Ok(ValidatedRefresh { user, token_hash })
    }

    /// Replace a validated refresh token with a new pair.
    ///
    /// The store write is conditional on the stored digest still matching
    /// the presented token, so of two concurrent rotations with the same
    /// token exactly one succeeds.
    pub async fn rotate(&self, validated: &ValidatedRefresh) -> Result<TokenPair> {
        let pair = self.mint(&validated.user).map_err(|e| {
            tracing::error!(user_id = %validated.user.id, error = %e, "Token minting failed");
            AppError::Internal(anyhow::anyhow!(
                "Something went wrong while generating access and refresh token"
            ))
        })?;

        let swapped = self
            .db
            .swap_refresh_token(
                &validated.user.id,
                RefreshSwap::IfCurrent(validated.token_hash.clone()),
                &hash_token(&pair.refresh_token),
            )
            .await?;
        if !swapped {
            tracing::warn!(user_id = %validated.user.id, "Refresh token rotation lost the race");
            return Err(AppError::Unauthorized(
                AppError::REFRESH_TOKEN_USED.to_string(),
            ));
        }

        tracing::info!(user_id = %validated.user.id, "Refresh token rotated");
        Ok(pair)
    }

    /// Verify an access token and return its claims.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims> {
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(&self.access_key),
            &strict_validation(),
        )
        .map(|data| data.claims)
        .map_err(|_| AppError::Unauthorized("Invalid access token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryDb, UserStore};

    async fn setup() -> (TokenService, InMemoryDb, User) {
        let db = InMemoryDb::new();
        let user = User::new(
            "alice",
            "alice@example.com",
            "Alice",
            "$argon2id$fake".to_string(),
            "https://cdn.example.com/a.png".to_string(),
            None,
            "2024-01-15T12:00:00Z",
        );
        db.create_user(&user).await.unwrap();
        let service = TokenService::new(&Config::default(), Arc::new(db.clone()));
        (service, db, user)
    }

    #[test]
    fn test_hash_token_is_sha256_hex() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_issue_stores_digest_not_token() {
        let (service, db, user) = setup().await;

        let pair = service.issue_token_pair(&user.id).await.unwrap();

        let stored = db.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(
            stored.refresh_token_hash,
            Some(hash_token(&pair.refresh_token))
        );
        assert_ne!(pair.access_token, pair.refresh_token);
    }

    #[tokio::test]
    async fn test_issue_for_unknown_user_is_internal() {
        let (service, _, _) = setup().await;
        let err = service.issue_token_pair("missing").await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn test_access_token_carries_identity() {
        let (service, _, user) = setup().await;
        let pair = service.issue_token_pair(&user.id).await.unwrap();

        let claims = service.verify_access_token(&pair.access_token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.username, "alice");
        assert!(claims.exp > claims.iat);
    }

    #[tokio::test]
    async fn test_tokens_are_not_interchangeable() {
        let (service, _, user) = setup().await;
        let pair = service.issue_token_pair(&user.id).await.unwrap();

        assert!(service.verify_access_token(&pair.refresh_token).is_err());
        let err = service
            .validate_refresh_token(Some(&pair.access_token))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(msg) if msg == "Invalid refresh token"));
    }

    #[tokio::test]
    async fn test_missing_refresh_token() {
        let (service, _, _) = setup().await;
        for token in [None, Some(""), Some("   ")] {
            let err = service.validate_refresh_token(token).await.unwrap_err();
            assert!(matches!(err, AppError::Unauthorized(msg) if msg == "Unauthorized request"));
        }
    }

    #[tokio::test]
    async fn test_expired_refresh_token() {
        let (service, _, user) = setup().await;
        let now = unix_now().unwrap();
        let claims = RefreshClaims {
            sub: user.id.clone(),
            iat: now - 7200,
            exp: now - 3600,
            jti: "old".to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&Config::default().refresh_token_secret),
        )
        .unwrap();

        let err = service
            .validate_refresh_token(Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(msg) if msg == "Refresh token is expired"));
    }

    fn refresh_token_expiring_at(user: &User, exp: usize) -> String {
        let claims = RefreshClaims {
            sub: user.id.clone(),
            iat: exp.saturating_sub(3600),
            exp,
            jti: "recent".to_string(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&Config::default().refresh_token_secret),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_just_expired_refresh_token_gets_no_grace() {
        let (service, _, user) = setup().await;
        let token = refresh_token_expiring_at(&user, unix_now().unwrap() - 5);

        let err = service
            .validate_refresh_token(Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(msg) if msg == "Refresh token is expired"));
    }

    #[tokio::test]
    async fn test_out_of_range_lifetime_is_internal_error() {
        let db = InMemoryDb::new();
        let user = User::new(
            "bob",
            "bob@example.com",
            "Bob",
            "$argon2id$fake".to_string(),
            "https://cdn.example.com/b.png".to_string(),
            None,
            "2024-01-15T12:00:00Z",
        );
        db.create_user(&user).await.unwrap();

        for (access, refresh) in [(u64::MAX, 60), (60, u64::MAX)] {
            let config = Config {
                access_token_ttl_secs: access,
                refresh_token_ttl_secs: refresh,
                ..Config::default()
            };
            let service = TokenService::new(&config, Arc::new(db.clone()));

            let err = service.issue_token_pair(&user.id).await.unwrap_err();
            assert!(matches!(err, AppError::Internal(_)));
        }
        let stored = db.get_user(&user.id).await.unwrap().unwrap();
        assert!(stored.refresh_token_hash.is_none());
    }

    #[test]
    fn test_expires_at_checks_range() {
        assert_eq!(expires_at(1_000, 60).unwrap(), 1_060);
        assert!(expires_at(usize::MAX - 10, 60).is_err());
    }

    #[tokio::test]
    async fn test_rotation_yields_new_token_and_burns_old() {
        let (service, _, user) = setup().await;
        let first = service.issue_token_pair(&user.id).await.unwrap();

        let validated = service
            .validate_refresh_token(Some(&first.refresh_token))
            .await
            .unwrap();
        let second = service.rotate(&validated).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        let err = service
            .validate_refresh_token(Some(&first.refresh_token))
            .await
            .unwrap_err();
        assert!(err.is_reused_refresh_token());

        // Rotating with the stale validation also fails.
        let err = service.rotate(&validated).await.unwrap_err();
        assert!(err.is_reused_refresh_token());
    }
}
