// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User model for storage and API.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Identity record stored in the `users` collection.
///
/// Field names are the stored document field names; keep them in sync with
/// the `paths!` field masks in the Firestore backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Opaque unique key (also used as document ID)
    pub id: String,
    /// Unique, always lowercase
    pub username: String,
    /// Unique, always lowercase
    pub email: String,
    pub full_name: String,
    /// Argon2 PHC string, never the plaintext
    pub password_hash: String,
    /// Avatar URL in object storage (required)
    pub avatar: String,
    /// Cover image URL in object storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    /// SHA-256 hex digest of the refresh token issued most recently.
    /// Absent when the user is logged out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_hash: Option<String>,
    /// Video IDs in the order they were watched
    #[serde(default)]
    pub watch_history: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Build a fresh user record with a new ID.
    ///
    /// Username and email are normalized to trimmed lowercase.
    pub fn new(
        username: &str,
        email: &str,
        full_name: &str,
        password_hash: String,
        avatar: String,
        cover_image: Option<String>,
        now: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: normalize_handle(username),
            email: normalize_handle(email),
            full_name: full_name.trim().to_string(),
            password_hash,
            avatar,
            cover_image,
            refresh_token_hash: None,
            watch_history: Vec::new(),
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }
}

/// Normalize a username or email for storage and lookup.
pub fn normalize_handle(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A field-scoped update: only the `Some` fields are written.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub cover_image: Option<String>,
    pub password_hash: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.email.is_none()
            && self.avatar.is_none()
            && self.cover_image.is_none()
            && self.password_hash.is_none()
    }

    /// Apply the patch to an in-memory record and bump `updated_at`.
    pub fn apply(&self, user: &mut User, now: &str) {
        if let Some(full_name) = &self.full_name {
            user.full_name = full_name.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(avatar) = &self.avatar {
            user.avatar = avatar.clone();
        }
        if let Some(cover_image) = &self.cover_image {
            user.cover_image = Some(cover_image.clone());
        }
        if let Some(password_hash) = &self.password_hash {
            user.password_hash = password_hash.clone();
        }
        user.updated_at = now.to_string();
    }
}

/// User as returned by the API: no password hash, no refresh token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub watch_history: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            avatar: user.avatar.clone(),
            cover_image: user.cover_image.clone(),
            watch_history: user.watch_history.clone(),
            created_at: user.created_at.clone(),
            updated_at: user.updated_at.clone(),
        }
    }
}

/// Reduced owner projection embedded in watch history entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct OwnerSummary {
    pub full_name: String,
    pub username: String,
    pub avatar: String,
}

impl From<&User> for OwnerSummary {
    fn from(user: &User) -> Self {
        Self {
            full_name: user.full_name.clone(),
            username: user.username.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_user() -> User {
        User::new(
            "  Alice ",
            "Alice@Example.COM",
            " Alice Liddell ",
            "$argon2id$fake".to_string(),
            "https://cdn.example.com/a.png".to_string(),
            None,
            "2024-01-15T12:00:00Z",
        )
    }

    #[test]
    fn test_new_user_normalizes_handles() {
        let user = make_user();
        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.full_name, "Alice Liddell");
        assert!(user.refresh_token_hash.is_none());
        assert!(user.watch_history.is_empty());
    }

    #[test]
    fn test_public_user_strips_secrets() {
        let mut user = make_user();
        user.refresh_token_hash = Some("deadbeef".to_string());

        let json = serde_json::to_value(PublicUser::from(&user)).unwrap();

        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password_hash").is_none());
        assert!(json.get("refreshTokenHash").is_none());
        assert_eq!(json["fullName"], "Alice Liddell");
        assert_eq!(json["username"], "alice");
    }

    #[test]
    fn test_logged_out_user_omits_refresh_field() {
        let user = make_user();
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("refresh_token_hash").is_none());
    }

    #[test]
    fn test_patch_only_touches_set_fields() {
        let mut user = make_user();
        let patch = UserPatch {
            avatar: Some("https://cdn.example.com/b.png".to_string()),
            ..Default::default()
        };

        patch.apply(&mut user, "2024-02-01T00:00:00Z");

        assert_eq!(user.avatar, "https://cdn.example.com/b.png");
        assert_eq!(user.full_name, "Alice Liddell");
        assert_eq!(user.password_hash, "$argon2id$fake");
        assert_eq!(user.updated_at, "2024-02-01T00:00:00Z");
        assert!(!patch.is_empty());
        assert!(UserPatch::default().is_empty());
    }
}
