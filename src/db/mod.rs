// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer: store traits plus Firestore and in-memory backends.
//!
//! Services only see the traits. Every method is a single document-level
//! operation (or a read-only query) so no caller needs to hold a lock
//! across an `.await`.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::InMemoryDb;

use crate::error::AppError;
use crate::models::{OwnerSummary, User, UserPatch, Video};
use async_trait::async_trait;
use std::collections::HashMap;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Uniqueness reservations for usernames and emails
    pub const USER_HANDLES: &str = "user_handles";
    pub const SUBSCRIPTIONS: &str = "subscriptions";
    pub const VIDEOS: &str = "videos";
}

/// Precondition for replacing the stored refresh token hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshSwap {
    /// Overwrite whatever is stored (login).
    Unconditional,
    /// Overwrite only if the stored hash still equals this value (rotation).
    IfCurrent(String),
}

/// Credential Store: persisted user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Fails with `Conflict` if the username or email
    /// is already taken; nothing is written in that case.
    async fn create_user(&self, user: &User) -> Result<(), AppError>;

    /// Point lookup by ID.
    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError>;

    /// Lookup by username OR email (both already normalized).
    async fn find_user_by_login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, AppError>;

    /// Resolve owner projections for a set of user IDs. Unknown IDs are
    /// absent from the result.
    async fn get_owner_summaries(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, OwnerSummary>, AppError>;

    /// Set the patched fields without touching the rest of the record.
    /// Returns the updated user, or `None` if it does not exist.
    /// Fails with `Conflict` if a new email belongs to another user.
    async fn update_user_fields(
        &self,
        id: &str,
        patch: &UserPatch,
    ) -> Result<Option<User>, AppError>;

    /// Replace the stored refresh token hash. Returns `false` if the user
    /// does not exist or the `IfCurrent` precondition failed.
    async fn swap_refresh_token(
        &self,
        id: &str,
        expected: RefreshSwap,
        new_hash: &str,
    ) -> Result<bool, AppError>;

    /// Remove the refresh token hash field (logout).
    async fn clear_refresh_token(&self, id: &str) -> Result<(), AppError>;
}

/// Read-only view of the subscription relation.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Number of edges whose channel is `channel_id`.
    async fn count_subscribers(&self, channel_id: &str) -> Result<u64, AppError>;

    /// Number of edges whose subscriber is `subscriber_id`.
    async fn count_subscriptions(&self, subscriber_id: &str) -> Result<u64, AppError>;

    /// Whether the edge `subscriber_id -> channel_id` exists.
    async fn is_subscribed(&self, subscriber_id: &str, channel_id: &str)
        -> Result<bool, AppError>;
}

/// Read-only view of the video relation.
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Batch resolve videos by ID. Missing IDs are skipped; the result
    /// order is unspecified.
    async fn get_videos(&self, ids: &[String]) -> Result<Vec<Video>, AppError>;
}

/// Everything a backend must provide.
pub trait Store: UserStore + SubscriptionStore + VideoStore {}

impl<T: UserStore + SubscriptionStore + VideoStore> Store for T {}
