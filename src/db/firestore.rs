// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides the store traits over these collections:
//! - `users` (identity records, keyed by user ID)
//! - `user_handles` (one document per username/email, used as a unique index)
//! - `subscriptions` (subscriber -> channel edges, read-only)
//! - `videos` (read-only)

use crate::db::{collections, RefreshSwap, SubscriptionStore, UserStore, VideoStore};
use crate::error::AppError;
use crate::models::{OwnerSummary, Subscription, User, UserPatch, Video};
use crate::time_utils::now_rfc3339;
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const MAX_CONCURRENT_DB_OPS: usize = 50;

/// Reservation document in `user_handles`. The document ID is the handle
/// key (`username:<name>` or `email:<addr>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserHandle {
    user_id: String,
}

/// Partial document used to unset the refresh token hash.
#[derive(Debug, Serialize, Deserialize)]
struct RefreshTokenField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token_hash: Option<String>,
}

fn username_key(username: &str) -> String {
    format!("username:{}", username)
}

fn email_key(email: &str) -> String {
    format!("email:{}", email)
}

fn conflict() -> AppError {
    AppError::Conflict("User with email or username already exists".to_string())
}

/// Stored field names written by a patch. A field listed in the mask but
/// absent from the object is deleted by Firestore, so only set fields go in.
fn patch_field_mask(patch: &UserPatch) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if patch.full_name.is_some() {
        fields.push("full_name");
    }
    if patch.email.is_some() {
        fields.push("email");
    }
    if patch.avatar.is_some() {
        fields.push("avatar");
    }
    if patch.cover_image.is_some() {
        fields.push("cover_image");
    }
    if patch.password_hash.is_some() {
        fields.push("password_hash");
    }
    fields.push("updated_at");
    fields
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Handle Reservations ─────────────────────────────────────

    /// Create the reservation document. Returns `false` if it already exists.
    async fn reserve_handle(&self, key: &str, user_id: &str) -> Result<bool, AppError> {
        let handle = UserHandle {
            user_id: user_id.to_string(),
        };

        let result: Result<UserHandle, firestore::errors::FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::USER_HANDLES)
            .document_id(key)
            .object(&handle)
            .execute()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(firestore::errors::FirestoreError::DataConflictError(_)) => Ok(false),
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    /// Delete a reservation. Failures are logged; a stale reservation only
    /// blocks the handle, it never grants access.
    async fn release_handle(&self, key: &str) {
        let result = match self.get_client() {
            Ok(client) => client
                .fluent()
                .delete()
                .from(collections::USER_HANDLES)
                .document_id(key)
                .execute()
                .await
                .map_err(|e| AppError::Database(e.to_string())),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::warn!(handle = key, error = %e, "Failed to release user handle");
        }
    }

    async fn lookup_handle(&self, key: &str) -> Result<Option<String>, AppError> {
        let handle: Option<UserHandle> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USER_HANDLES)
            .obj()
            .one(key)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(handle.map(|h| h.user_id))
    }

    async fn count_edges(&self, field: &'static str, user_id: &str) -> Result<u64, AppError> {
        let edges: Vec<Subscription> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SUBSCRIPTIONS)
            .filter(|q| q.for_all([q.field(field).eq(user_id)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(edges.len() as u64)
    }
}

#[async_trait]
impl UserStore for FirestoreDb {
    async fn create_user(&self, user: &User) -> Result<(), AppError> {
        let name_key = username_key(&user.username);
        let mail_key = email_key(&user.email);

        if !self.reserve_handle(&name_key, &user.id).await? {
            return Err(conflict());
        }
        if !self.reserve_handle(&mail_key, &user.id).await? {
            self.release_handle(&name_key).await;
            return Err(conflict());
        }

        let result: Result<User, firestore::errors::FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::USERS)
            .document_id(&user.id)
            .object(user)
            .execute()
            .await;

        if let Err(e) = result {
            self.release_handle(&name_key).await;
            self.release_handle(&mail_key).await;
            return Err(AppError::Database(e.to_string()));
        }

        tracing::info!(user_id = %user.id, "User created");
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_user_by_login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, AppError> {
        let keys = username
            .map(username_key)
            .into_iter()
            .chain(email.map(email_key));

        for key in keys {
            if let Some(user_id) = self.lookup_handle(&key).await? {
                if let Some(user) = self.get_user(&user_id).await? {
                    return Ok(Some(user));
                }
            }
        }
        Ok(None)
    }

    async fn get_owner_summaries(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, OwnerSummary>, AppError> {
        let users = stream::iter(ids.iter().cloned())
            .map(|id| async move { self.get_user(&id).await })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<Option<User>, AppError>>>()
            .await;

        let mut summaries = HashMap::with_capacity(users.len());
        for user in users {
            if let Some(user) = user? {
                summaries.insert(user.id.clone(), OwnerSummary::from(&user));
            }
        }
        Ok(summaries)
    }

    async fn update_user_fields(
        &self,
        id: &str,
        patch: &UserPatch,
    ) -> Result<Option<User>, AppError> {
        let Some(mut user) = self.get_user(id).await? else {
            return Ok(None);
        };
        // An empty field mask would not be a no-op.
        if patch.is_empty() {
            return Ok(Some(user));
        }

        let old_email = user.email.clone();
        let new_email = patch.email.as_deref().filter(|email| *email != old_email);
        if let Some(email) = new_email {
            if !self.reserve_handle(&email_key(email), id).await? {
                return Err(conflict());
            }
        }

        patch.apply(&mut user, &now_rfc3339());

        let result: Result<(), firestore::errors::FirestoreError> = self
            .get_client()?
            .fluent()
            .update()
            .fields(patch_field_mask(patch))
            .in_col(collections::USERS)
            .document_id(id)
            .object(&user)
            .execute()
            .await;

        if let Some(email) = new_email {
            match &result {
                Ok(_) => self.release_handle(&email_key(&old_email)).await,
                Err(_) => self.release_handle(&email_key(email)).await,
            }
        }

        result.map_err(|e| AppError::Database(e.to_string()))?;
        Ok(Some(user))
    }

    async fn swap_refresh_token(
        &self,
        id: &str,
        expected: RefreshSwap,
        new_hash: &str,
    ) -> Result<bool, AppError> {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Read through the transaction so a concurrent commit aborts ours.
        let tx_client = client.clone_with_consistency_selector(
            firestore::FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ),
        );
        let current: Option<User> = tx_client
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(id)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read user in transaction: {}", e))
            })?;

        let Some(mut user) = current else {
            let _ = transaction.rollback().await;
            return Ok(false);
        };

        if let RefreshSwap::IfCurrent(expected) = &expected {
            if user.refresh_token_hash.as_deref() != Some(expected.as_str()) {
                tracing::debug!(user_id = id, "Refresh token swap lost (stale hash)");
                let _ = transaction.rollback().await;
                return Ok(false);
            }
        }

        user.refresh_token_hash = Some(new_hash.to_string());

        client
            .fluent()
            .update()
            .fields(firestore::paths!(User::{refresh_token_hash}))
            .in_col(collections::USERS)
            .document_id(id)
            .object(&user)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add token swap to transaction: {}", e))
            })?;

        match transaction.commit().await {
            Ok(_) => Ok(true),
            Err(firestore::errors::FirestoreError::DataConflictError(_)) => {
                tracing::debug!(user_id = id, "Refresh token swap lost (contention)");
                Ok(false)
            }
            // Contention on commit surfaces as ABORTED, which is retryable.
            Err(firestore::errors::FirestoreError::DatabaseError(ref e)) if e.retry_possible => {
                tracing::debug!(user_id = id, error = %e, "Refresh token swap lost (aborted)");
                Ok(false)
            }
            Err(e) => Err(AppError::Database(format!("Transaction commit failed: {}", e))),
        }
    }

    async fn clear_refresh_token(&self, id: &str) -> Result<(), AppError> {
        // An update on a missing document would create it.
        if self.get_user(id).await?.is_none() {
            return Ok(());
        }

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(firestore::paths!(User::{refresh_token_hash}))
            .in_col(collections::USERS)
            .document_id(id)
            .object(&RefreshTokenField {
                refresh_token_hash: None,
            })
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for FirestoreDb {
    async fn count_subscribers(&self, channel_id: &str) -> Result<u64, AppError> {
        self.count_edges("channel", channel_id).await
    }

    async fn count_subscriptions(&self, subscriber_id: &str) -> Result<u64, AppError> {
        self.count_edges("subscriber", subscriber_id).await
    }

    async fn is_subscribed(
        &self,
        subscriber_id: &str,
        channel_id: &str,
    ) -> Result<bool, AppError> {
        let edges: Vec<Subscription> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SUBSCRIPTIONS)
            .filter(|q| {
                q.for_all([
                    q.field("subscriber").eq(subscriber_id),
                    q.field("channel").eq(channel_id),
                ])
            })
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(!edges.is_empty())
    }
}

#[async_trait]
impl VideoStore for FirestoreDb {
    async fn get_videos(&self, ids: &[String]) -> Result<Vec<Video>, AppError> {
        let client = self.get_client()?;

        let videos = stream::iter(ids.iter().cloned())
            .map(|id| async move {
                client
                    .fluent()
                    .select()
                    .by_id_in(collections::VIDEOS)
                    .obj::<Video>()
                    .one(&id)
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))
            })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<Option<Video>, AppError>>>()
            .await;

        let mut found = Vec::with_capacity(videos.len());
        for video in videos {
            if let Some(video) = video? {
                found.push(video);
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_field_mask_lists_only_set_fields() {
        let patch = UserPatch {
            avatar: Some("https://cdn.example.com/a.png".to_string()),
            ..Default::default()
        };
        assert_eq!(patch_field_mask(&patch), vec!["avatar", "updated_at"]);

        let patch = UserPatch {
            full_name: Some("A".to_string()),
            email: Some("a@example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(
            patch_field_mask(&patch),
            vec!["full_name", "email", "updated_at"]
        );
    }

    #[tokio::test]
    async fn test_offline_mock_reports_database_error() {
        let db = FirestoreDb::new_mock();
        let err = db.get_user("someone").await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }
}
