// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-local store backed by `DashMap`.
//!
//! Used for local development (`STORE_BACKEND=memory`) and as the fake in
//! tests. Each compare-and-swap or uniqueness reservation runs under a
//! single shard guard, never across an `.await`.

use crate::db::{RefreshSwap, SubscriptionStore, UserStore, VideoStore};
use crate::error::AppError;
use crate::models::{OwnerSummary, Subscription, User, UserPatch, Video};
use crate::time_utils::now_rfc3339;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    users: DashMap<String, User>,
    /// "username:<name>" / "email:<addr>" -> user ID
    handles: DashMap<String, String>,
    /// Keyed by `Subscription::doc_id`
    subscriptions: DashMap<String, Subscription>,
    videos: DashMap<String, Video>,
}

/// In-memory implementation of every store trait. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryDb {
    inner: Arc<Inner>,
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

impl InMemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a handle for `owner`. Returns `false` if someone else holds it.
    fn reserve_handle(&self, key: String, owner: &str) -> bool {
        match self.inner.handles.entry(key) {
            Entry::Occupied(existing) => existing.get() == owner,
            Entry::Vacant(slot) => {
                slot.insert(owner.to_string());
                true
            }
        }
    }

    fn release_handle(&self, key: &str, owner: &str) {
        self.inner.handles.remove_if(key, |_, holder| holder == owner);
    }

    // ─── Seeding helpers for the read-only relations ─────────────

    /// Insert or replace a video.
    pub fn put_video(&self, video: Video) {
        self.inner.videos.insert(video.id.clone(), video);
    }

    /// Add a subscription edge.
    pub fn subscribe(&self, subscriber: &str, channel: &str) {
        self.inner.subscriptions.insert(
            Subscription::doc_id(subscriber, channel),
            Subscription {
                subscriber: subscriber.to_string(),
                channel: channel.to_string(),
                created_at: now_rfc3339(),
            },
        );
    }

    /// Remove a subscription edge.
    pub fn unsubscribe(&self, subscriber: &str, channel: &str) {
        self.inner
            .subscriptions
            .remove(&Subscription::doc_id(subscriber, channel));
    }

    /// Append a video to a user's watch history. Returns `false` if the user
    /// does not exist.
    pub fn record_watch(&self, user_id: &str, video_id: &str) -> bool {
        match self.inner.users.get_mut(user_id) {
            Some(mut user) => {
                user.watch_history.push(video_id.to_string());
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl UserStore for InMemoryDb {
    async fn create_user(&self, user: &User) -> Result<(), AppError> {
        let name_key = username_key(&user.username);
        if !self.reserve_handle(name_key.clone(), &user.id) {
            return Err(conflict());
        }
        if !self.reserve_handle(email_key(&user.email), &user.id) {
            self.release_handle(&name_key, &user.id);
            return Err(conflict());
        }

        self.inner.users.insert(user.id.clone(), user.clone());
        tracing::debug!(user_id = %user.id, "User created (memory)");
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.inner.users.get(id).map(|u| u.value().clone()))
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
            let owner = self.inner.handles.get(&key).map(|id| id.value().clone());
            if let Some(id) = owner {
                if let Some(user) = self.inner.users.get(&id) {
                    return Ok(Some(user.value().clone()));
                }
            }
        }
        Ok(None)
    }

    async fn get_owner_summaries(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, OwnerSummary>, AppError> {
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.inner
                    .users
                    .get(id)
                    .map(|u| (id.clone(), OwnerSummary::from(&*u)))
            })
            .collect())
    }

    async fn update_user_fields(
        &self,
        id: &str,
        patch: &UserPatch,
    ) -> Result<Option<User>, AppError> {
        if patch.is_empty() {
            return Ok(self.inner.users.get(id).map(|u| u.value().clone()));
        }

        let Some(current_email) = self.inner.users.get(id).map(|u| u.email.clone()) else {
            return Ok(None);
        };

        let new_email = patch
            .email
            .as_deref()
            .filter(|email| *email != current_email);
        if let Some(email) = new_email {
            if !self.reserve_handle(email_key(email), id) {
                return Err(conflict());
            }
        }

        let updated = self.inner.users.get_mut(id).map(|mut user| {
            patch.apply(user.value_mut(), &now_rfc3339());
            user.value().clone()
        });

        if let Some(email) = new_email {
            match updated {
                Some(_) => self.release_handle(&email_key(&current_email), id),
                None => self.release_handle(&email_key(email), id),
            }
        }

        Ok(updated)
    }

    async fn swap_refresh_token(
        &self,
        id: &str,
        expected: RefreshSwap,
        new_hash: &str,
    ) -> Result<bool, AppError> {
        let Some(mut user) = self.inner.users.get_mut(id) else {
            return Ok(false);
        };

        if let RefreshSwap::IfCurrent(expected) = expected {
            if user.refresh_token_hash.as_deref() != Some(expected.as_str()) {
                return Ok(false);
            }
        }

        user.refresh_token_hash = Some(new_hash.to_string());
        Ok(true)
    }

    async fn clear_refresh_token(&self, id: &str) -> Result<(), AppError> {
        if let Some(mut user) = self.inner.users.get_mut(id) {
            user.refresh_token_hash = None;
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryDb {
    async fn count_subscribers(&self, channel_id: &str) -> Result<u64, AppError> {
        Ok(self
            .inner
            .subscriptions
            .iter()
            .filter(|edge| edge.channel == channel_id)
            .count() as u64)
    }

    async fn count_subscriptions(&self, subscriber_id: &str) -> Result<u64, AppError> {
        Ok(self
            .inner
            .subscriptions
            .iter()
            .filter(|edge| edge.subscriber == subscriber_id)
            .count() as u64)
    }

    async fn is_subscribed(
        &self,
        subscriber_id: &str,
        channel_id: &str,
    ) -> Result<bool, AppError> {
        Ok(self
            .inner
            .subscriptions
            .contains_key(&Subscription::doc_id(subscriber_id, channel_id)))
    }
}

#[async_trait]
impl VideoStore for InMemoryDb {
    async fn get_videos(&self, ids: &[String]) -> Result<Vec<Video>, AppError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.inner.videos.get(id).map(|v| v.value().clone()))
            .collect())
    }
}
