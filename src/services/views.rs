// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Read-side projections: channel profiles and watch history.

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::user::normalize_handle;
use crate::models::{ChannelProfile, WatchHistoryEntry};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// First occurrence of each ID, in order.
fn unique_ids<'a>(ids: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

#[derive(Clone)]
pub struct ViewService {
    db: Arc<dyn Store>,
}

impl ViewService {
    pub fn new(db: Arc<dyn Store>) -> Self {
        Self { db }
    }

    /// Public profile of `username`, as seen by `viewer_id` (if any).
    pub async fn channel_profile(
        &self,
        viewer_id: Option<&str>,
        username: &str,
    ) -> Result<ChannelProfile> {
        let username = normalize_handle(username);
        if username.is_empty() {
            return Err(AppError::BadRequest("username is missing".to_string()));
        }

        let channel = self
            .db
            .find_user_by_login(Some(&username), None)
            .await?
            .ok_or_else(|| AppError::NotFound("channel does not exist".to_string()))?;

        let is_subscribed = async {
            match viewer_id {
                Some(viewer) => self.db.is_subscribed(viewer, &channel.id).await,
                None => Ok(false),
            }
        };
        let (subscribers, subscribed_to, is_subscribed) = tokio::try_join!(
            self.db.count_subscribers(&channel.id),
            self.db.count_subscriptions(&channel.id),
            is_subscribed,
        )?;

        tracing::debug!(
            channel_id = %channel.id,
            subscribers,
            subscribed_to,
            is_subscribed,
            "Channel profile computed"
        );
        Ok(ChannelProfile::new(
            &channel,
            subscribers,
            subscribed_to,
            is_subscribed,
        ))
    }

    /// The viewer's watch history in stored order, with each video's owner
    /// reduced to a summary. Videos that no longer exist are skipped;
    /// repeated views stay repeated.
    pub async fn watch_history(&self, viewer_id: &str) -> Result<Vec<WatchHistoryEntry>> {
        let user = self
            .db
            .get_user(viewer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User does not exist".to_string()))?;

        if user.watch_history.is_empty() {
            return Ok(Vec::new());
        }

        let videos: HashMap<String, _> = self
            .db
            .get_videos(&unique_ids(&user.watch_history))
            .await?
            .into_iter()
            .map(|video| (video.id.clone(), video))
            .collect();

        let owners = self
            .db
            .get_owner_summaries(&unique_ids(videos.values().map(|v| &v.owner)))
            .await?;

        let entries: Vec<WatchHistoryEntry> = user
            .watch_history
            .iter()
            .filter_map(|id| videos.get(id))
            .map(|video| WatchHistoryEntry::new(video.clone(), owners.get(&video.owner).cloned()))
            .collect();

        if entries.len() < user.watch_history.len() {
            tracing::debug!(
                user_id = viewer_id,
                stored = user.watch_history.len(),
                resolved = entries.len(),
                "Watch history references missing videos"
            );
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_ids_keeps_first_occurrence_order() {
        let ids: Vec<String> = ["b", "a", "b", "c", "a"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(unique_ids(&ids), vec!["b", "a", "c"]);
    }
}
