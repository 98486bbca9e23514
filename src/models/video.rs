// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Video model and the enriched watch history entry.

use crate::models::user::OwnerSummary;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Stored video record in the `videos` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    /// Video ID (also used as document ID)
    pub id: String,
    /// Media URL in object storage
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Duration in seconds
    pub duration: f64,
    #[serde(default)]
    pub views: u64,
    #[serde(default = "default_published")]
    pub is_published: bool,
    /// Owner's user ID
    pub owner: String,
    pub created_at: String,
}

fn default_published() -> bool {
    true
}

/// A watch history entry: the video with its owner resolved to a single
/// reduced object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct WatchHistoryEntry {
    pub id: String,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub views: u64,
    pub is_published: bool,
    /// `null` when the owner account no longer exists
    pub owner: Option<OwnerSummary>,
    pub created_at: String,
}

impl WatchHistoryEntry {
    pub fn new(video: Video, owner: Option<OwnerSummary>) -> Self {
        Self {
            id: video.id,
            video_file: video.video_file,
            thumbnail: video.thumbnail,
            title: video.title,
            description: video.description,
            duration: video.duration,
            views: video.views,
            is_published: video.is_published,
            owner,
            created_at: video.created_at,
        }
    }
}
