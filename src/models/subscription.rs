// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscription edge model (subscriber -> channel).

use serde::{Deserialize, Serialize};

/// One edge in the `subscriptions` collection. Both ends are user IDs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscription {
    pub subscriber: String,
    pub channel: String,
    pub created_at: String,
}

impl Subscription {
    /// Document ID for the edge, unique per (subscriber, channel) pair.
    pub fn doc_id(subscriber: &str, channel: &str) -> String {
        format!("{}_{}", subscriber, channel)
    }
}
