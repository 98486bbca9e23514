// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! VideoTube identity: accounts, sessions and channel views
//!
//! This crate provides the backend API that registers users, manages
//! their access/refresh token sessions, and computes channel profiles and
//! watch histories.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use services::{AccountService, ObjectStorage, SessionService, TokenService, ViewService};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Arc<dyn Store>,
    pub tokens: TokenService,
    pub sessions: SessionService,
    pub accounts: AccountService,
    pub views: ViewService,
}

impl AppState {
    /// Wire up the services over a store and an object storage client.
    pub fn new(config: Config, db: Arc<dyn Store>, storage: Arc<dyn ObjectStorage>) -> Self {
        let tokens = TokenService::new(&config, db.clone());
        Self {
            sessions: SessionService::new(db.clone(), tokens.clone()),
            accounts: AccountService::new(db.clone(), storage),
            views: ViewService::new(db.clone()),
            tokens,
            config,
            db,
        }
    }
}
