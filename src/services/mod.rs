// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod account;
pub mod password;
pub mod session;
pub mod storage;
pub mod tokens;
pub mod views;

pub use account::{AccountService, ImageKind, RegisterInput};
pub use session::{LoginOutcome, SessionService};
pub use storage::{CloudinaryStorage, ObjectStorage, UploadOutcome};
pub use tokens::{AccessClaims, TokenPair, TokenService};
pub use views::ViewService;
