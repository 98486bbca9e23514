// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use videotube_identity::config::Config;
use videotube_identity::db::{FirestoreDb, InMemoryDb};
use videotube_identity::models::{PublicUser, Video};
use videotube_identity::routes::create_router;
use videotube_identity::services::{ObjectStorage, RegisterInput, UploadOutcome};
use videotube_identity::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Object storage stand-in. Behaves like the real client (the staged file
/// is always removed) and can be switched to failing.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeStorage {
    pub fail: AtomicBool,
    pub uploads: AtomicUsize,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn upload(&self, local_path: &Path) -> UploadOutcome {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        let existed = tokio::fs::remove_file(local_path).await.is_ok();

        if self.fail.load(Ordering::SeqCst) || !existed {
            return UploadOutcome::Failed {
                reason: "fake storage refused".to_string(),
            };
        }
        self.uploads.fetch_add(1, Ordering::SeqCst);
        UploadOutcome::Uploaded {
            url: format!("https://cdn.example.com/{}", name),
        }
    }
}

/// Everything a test needs to drive and inspect the service.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub db: InMemoryDb,
    pub storage: Arc<FakeStorage>,
    pub upload_dir: tempfile::TempDir,
}

/// App over a fresh in-memory store and a fake object storage.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let upload_dir = tempfile::tempdir().expect("tempdir");
    let config = Config {
        upload_dir: upload_dir.path().to_path_buf(),
        ..Config::default()
    };
    let db = InMemoryDb::new();
    let storage = Arc::new(FakeStorage::default());
    let state = Arc::new(AppState::new(
        config,
        Arc::new(db.clone()),
        storage.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        db,
        storage,
        upload_dir,
    }
}

/// Write a small file to stand in for a browser upload.
#[allow(dead_code)]
pub async fn stage_file(dir: &Path, name: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    tokio::fs::write(&path, b"\x89PNG fake").await.unwrap();
    path
}

/// Register a user through the account service.
#[allow(dead_code)]
pub async fn register_user(app: &TestApp, username: &str, email: &str, password: &str) -> PublicUser {
    let avatar = stage_file(app.upload_dir.path(), &format!("{}-avatar.png", username)).await;
    app.state
        .accounts
        .register(RegisterInput {
            full_name: format!("{} Example", username),
            email: email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            avatar_path: Some(avatar),
            cover_image_path: None,
        })
        .await
        .expect("registration should succeed")
}

/// A published video owned by `owner`.
#[allow(dead_code)]
pub fn video(id: &str, owner: &str) -> Video {
    Video {
        id: id.to_string(),
        video_file: format!("https://cdn.example.com/{}.mp4", id),
        thumbnail: format!("https://cdn.example.com/{}.jpg", id),
        title: format!("Video {}", id),
        description: String::new(),
        duration: 61.5,
        views: 0,
        is_published: true,
        owner: owner.to_string(),
        created_at: "2024-01-15T12:00:00Z".to_string(),
    }
}
