// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Registration and profile update tests.

use std::sync::atomic::Ordering;
use videotube_identity::db::UserStore;
use videotube_identity::error::AppError;
use videotube_identity::services::{ImageKind, RegisterInput};

mod common;
use common::{create_test_app, register_user, stage_file};

#[tokio::test]
async fn test_duplicate_username_or_email_conflicts() {
    let app = create_test_app();
    let alice = register_user(&app, "alice", "alice@example.com", "pw1").await;

    for (username, email) in [
        ("ALICE", "other@example.com"),
        ("someone", "Alice@Example.com"),
    ] {
        let avatar = stage_file(app.upload_dir.path(), "dup.png").await;
        let err = app
            .state
            .accounts
            .register(RegisterInput {
                full_name: "Dup".to_string(),
                email: email.to_string(),
                username: username.to_string(),
                password: "pw".to_string(),
                avatar_path: Some(avatar.clone()),
                cover_image_path: None,
            })
            .await
            .unwrap_err();

        assert!(
            matches!(&err, AppError::Conflict(msg) if msg == "User with email or username already exists"),
            "got {err:?}"
        );
        assert!(!avatar.exists(), "staged file must be discarded");
    }

    // Only the first registration touched object storage.
    assert_eq!(app.storage.uploads.load(Ordering::SeqCst), 1);
    assert!(app.db.get_user(&alice.id).await.unwrap().is_some());
    assert!(app
        .db
        .find_user_by_login(Some("someone"), None)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_register_with_cover_image() {
    let app = create_test_app();
    let avatar = stage_file(app.upload_dir.path(), "a.png").await;
    let cover = stage_file(app.upload_dir.path(), "c.png").await;

    let user = app
        .state
        .accounts
        .register(RegisterInput {
            full_name: "Bob".to_string(),
            email: "bob@example.com".to_string(),
            username: "bob".to_string(),
            password: "pw".to_string(),
            avatar_path: Some(avatar),
            cover_image_path: Some(cover),
        })
        .await
        .unwrap();

    assert_eq!(user.avatar, "https://cdn.example.com/a.png");
    assert_eq!(user.cover_image.as_deref(), Some("https://cdn.example.com/c.png"));
}

#[tokio::test]
async fn test_register_avatar_upload_failure() {
    let app = create_test_app();
    app.storage.fail.store(true, Ordering::SeqCst);
    let avatar = stage_file(app.upload_dir.path(), "a.png").await;

    let err = app
        .state
        .accounts
        .register(RegisterInput {
            full_name: "Bob".to_string(),
            email: "bob@example.com".to_string(),
            username: "bob".to_string(),
            password: "pw".to_string(),
            avatar_path: Some(avatar.clone()),
            cover_image_path: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::BadRequest(msg) if msg == "Avatar file is required"));
    assert!(!avatar.exists());
    assert!(app
        .db
        .find_user_by_login(Some("bob"), None)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_update_account_details() {
    let app = create_test_app();
    let alice = register_user(&app, "alice", "alice@example.com", "pw1").await;
    register_user(&app, "bob", "bob@example.com", "pw1").await;

    let updated = app
        .state
        .accounts
        .update_account_details(&alice.id, "Alice Liddell", "Alice@Wonderland.org")
        .await
        .unwrap();
    assert_eq!(updated.full_name, "Alice Liddell");
    assert_eq!(updated.email, "alice@wonderland.org");

    // The old email is free again, the new one is taken.
    let err = app
        .state
        .accounts
        .update_account_details(&alice.id, "Alice", "bob@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = app
        .state
        .accounts
        .update_account_details(&alice.id, "", "a@b.c")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(msg) if msg == "All fields are required"));
}

#[tokio::test]
async fn test_update_images() {
    let app = create_test_app();
    let alice = register_user(&app, "alice", "alice@example.com", "pw1").await;

    let avatar = stage_file(app.upload_dir.path(), "new-avatar.png").await;
    let user = app
        .state
        .accounts
        .update_image(&alice.id, ImageKind::Avatar, Some(avatar))
        .await
        .unwrap();
    assert_eq!(user.avatar, "https://cdn.example.com/new-avatar.png");

    let cover = stage_file(app.upload_dir.path(), "cover.png").await;
    let user = app
        .state
        .accounts
        .update_image(&alice.id, ImageKind::CoverImage, Some(cover))
        .await
        .unwrap();
    assert_eq!(user.cover_image.as_deref(), Some("https://cdn.example.com/cover.png"));
    assert_eq!(user.avatar, "https://cdn.example.com/new-avatar.png");

    let err = app
        .state
        .accounts
        .update_image(&alice.id, ImageKind::Avatar, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(msg) if msg == "Avatar file is missing"));

    app.storage.fail.store(true, Ordering::SeqCst);
    let avatar = stage_file(app.upload_dir.path(), "broken.png").await;
    let err = app
        .state
        .accounts
        .update_image(&alice.id, ImageKind::Avatar, Some(avatar))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(msg) if msg == "Error while uploading the avatar"));
}
