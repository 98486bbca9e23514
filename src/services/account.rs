// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account management: registration, profile edits and image replacement.

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::user::normalize_handle;
use crate::models::{PublicUser, User, UserPatch};
use crate::services::password::hash_password_async;
use crate::services::storage::{ObjectStorage, UploadOutcome};
use crate::time_utils::now_rfc3339;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use validator::ValidateEmail;

/// Registration form after multipart parsing. Image paths point at staged
/// files in the upload directory.
#[derive(Debug, Clone, Default)]
pub struct RegisterInput {
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub avatar_path: Option<PathBuf>,
    pub cover_image_path: Option<PathBuf>,
}

/// Which profile image to replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Avatar,
    CoverImage,
}

impl ImageKind {
    fn label(self) -> &'static str {
        match self {
            ImageKind::Avatar => "avatar",
            ImageKind::CoverImage => "cover image",
        }
    }

    fn missing_message(self) -> String {
        match self {
            ImageKind::Avatar => "Avatar file is missing".to_string(),
            ImageKind::CoverImage => "Cover image file is missing".to_string(),
        }
    }
}

/// Remove staged files we are not going to upload.
async fn discard_staged(paths: &[Option<&Path>]) {
    for path in paths.iter().flatten() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::debug!(path = %path.display(), error = %e, "Staged file already gone");
        }
    }
}

fn check_email(email: &str) -> Result<()> {
    if email.validate_email() {
        Ok(())
    } else {
        Err(AppError::BadRequest("Invalid email address".to_string()))
    }
}

#[derive(Clone)]
pub struct AccountService {
    db: Arc<dyn Store>,
    storage: Arc<dyn ObjectStorage>,
}

impl AccountService {
    pub fn new(db: Arc<dyn Store>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { db, storage }
    }

    async fn upload(&self, path: &Path, kind: ImageKind) -> Option<String> {
        let outcome = self.storage.upload(path).await;
        if let UploadOutcome::Failed { reason } = &outcome {
            tracing::warn!(image = kind.label(), reason = %reason, "Image upload failed");
        }
        outcome.url()
    }

    /// Create an account. The avatar is mandatory, the cover image is not.
    pub async fn register(&self, input: RegisterInput) -> Result<PublicUser> {
        let staged = [input.avatar_path.as_deref(), input.cover_image_path.as_deref()];

        if [&input.full_name, &input.email, &input.username, &input.password]
            .iter()
            .any(|field| field.trim().is_empty())
        {
            discard_staged(&staged).await;
            return Err(AppError::BadRequest("All fields are required".to_string()));
        }

        let username = normalize_handle(&input.username);
        let email = normalize_handle(&input.email);
        if let Err(e) = check_email(&email) {
            discard_staged(&staged).await;
            return Err(e);
        }

        // Early check so a duplicate does not cost an upload. `create_user`
        // enforces uniqueness again atomically.
        let existing = self
            .db
            .find_user_by_login(Some(&username), Some(&email))
            .await;
        match existing {
            Ok(Some(_)) => {
                discard_staged(&staged).await;
                return Err(AppError::Conflict(
                    "User with email or username already exists".to_string(),
                ));
            }
            Ok(None) => {}
            Err(e) => {
                discard_staged(&staged).await;
                return Err(e);
            }
        }

        let Some(avatar_path) = input.avatar_path.as_deref() else {
            discard_staged(&staged).await;
            return Err(AppError::BadRequest("Avatar file is required".to_string()));
        };

        let avatar = self.upload(avatar_path, ImageKind::Avatar).await;
        let cover_image = match input.cover_image_path.as_deref() {
            Some(path) => self.upload(path, ImageKind::CoverImage).await,
            None => None,
        };
        let avatar =
            avatar.ok_or_else(|| AppError::BadRequest("Avatar file is required".to_string()))?;

        let password_hash = hash_password_async(input.password).await?;
        let user = User::new(
            &username,
            &email,
            &input.full_name,
            password_hash,
            avatar,
            cover_image,
            &now_rfc3339(),
        );
        self.db.create_user(&user).await?;

        tracing::info!(user_id = %user.id, username = %user.username, "User registered");
        Ok(PublicUser::from(&user))
    }

    pub async fn current_user(&self, user_id: &str) -> Result<PublicUser> {
        self.db
            .get_user(user_id)
            .await?
            .map(|user| PublicUser::from(&user))
            .ok_or_else(|| AppError::NotFound("User does not exist".to_string()))
    }

    /// Change full name and email together.
    pub async fn update_account_details(
        &self,
        user_id: &str,
        full_name: &str,
        email: &str,
    ) -> Result<PublicUser> {
        if full_name.trim().is_empty() || email.trim().is_empty() {
            return Err(AppError::BadRequest("All fields are required".to_string()));
        }
        let email = normalize_handle(email);
        check_email(&email)?;

        let patch = UserPatch {
            full_name: Some(full_name.trim().to_string()),
            email: Some(email),
            ..Default::default()
        };
        let user = self
            .db
            .update_user_fields(user_id, &patch)
            .await?
            .ok_or_else(|| AppError::NotFound("User does not exist".to_string()))?;

        tracing::info!(user_id, "Account details updated");
        Ok(PublicUser::from(&user))
    }

    /// Upload a staged image and point the profile at it.
    pub async fn update_image(
        &self,
        user_id: &str,
        kind: ImageKind,
        staged: Option<PathBuf>,
    ) -> Result<PublicUser> {
        let path = staged.ok_or_else(|| AppError::BadRequest(kind.missing_message()))?;

        let url = self.upload(&path, kind).await.ok_or_else(|| {
            AppError::BadRequest(format!("Error while uploading the {}", kind.label()))
        })?;

        let patch = match kind {
            ImageKind::Avatar => UserPatch {
                avatar: Some(url),
                ..Default::default()
            },
            ImageKind::CoverImage => UserPatch {
                cover_image: Some(url),
                ..Default::default()
            },
        };
        let user = self
            .db
            .update_user_fields(user_id, &patch)
            .await?
            .ok_or_else(|| AppError::NotFound("User does not exist".to_string()))?;

        tracing::info!(user_id, image = kind.label(), "Profile image replaced");
        Ok(PublicUser::from(&user))
    }
}
