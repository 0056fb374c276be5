//! Routes for reading and changing the current user's own account.

use std::collections::HashMap;

use axum::{Extension, Json, extract::State};
use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    Error,
    auth::{PasswordHash, ValidatedPassword},
    db::{DatabaseState, with_connection},
    extract::JsonBody,
    form::FormData,
    storage::{FileUploadState, upload_file},
    user::{User, UserID, UserProfile, update_avatar_url, update_full_name, update_password},
};

/// The form field a new avatar image is sent in.
const AVATAR_FIELD: &str = "file";

/// Changes to the current user's profile. Missing or empty fields are left unchanged.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AvatarResponse {
    pub avatar_url: String,
}

pub async fn get_current_user(Extension(user): Extension<User>) -> Json<UserProfile> {
    Json(UserProfile::from(&user))
}

/// Update the current user's display name and/or password.
///
/// # Errors
///
/// Returns [Error::PasswordTooShort] if a new password is given but is too
/// short, in which case nothing is changed.
pub async fn update_current_user(
    State(state): State<DatabaseState>,
    Extension(user): Extension<User>,
    JsonBody(update): JsonBody<ProfileUpdate>,
) -> Result<Json<Value>, Error> {
    let full_name = update.full_name.filter(|name| !name.is_empty());
    let password_hash = match update.password.filter(|password| !password.is_empty()) {
        Some(password) => Some(PasswordHash::new(
            ValidatedPassword::new(&password)?,
            PasswordHash::DEFAULT_COST,
        )?),
        None => None,
    };

    with_connection(&state.db_connection, |connection| {
        apply_profile_update(
            user.id,
            full_name.as_deref(),
            password_hash.as_ref(),
            connection,
        )
    })?;

    tracing::info!(
        "user {} updated their profile (name: {}, password: {})",
        user.id,
        full_name.is_some(),
        password_hash.is_some()
    );

    Ok(Json(json!({ "message": "Atualizado" })))
}

/// Write the new name and password hash for `user_id`, or neither if either write fails.
fn apply_profile_update(
    user_id: UserID,
    full_name: Option<&str>,
    password_hash: Option<&PasswordHash>,
    connection: &Connection,
) -> Result<(), Error> {
    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

    if let Some(full_name) = full_name {
        update_full_name(user_id, full_name, &transaction)?;
    }

    if let Some(password_hash) = password_hash {
        update_password(user_id, password_hash, &transaction)?;
    }

    transaction.commit()?;

    Ok(())
}

/// Upload a new profile picture and store its URL.
pub async fn update_avatar(
    State(state): State<FileUploadState>,
    Extension(user): Extension<User>,
    mut form: FormData<HashMap<String, String>>,
) -> Result<Json<AvatarResponse>, Error> {
    let image = form.require_file(AVATAR_FIELD)?;
    let avatar_url = upload_file(state.file_host.as_deref(), image).await?;

    with_connection(&state.db_connection, |connection| {
        update_avatar_url(user.id, &avatar_url, connection)
    })?;

    Ok(Json(AvatarResponse { avatar_url }))
}
