//! The route for creating a new account with an email and password.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    Error,
    auth::{PasswordHash, ValidatedPassword},
    db::{DatabaseState, with_connection},
    form::FormData,
    user::{NewUser, create_user, find_user_by_email},
};

#[derive(Serialize, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

/// Create a new user from the submitted form.
///
/// Registration applies no password rules, the length check only guards
/// password changes.
///
/// # Errors
///
/// Returns [Error::DuplicateEmail] if the email already belongs to a user.
pub async fn register_user(
    State(state): State<DatabaseState>,
    FormData { fields, .. }: FormData<RegisterForm>,
) -> Result<Json<Value>, Error> {
    let existing_user = with_connection(&state.db_connection, |connection| {
        find_user_by_email(&fields.email, connection)
    })?;

    if existing_user.is_some() {
        return Err(Error::DuplicateEmail);
    }

    let password_hash = PasswordHash::new(
        ValidatedPassword::new_unchecked(&fields.password),
        PasswordHash::DEFAULT_COST,
    )
    .inspect_err(|error| tracing::error!("an error occurred while hashing a password: {error}"))?;

    let user = with_connection(&state.db_connection, |connection| {
        create_user(
            NewUser {
                email: fields.email,
                full_name: fields.full_name,
                password_hash,
                avatar_url: None,
            },
            connection,
        )
    })?;

    tracing::info!("registered user {}", user.id);

    Ok(Json(json!({ "message": "Criado" })))
}
