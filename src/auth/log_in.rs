//! This file defines the route that exchanges an email and password for a bearer token.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{
    AppState, Error,
    auth::token::{JwtKeys, encode_jwt},
    db::with_connection,
    form::FormData,
    user::find_user_by_email,
};

/// The state needed to perform a login.
#[derive(Clone)]
pub struct LoginState {
    /// The keys used to sign issued tokens.
    pub jwt_keys: JwtKeys,
    /// How long issued tokens stay valid.
    pub token_duration: Duration,
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for LoginState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            jwt_keys: state.jwt_keys.clone(),
            token_duration: state.token_duration,
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The raw data entered by the user in the log-in form.
///
/// The field names follow the OAuth2 password grant, so `username` holds the
/// email address. The password is stored as a plain string since it is only
/// compared against the stored hash.
#[derive(Clone, Serialize, Deserialize)]
pub struct LogInData {
    pub username: String,
    pub password: String,
}

/// The body returned by a successful log-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always `"bearer"`.
    pub token_type: String,
    pub user_name: String,
    /// Always `true`.
    pub is_premium: bool,
}

/// Handler for log-in requests via the POST method.
///
/// # Errors
///
/// Returns [Error::InvalidCredentials] if the email is unknown, the password
/// does not match, or the account was created by a delegated login and has no
/// password.
pub async fn post_log_in(
    State(state): State<LoginState>,
    FormData { fields, .. }: FormData<LogInData>,
) -> Result<Json<TokenResponse>, Error> {
    let user = with_connection(&state.db_connection, |connection| {
        find_user_by_email(&fields.username, connection)
    })?
    .ok_or(Error::InvalidCredentials)?;

    if !user.password_hash.verify(&fields.password) {
        return Err(Error::InvalidCredentials);
    }

    let access_token = encode_jwt(&user.email, state.token_duration, &state.jwt_keys)?;
    tracing::info!("user {} logged in", user.id);

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_owned(),
        user_name: user.full_name,
        is_premium: true,
    }))
}

#[cfg(test)]
mod log_in_tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::{
        auth::{PasswordHash, decode_jwt},
        db::with_connection,
        endpoints,
        test_utils::{create_test_user, get_test_app_state, get_test_server},
        user::{NewUser, create_user},
    };

    use super::TokenResponse;

    #[tokio::test]
    async fn log_in_succeeds_with_valid_credentials() {
        let state = get_test_app_state();
        create_test_user(&state, "foo@bar.baz", "hunter2");
        let server = get_test_server(state.clone());

        let response = server
            .post(endpoints::TOKEN)
            .form(&json!({"username": "foo@bar.baz", "password": "hunter2"}))
            .await;

        response.assert_status_ok();
        let body: TokenResponse = response.json();
        assert_eq!(body.token_type, "bearer");
        assert_eq!(body.user_name, "Test User");
        assert!(body.is_premium);
        let claims = decode_jwt(&body.access_token, &state.jwt_keys).unwrap();
        assert_eq!(claims.sub, "foo@bar.baz");
    }

    #[tokio::test]
    async fn log_in_fails_with_wrong_password() {
        let state = get_test_app_state();
        create_test_user(&state, "foo@bar.baz", "hunter2");
        let server = get_test_server(state);

        let response = server
            .post(endpoints::TOKEN)
            .form(&json!({"username": "foo@bar.baz", "password": "hunter3"}))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn log_in_fails_with_unknown_email() {
        let server = get_test_server(get_test_app_state());

        let response = server
            .post(endpoints::TOKEN)
            .form(&json!({"username": "nobody@bar.baz", "password": "hunter2"}))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn log_in_fails_for_provider_account() {
        let state = get_test_app_state();
        with_connection(&state.db_connection, |connection| {
            create_user(
                NewUser {
                    email: "google@bar.baz".to_owned(),
                    full_name: "Google User".to_owned(),
                    password_hash: PasswordHash::provider_sentinel(),
                    avatar_url: None,
                },
                connection,
            )
        })
        .unwrap();
        let server = get_test_server(state);

        let response = server
            .post(endpoints::TOKEN)
            .form(&json!({"username": "google@bar.baz", "password": "GOOGLE"}))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn log_in_without_password_is_unprocessable() {
        let server = get_test_server(get_test_app_state());

        let response = server
            .post(endpoints::TOKEN)
            .form(&json!({"username": "foo@bar.baz"}))
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }
}
