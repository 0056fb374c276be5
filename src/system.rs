//! Maintenance routes.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
    http::HeaderMap,
};
use rusqlite::Connection;
use serde_json::{Value, json};

use crate::{
    AppState, Error,
    db::{reset, with_connection},
};

/// The header that must carry the configured reset token.
pub const RESET_TOKEN_HEADER: &str = "x-reset-token";

#[derive(Debug, Clone)]
pub struct SystemState {
    pub db_connection: Arc<Mutex<Connection>>,
    /// The reset route is disabled when this is `None`.
    pub reset_token: Option<String>,
}

impl FromRef<AppState> for SystemState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            reset_token: state.reset_token.clone(),
        }
    }
}

/// Drop and recreate every table.
///
/// # Errors
///
/// Returns [Error::NotFound] when no reset token is configured and
/// [Error::InvalidToken] when the request does not carry it.
pub async fn reset_database(
    State(state): State<SystemState>,
    headers: HeaderMap,
) -> Result<Json<Value>, Error> {
    let Some(reset_token) = state.reset_token.as_deref() else {
        return Err(Error::NotFound);
    };

    let given_token = headers
        .get(RESET_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    if given_token != Some(reset_token) {
        tracing::warn!("rejected database reset with a missing or wrong token");
        return Err(Error::InvalidToken);
    }

    with_connection(&state.db_connection, reset)?;
    tracing::warn!("the database was reset, all data has been deleted");

    Ok(Json(json!({ "message": "Banco Limpo!" })))
}
