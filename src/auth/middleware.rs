//! Authentication middleware that validates bearer tokens and loads the caller.

use std::sync::{Arc, Mutex};

use axum::{
    RequestPartsExt,
    extract::{FromRef, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    auth::token::{JwtKeys, decode_jwt},
    db::with_connection,
    user::{User, get_user_by_email},
};

/// The state needed for the auth middleware
#[derive(Clone)]
pub struct AuthState {
    /// The keys used to verify bearer tokens.
    pub jwt_keys: JwtKeys,
    /// The database connection, used to load the user named by a token.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            jwt_keys: state.jwt_keys.clone(),
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Middleware function that checks for a valid bearer token.
/// The [User] the token was issued to is placed into the request and then the request executed normally if the token is valid, otherwise an unauthorized error is returned.
///
/// **Note**: Route handlers can use the function argument `Extension(user): Extension<User>` to receive the user.
pub async fn auth_guard(State(state): State<AuthState>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();

    let bearer = match parts.extract::<TypedHeader<Authorization<Bearer>>>().await {
        Ok(TypedHeader(Authorization(bearer))) => bearer,
        Err(error) => {
            tracing::debug!("missing or malformed authorization header: {error}");
            return Error::InvalidToken.into_response();
        }
    };

    let user = match authenticate(bearer.token(), &state) {
        Ok(user) => user,
        Err(error) => return error.into_response(),
    };

    parts.extensions.insert(user);
    next.run(Request::from_parts(parts, body)).await
}

fn authenticate(token: &str, state: &AuthState) -> Result<User, Error> {
    let claims = decode_jwt(token, &state.jwt_keys)?;

    with_connection(&state.db_connection, |connection| {
        get_user_by_email(&claims.sub, connection)
    })
    .map_err(|error| match error {
        Error::NotFound => {
            tracing::debug!("token subject {} is not a registered user", claims.sub);
            Error::InvalidToken
        }
        error => error,
    })
}
