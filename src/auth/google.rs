//! # Delegated login through Google
//!
//! Implements the OAuth 2.0 Authorization Code flow with PKCE.
//!
//! 1. [login_google] asks the [IdentityProvider] for an authorization URL, keeps
//!    the CSRF state and PKCE verifier in short-lived private cookies and
//!    redirects the browser to the provider.
//! 2. [google_callback] checks the returned state against the cookie,
//!    exchanges the code for the user's profile, creates the user the first
//!    time their email is seen, and redirects back to the frontend with a
//!    bearer token in the query string.
//!
//! Any failure sends the browser to the frontend's login page with
//! `error=auth_failed` instead.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    extract::{FromRef, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{
    PrivateCookieJar,
    cookie::{Cookie, SameSite},
};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
    basic::BasicClient,
};
use rusqlite::Connection;
use serde::Deserialize;
use time::Duration;

use crate::{
    AppState, Error,
    auth::{
        PasswordHash,
        token::{JwtKeys, encode_jwt},
    },
    db::with_connection,
    user::{NewUser, User, create_user, find_user_by_email},
};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

pub(crate) const OAUTH_STATE_COOKIE: &str = "oauth_state";
pub(crate) const PKCE_VERIFIER_COOKIE: &str = "oauth_pkce_verifier";
/// How long the user has to finish signing in at the provider.
const OAUTH_COOKIE_DURATION: Duration = Duration::minutes(10);

/// Where the browser should be sent to start a delegated login, along with
/// the secrets needed to finish it.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub csrf_state: String,
    pub pkce_verifier: String,
}

/// The parts of the provider's user info the app uses.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderProfile {
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// A third party that can vouch for a user's email address.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Build a fresh authorization URL with a random CSRF state and PKCE challenge.
    fn authorization_request(&self) -> AuthorizationRequest;

    /// Trade an authorization `code` for the signed-in user's profile.
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<ProviderProfile, Error>;
}

/// OAuth client type with auth URL and token URL set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Google's OAuth 2.0 endpoints.
pub struct GoogleOAuth {
    client: ConfiguredClient,
    http_client: reqwest::Client,
}

impl GoogleOAuth {
    /// Create a client for the app registered as `client_id`.
    ///
    /// # Errors
    ///
    /// Returns [Error::IdentityProvider] if `redirect_url` is not a valid URL or
    /// the HTTP client could not be built.
    pub fn new(client_id: &str, client_secret: &str, redirect_url: &str) -> Result<Self, Error> {
        let client = BasicClient::new(ClientId::new(client_id.to_owned()))
            .set_client_secret(ClientSecret::new(client_secret.to_owned()))
            .set_auth_uri(
                AuthUrl::new(GOOGLE_AUTH_URL.to_owned())
                    .map_err(|error| Error::IdentityProvider(error.to_string()))?,
            )
            .set_token_uri(
                TokenUrl::new(GOOGLE_TOKEN_URL.to_owned())
                    .map_err(|error| Error::IdentityProvider(error.to_string()))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(redirect_url.to_owned())
                    .map_err(|error| Error::IdentityProvider(error.to_string()))?,
            );

        // The token endpoint must not be allowed to redirect, see the oauth2 docs on SSRF.
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|error| Error::IdentityProvider(error.to_string()))?;

        Ok(Self {
            client,
            http_client,
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleOAuth {
    fn authorization_request(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        AuthorizationRequest {
            url: auth_url.to_string(),
            csrf_state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<ProviderProfile, Error> {
        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_owned()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_owned()))
            .request_async(&self.http_client)
            .await
            .map_err(|error| Error::IdentityProvider(format!("token exchange failed: {error}")))?;

        self.http_client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(token_result.access_token().secret())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|error| Error::IdentityProvider(error.to_string()))?
            .json()
            .await
            .map_err(|error| Error::IdentityProvider(error.to_string()))
    }
}

/// The state needed for delegated logins.
#[derive(Clone)]
pub struct GoogleLoginState {
    /// `None` when Google credentials are not configured.
    pub identity_provider: Option<Arc<dyn IdentityProvider>>,
    pub frontend_url: String,
    pub jwt_keys: JwtKeys,
    pub token_duration: Duration,
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for GoogleLoginState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            identity_provider: state.identity_provider.clone(),
            frontend_url: state.frontend_url.clone(),
            jwt_keys: state.jwt_keys.clone(),
            token_duration: state.token_duration,
            db_connection: state.db_connection.clone(),
        }
    }
}

fn failure_redirect(frontend_url: &str) -> Redirect {
    Redirect::to(&format!("{frontend_url}/login?error=auth_failed"))
}

fn oauth_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .max_age(OAUTH_COOKIE_DURATION)
        .http_only(true)
        // Lax, the callback is a cross-site top-level navigation.
        .same_site(SameSite::Lax)
        .secure(true)
        .build()
}

/// Start a delegated login by redirecting to Google.
pub async fn login_google(
    State(state): State<GoogleLoginState>,
    jar: PrivateCookieJar,
) -> Response {
    let Some(identity_provider) = state.identity_provider.as_ref() else {
        tracing::warn!("Google login requested but no Google credentials are configured");
        return failure_redirect(&state.frontend_url).into_response();
    };

    let request = identity_provider.authorization_request();
    let jar = jar
        .add(oauth_cookie(OAUTH_STATE_COOKIE, request.csrf_state))
        .add(oauth_cookie(PKCE_VERIFIER_COOKIE, request.pkce_verifier));

    (jar, Redirect::to(&request.url)).into_response()
}

/// The query string Google appends to the callback URL.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set instead of `code` when the user declined or the provider failed.
    pub error: Option<String>,
}

/// Finish a delegated login and hand a bearer token to the frontend.
pub async fn google_callback(
    State(state): State<GoogleLoginState>,
    jar: PrivateCookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let expected_state = jar
        .get(OAUTH_STATE_COOKIE)
        .map(|cookie| cookie.value().to_owned());
    let pkce_verifier = jar
        .get(PKCE_VERIFIER_COOKIE)
        .map(|cookie| cookie.value().to_owned());
    let jar = jar
        .remove(Cookie::build(OAUTH_STATE_COOKIE).path("/"))
        .remove(Cookie::build(PKCE_VERIFIER_COOKIE).path("/"));

    match complete_login(&state, query, expected_state, pkce_verifier).await {
        Ok(token) => {
            let url = format!("{}/auth-callback?token={token}", state.frontend_url);
            (jar, Redirect::to(&url)).into_response()
        }
        Err(error) => {
            tracing::warn!("Google login failed: {error}");
            (jar, failure_redirect(&state.frontend_url)).into_response()
        }
    }
}

async fn complete_login(
    state: &GoogleLoginState,
    query: CallbackQuery,
    expected_state: Option<String>,
    pkce_verifier: Option<String>,
) -> Result<String, Error> {
    let identity_provider = state
        .identity_provider
        .as_ref()
        .ok_or_else(|| Error::IdentityProvider("Google credentials not configured".to_owned()))?;

    if let Some(error) = query.error {
        return Err(Error::IdentityProvider(format!("provider returned {error}")));
    }

    let code = query
        .code
        .ok_or_else(|| Error::IdentityProvider("callback is missing the code".to_owned()))?;

    match (query.state, expected_state) {
        (Some(returned), Some(expected)) if returned == expected => {}
        _ => {
            return Err(Error::IdentityProvider(
                "missing or mismatched CSRF state".to_owned(),
            ));
        }
    }

    let pkce_verifier = pkce_verifier
        .ok_or_else(|| Error::IdentityProvider("missing PKCE verifier cookie".to_owned()))?;

    let profile = identity_provider
        .exchange_code(&code, &pkce_verifier)
        .await?;

    let user = with_connection(&state.db_connection, |connection| {
        find_or_create_user(profile, connection)
    })?;

    encode_jwt(&user.email, state.token_duration, &state.jwt_keys)
}

fn find_or_create_user(profile: ProviderProfile, connection: &Connection) -> Result<User, Error> {
    if let Some(user) = find_user_by_email(&profile.email, connection)? {
        return Ok(user);
    }

    let user = create_user(
        NewUser {
            full_name: profile.name.unwrap_or_else(|| profile.email.clone()),
            email: profile.email,
            password_hash: PasswordHash::provider_sentinel(),
            avatar_url: profile.picture,
        },
        connection,
    )?;
    tracing::info!("created user {} from a Google login", user.id);

    Ok(user)
}

#[cfg(test)]
mod google_login_tests {
    use axum::http::{StatusCode, header::LOCATION};
    use axum_test::{TestResponse, TestServer};

    use crate::{
        AppState,
        auth::{PasswordHash, decode_jwt},
        db::with_connection,
        endpoints,
        test_utils::{
            STUB_AUTHORIZATION_URL, STUB_CSRF_STATE, create_test_user, get_test_app_state,
            get_test_server,
        },
        user::get_user_by_email,
    };

    use super::{OAUTH_STATE_COOKIE, PKCE_VERIFIER_COOKIE};

    fn location(response: &TestResponse) -> String {
        response
            .header(LOCATION)
            .to_str()
            .expect("location header should be ASCII")
            .to_owned()
    }

    async fn start_login(server: &TestServer) -> TestResponse {
        let response = server.get(endpoints::GOOGLE_LOGIN).await;
        response.assert_status(StatusCode::SEE_OTHER);

        response
    }

    async fn finish_login(server: &TestServer, login: &TestResponse, query: &str) -> TestResponse {
        server
            .get(&format!("{}?{query}", endpoints::GOOGLE_CALLBACK))
            .add_cookie(login.cookie(OAUTH_STATE_COOKIE))
            .add_cookie(login.cookie(PKCE_VERIFIER_COOKIE))
            .await
    }

    fn token_from_location(location: &str, state: &AppState) -> String {
        let token = location
            .strip_prefix("http://localhost:3000/auth-callback?token=")
            .unwrap_or_else(|| panic!("unexpected redirect {location}"));
        decode_jwt(token, &state.jwt_keys).unwrap().sub
    }

    #[tokio::test]
    async fn login_redirects_to_provider_and_sets_cookies() {
        let server = get_test_server(get_test_app_state());

        let response = start_login(&server).await;

        assert_eq!(location(&response), STUB_AUTHORIZATION_URL);
        // The cookies are encrypted, so the raw state must not be visible.
        assert_ne!(response.cookie(OAUTH_STATE_COOKIE).value(), STUB_CSRF_STATE);
        assert!(!response.cookie(PKCE_VERIFIER_COOKIE).value().is_empty());
    }

    #[tokio::test]
    async fn callback_creates_provider_user_and_issues_token() {
        let state = get_test_app_state();
        let server = get_test_server(state.clone());
        let login = start_login(&server).await;

        let response =
            finish_login(&server, &login, &format!("code=abc&state={STUB_CSRF_STATE}")).await;

        response.assert_status(StatusCode::SEE_OTHER);
        let email = token_from_location(&location(&response), &state);
        assert_eq!(email, "google.user@gmail.com");
        let user = with_connection(&state.db_connection, |connection| {
            get_user_by_email(&email, connection)
        })
        .unwrap();
        assert_eq!(user.full_name, "Google User");
        assert_eq!(user.password_hash, PasswordHash::provider_sentinel());
        assert_eq!(
            user.avatar_url.as_deref(),
            Some("https://img.example/google.png")
        );
        assert!(user.is_premium);
    }

    #[tokio::test]
    async fn callback_reuses_existing_user() {
        let state = get_test_app_state();
        let existing = create_test_user(&state, "google.user@gmail.com", "hunter2");
        let server = get_test_server(state.clone());
        let login = start_login(&server).await;

        let response =
            finish_login(&server, &login, &format!("code=abc&state={STUB_CSRF_STATE}")).await;

        token_from_location(&location(&response), &state);
        let user = with_connection(&state.db_connection, |connection| {
            get_user_by_email("google.user@gmail.com", connection)
        })
        .unwrap();
        assert_eq!(user, existing);
    }

    #[tokio::test]
    async fn callback_with_mismatched_state_fails() {
        let server = get_test_server(get_test_app_state());
        let login = start_login(&server).await;

        let response = finish_login(&server, &login, "code=abc&state=forged").await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(
            location(&response),
            "http://localhost:3000/login?error=auth_failed"
        );
    }

    #[tokio::test]
    async fn callback_without_cookies_fails() {
        let server = get_test_server(get_test_app_state());

        let response = server
            .get(&format!(
                "{}?code=abc&state={STUB_CSRF_STATE}",
                endpoints::GOOGLE_CALLBACK
            ))
            .await;

        assert_eq!(
            location(&response),
            "http://localhost:3000/login?error=auth_failed"
        );
    }

    #[tokio::test]
    async fn login_without_provider_redirects_to_failure() {
        let mut state = get_test_app_state();
        state.identity_provider = None;
        let server = get_test_server(state);

        let response = start_login(&server).await;

        assert_eq!(
            location(&response),
            "http://localhost:3000/login?error=auth_failed"
        );
    }
}
