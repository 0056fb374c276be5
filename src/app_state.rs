//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use rusqlite::Connection;
use sha2::{Digest, Sha512};
use time::Duration;

use crate::{
    Error,
    auth::{DEFAULT_TOKEN_DURATION, GoogleOAuth, IdentityProvider, JwtKeys},
    config::Config,
    db::initialize,
    storage::{CloudinaryClient, CloudinaryCredentials, FileHost},
    summary::{GeminiClient, TextGenerator},
};

/// The largest request body accepted when no other limit is configured.
pub const DEFAULT_BODY_LIMIT: usize = 20 * 1024 * 1024;

/// The external services the server talks to.
#[derive(Clone)]
pub struct Services {
    /// `None` when no file host is configured.
    pub file_host: Option<Arc<dyn FileHost>>,
    pub text_generator: Arc<dyn TextGenerator>,
    /// `None` when Google logins are not configured.
    pub identity_provider: Option<Arc<dyn IdentityProvider>>,
}

impl Services {
    /// Build the production clients for whichever services `config` has credentials for.
    ///
    /// # Errors
    ///
    /// Returns an error if `CLOUDINARY_URL` is malformed or one of the HTTP
    /// clients could not be built.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let file_host = match &config.cloudinary_url {
            Some(url) => {
                let credentials = CloudinaryCredentials::from_url(url)?;
                tracing::info!("uploading files to Cloudinary cloud {}", credentials.cloud_name);
                Some(Arc::new(CloudinaryClient::new(credentials)?) as Arc<dyn FileHost>)
            }
            None => {
                tracing::warn!("CLOUDINARY_URL is not set, file uploads will be refused");
                None
            }
        };

        if config.gemini_api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set, finance analysis will always fail");
        }
        let text_generator = Arc::new(GeminiClient::new(config.gemini_api_key.clone())?);

        let identity_provider = match (&config.google_client_id, &config.google_client_secret) {
            (Some(client_id), Some(client_secret)) => Some(Arc::new(GoogleOAuth::new(
                client_id,
                client_secret,
                &config.google_redirect_url,
            )?) as Arc<dyn IdentityProvider>),
            _ => {
                tracing::warn!("Google credentials are not set, Google logins are disabled");
                None
            }
        };

        Ok(Self {
            file_host,
            text_generator,
            identity_provider,
        })
    }
}

/// The state of the REST server.
#[derive(Clone)]
pub struct AppState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,

    /// The keys used to sign and verify bearer tokens.
    pub jwt_keys: JwtKeys,

    /// How long issued bearer tokens are valid for.
    pub token_duration: Duration,

    /// The key to be used for signing and encrypting private cookies.
    pub cookie_key: Key,

    /// The frontend that Google logins redirect back to, without a trailing slash.
    pub frontend_url: String,

    /// The token that unlocks the database reset route, if it is enabled.
    pub reset_token: Option<String>,

    /// The largest request body, in bytes, that handlers will read.
    pub body_limit: usize,

    pub file_host: Option<Arc<dyn FileHost>>,
    pub text_generator: Arc<dyn TextGenerator>,
    pub identity_provider: Option<Arc<dyn IdentityProvider>>,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(
        db_connection: Connection,
        jwt_secret: &str,
        cookie_secret: &str,
        frontend_url: &str,
        reset_token: Option<String>,
        services: Services,
    ) -> Result<Self, Error> {
        initialize(&db_connection)?;

        Ok(Self {
            db_connection: Arc::new(Mutex::new(db_connection)),
            jwt_keys: JwtKeys::new(jwt_secret),
            token_duration: DEFAULT_TOKEN_DURATION,
            cookie_key: create_cookie_key(cookie_secret),
            frontend_url: frontend_url.trim_end_matches('/').to_owned(),
            reset_token: reset_token.filter(|token| !token.is_empty()),
            body_limit: DEFAULT_BODY_LIMIT,
            file_host: services.file_host,
            text_generator: services.text_generator,
            identity_provider: services.identity_provider,
        })
    }

    /// Replace the default request body limit of [DEFAULT_BODY_LIMIT] bytes.
    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }
}

// this impl tells `PrivateCookieJar` how to access the key from our state
impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

/// Create a signing key for cookies from a `secret`s string.
pub fn create_cookie_key(secret: &str) -> Key {
    let hash = Sha512::digest(secret);

    Key::from(&hash)
}
