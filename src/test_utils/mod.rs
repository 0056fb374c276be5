//! Shared fixtures for tests: an in-memory app, users, and stand-ins for the
//! external services.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum_test::TestServer;
use rusqlite::Connection;

use crate::{
    AppState, Error,
    app_state::Services,
    auth::{
        AuthorizationRequest, IdentityProvider, PasswordHash, ProviderProfile, ValidatedPassword,
        encode_jwt,
    },
    build_router,
    db::with_connection,
    form::UploadedFile,
    storage::FileHost,
    summary::TextGenerator,
    user::{NewUser, User, create_user},
};

pub(crate) const TEST_JWT_SECRET: &str = "test secret";
pub(crate) const TEST_RESET_TOKEN: &str = "test reset token";
pub(crate) const TEST_FRONTEND_URL: &str = "http://localhost:3000";

pub(crate) const STUB_FILE_HOST_URL: &str = "https://files.example";
pub(crate) const STUB_AUTHORIZATION_URL: &str = "https://accounts.example/authorize";
pub(crate) const STUB_CSRF_STATE: &str = "stub-csrf-state";
pub(crate) const STUB_PKCE_VERIFIER: &str = "stub-pkce-verifier";
pub(crate) const STUB_ANALYSIS: &str = "Gaste menos com aluguel.";

/// Bcrypt cost for test users, low enough to keep tests fast.
const TEST_HASH_COST: u32 = 4;

/// Stores uploads in memory and serves them from [STUB_FILE_HOST_URL].
#[derive(Default)]
pub(crate) struct StubFileHost {
    uploads: Mutex<Vec<UploadedFile>>,
}

impl StubFileHost {
    pub(crate) fn uploaded_file_names(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|file| file.file_name.clone())
            .collect()
    }
}

#[async_trait]
impl FileHost for StubFileHost {
    async fn upload(&self, file: UploadedFile) -> Result<String, Error> {
        let url = format!("{STUB_FILE_HOST_URL}/{}", file.file_name);
        self.uploads.lock().unwrap().push(file);

        Ok(url)
    }
}

/// Replies with [STUB_ANALYSIS] and remembers every prompt.
#[derive(Default)]
pub(crate) struct RecordingTextGenerator {
    prompts: Mutex<Vec<String>>,
}

impl RecordingTextGenerator {
    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for RecordingTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, Error> {
        self.prompts.lock().unwrap().push(prompt.to_owned());

        Ok(STUB_ANALYSIS.to_owned())
    }
}

pub(crate) struct FailingTextGenerator;

#[async_trait]
impl TextGenerator for FailingTextGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, Error> {
        Err(Error::TextGeneration("quota exceeded".to_owned()))
    }
}

/// Always authorizes the same Google user.
pub(crate) struct StubIdentityProvider;

#[async_trait]
impl IdentityProvider for StubIdentityProvider {
    fn authorization_request(&self) -> AuthorizationRequest {
        AuthorizationRequest {
            url: STUB_AUTHORIZATION_URL.to_owned(),
            csrf_state: STUB_CSRF_STATE.to_owned(),
            pkce_verifier: STUB_PKCE_VERIFIER.to_owned(),
        }
    }

    async fn exchange_code(
        &self,
        _code: &str,
        pkce_verifier: &str,
    ) -> Result<ProviderProfile, Error> {
        if pkce_verifier != STUB_PKCE_VERIFIER {
            return Err(Error::IdentityProvider("wrong PKCE verifier".to_owned()));
        }

        Ok(ProviderProfile {
            email: "google.user@gmail.com".to_owned(),
            name: Some("Google User".to_owned()),
            picture: Some("https://img.example/google.png".to_owned()),
        })
    }
}

/// An app backed by an in-memory database with every external service stubbed.
pub(crate) fn get_test_app_state() -> AppState {
    let db_connection =
        Connection::open_in_memory().expect("Could not open database in memory.");

    AppState::new(
        db_connection,
        TEST_JWT_SECRET,
        "test cookie secret",
        TEST_FRONTEND_URL,
        Some(TEST_RESET_TOKEN.to_owned()),
        Services {
            file_host: Some(Arc::new(StubFileHost::default())),
            text_generator: Arc::new(RecordingTextGenerator::default()),
            identity_provider: Some(Arc::new(StubIdentityProvider)),
        },
    )
    .expect("Could not create app state.")
}

pub(crate) fn get_test_server(state: AppState) -> TestServer {
    TestServer::try_new(build_router(state)).expect("Could not create test server.")
}

/// Insert a user named "Test User" with the password `password`.
pub(crate) fn create_test_user(state: &AppState, email: &str, password: &str) -> User {
    let password_hash =
        PasswordHash::new(ValidatedPassword::new_unchecked(password), TEST_HASH_COST)
            .expect("Could not hash password.");

    with_connection(&state.db_connection, |connection| {
        create_user(
            NewUser {
                email: email.to_owned(),
                full_name: "Test User".to_owned(),
                password_hash,
                avatar_url: None,
            },
            connection,
        )
    })
    .expect("Could not create test user.")
}

/// Insert a user directly through `connection`, for tests without an [AppState].
pub(crate) fn insert_user(email: &str, connection: &Connection) -> User {
    create_user(
        NewUser {
            email: email.to_owned(),
            full_name: "Test User".to_owned(),
            password_hash: PasswordHash::new_unchecked("hunter2"),
            avatar_url: None,
        },
        connection,
    )
    .expect("Could not create test user.")
}

/// Create a user and a bearer token for them.
pub(crate) fn authorized_user(state: &AppState, email: &str) -> (User, String) {
    let user = create_test_user(state, email, "hunter2");
    let token = encode_jwt(&user.email, state.token_duration, &state.jwt_keys)
        .expect("Could not create token.");

    (user, token)
}

/// The base URL of a server that accepts connections and never answers.
pub(crate) async fn unresponsive_server_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Could not bind test listener.");
    let address = listener.local_addr().expect("Could not get listener address.");

    tokio::spawn(async move {
        // Hold on to the sockets so the connections stay open.
        let mut connections = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            connections.push(socket);
        }
    });

    format!("http://{address}")
}
