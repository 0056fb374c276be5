//! The crate-wide error type and how it is turned into an HTTP response.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The email/password combination did not match a registered user.
    #[error("incorrect email or password")]
    InvalidCredentials,

    /// The bearer token is missing, malformed, expired or refers to a user
    /// that no longer exists.
    #[error("could not validate credentials")]
    InvalidToken,

    /// The email used to register already belongs to a user.
    #[error("email already registered")]
    DuplicateEmail,

    /// The new password is shorter than [crate::auth::MIN_PASSWORD_LENGTH].
    #[error("password is too short")]
    PasswordTooShort,

    /// The request body could not be parsed into the expected form fields.
    #[error("invalid form data: {0}")]
    InvalidForm(String),

    /// The request body is larger than the configured body limit.
    #[error("the request body is too large")]
    PayloadTooLarge,

    /// The request could not be understood, e.g. a non-numeric ID in the path
    /// or a malformed JSON body.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A required file field was absent from a multipart form.
    #[error("missing file field \"{0}\"")]
    MissingFile(String),

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// No file host has been configured, so uploads cannot be accepted.
    #[error("file uploads are not configured on this server")]
    FileHostUnavailable,

    /// The file host rejected the upload or could not be reached.
    #[error("file upload failed: {0}")]
    UploadFailed(String),

    /// The text generator could not produce a reply.
    ///
    /// Never shown to clients, the summary endpoint replaces it with a fixed
    /// fallback message.
    #[error("text generation failed: {0}")]
    TextGeneration(String),

    /// The identity provider could not complete a delegated login.
    #[error("identity provider error: {0}")]
    IdentityProvider(String),

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// A bearer token could not be signed.
    #[error("could not create token: {0}")]
    TokenCreation(String),

    /// The configured database URL does not point to a SQLite database.
    #[error("unsupported database URL \"{0}\"")]
    InvalidDatabaseUrl(String),

    /// `CLOUDINARY_URL` is not of the form `cloudinary://<key>:<secret>@<cloud>`.
    #[error("invalid Cloudinary URL: {0}")]
    InvalidCloudinaryUrl(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.ends_with("user.email") =>
            {
                Error::DuplicateEmail
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(error) => Error::InvalidForm(error.body_text()),
            rejection if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Error::PayloadTooLarge
            }
            rejection => Error::BadRequest(rejection.body_text()),
        }
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Error::BadRequest(rejection.body_text())
    }
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidCredentials | Error::InvalidToken => StatusCode::UNAUTHORIZED,
            Error::DuplicateEmail | Error::PasswordTooShort | Error::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::InvalidForm(_) | Error::MissingFile(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Error::FileHostUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Error::UploadFailed(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Any errors that end up here are not intended to be shown to the client.
            tracing::error!("An unexpected error occurred: {}", self);
            "An unexpected error occurred, check the server logs for more details.".to_owned()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
