//! Uploads attachments to an external file host and hands back public URLs.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::extract::FromRef;
use reqwest::{
    Url,
    multipart::{Form, Part},
};
use rusqlite::Connection;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use time::OffsetDateTime;

use crate::{AppState, Error, form::UploadedFile};

/// How long an upload to Cloudinary may take before it is abandoned.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

const CLOUDINARY_API_URL: &str = "https://api.cloudinary.com/v1_1";

/// Somewhere to keep uploaded files.
#[async_trait]
pub trait FileHost: Send + Sync {
    /// Store `file` and return the public URL it can be downloaded from.
    async fn upload(&self, file: UploadedFile) -> Result<String, Error>;
}

/// The state needed by handlers that store an uploaded file and then write to the database.
#[derive(Clone)]
pub struct FileUploadState {
    pub db_connection: Arc<Mutex<Connection>>,
    /// `None` when no file host is configured.
    pub file_host: Option<Arc<dyn FileHost>>,
}

impl FromRef<AppState> for FileUploadState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            file_host: state.file_host.clone(),
        }
    }
}

/// Upload `file` to `file_host`, logging failures.
///
/// # Errors
///
/// Returns [Error::FileHostUnavailable] if no file host is configured, or the
/// host's error if the upload failed.
pub async fn upload_file(
    file_host: Option<&dyn FileHost>,
    file: UploadedFile,
) -> Result<String, Error> {
    let Some(file_host) = file_host else {
        tracing::warn!("rejected upload of {}, no file host is configured", file.file_name);
        return Err(Error::FileHostUnavailable);
    };

    let file_name = file.file_name.clone();
    let url = file_host
        .upload(file)
        .await
        .inspect_err(|error| tracing::error!("could not upload {file_name}: {error}"))?;
    tracing::debug!("uploaded {file_name} to {url}");

    Ok(url)
}

/// Cloudinary credentials structure to upload files.
#[derive(Clone, PartialEq)]
pub struct CloudinaryCredentials {
    /// Cloudinary API key.
    pub api_key: String,
    /// Cloudinary API secret.
    /// Should never be shared!
    pub api_secret: String,
    /// Cloudinary cloud name.
    pub cloud_name: String,
}

impl std::fmt::Debug for CloudinaryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"********")
            .field("cloud_name", &self.cloud_name)
            .finish()
    }
}

impl CloudinaryCredentials {
    /// Parse a `cloudinary://<api_key>:<api_secret>@<cloud_name>` URL.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidCloudinaryUrl] if the scheme is wrong or any part
    /// is missing.
    pub fn from_url(raw_url: &str) -> Result<Self, Error> {
        let url =
            Url::parse(raw_url).map_err(|error| Error::InvalidCloudinaryUrl(error.to_string()))?;

        if url.scheme() != "cloudinary" {
            return Err(Error::InvalidCloudinaryUrl(format!(
                "expected the cloudinary:// scheme, got {}://",
                url.scheme()
            )));
        }

        let api_key = url.username();
        let api_secret = url.password().unwrap_or_default();
        let cloud_name = url.host_str().unwrap_or_default();

        if api_key.is_empty() || api_secret.is_empty() || cloud_name.is_empty() {
            return Err(Error::InvalidCloudinaryUrl(
                "the API key, API secret and cloud name must all be set".to_owned(),
            ));
        }

        Ok(Self {
            api_key: api_key.to_owned(),
            api_secret: api_secret.to_owned(),
            cloud_name: cloud_name.to_owned(),
        })
    }
}

/// The signature Cloudinary expects for an upload that only sets `timestamp`.
fn sign_upload(timestamp: i64, api_secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("timestamp={timestamp}{api_secret}"));

    hex::encode(hasher.finalize())
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// Uploads files to Cloudinary with signed requests.
pub struct CloudinaryClient {
    credentials: CloudinaryCredentials,
    http_client: reqwest::Client,
    upload_url: String,
}

impl CloudinaryClient {
    /// # Errors
    ///
    /// Returns [Error::UploadFailed] if the HTTP client cannot be built.
    pub fn new(credentials: CloudinaryCredentials) -> Result<Self, Error> {
        Self::with_api_url(credentials, CLOUDINARY_API_URL, UPLOAD_TIMEOUT)
    }

    /// A client that uploads to `api_url` and gives up on uploads slower than `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [Error::UploadFailed] if the HTTP client cannot be built.
    pub fn with_api_url(
        credentials: CloudinaryCredentials,
        api_url: &str,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::UploadFailed(error.to_string()))?;
        let upload_url = format!("{api_url}/{}/auto/upload", credentials.cloud_name);

        Ok(Self {
            credentials,
            http_client,
            upload_url,
        })
    }
}

#[async_trait]
impl FileHost for CloudinaryClient {
    async fn upload(&self, file: UploadedFile) -> Result<String, Error> {
        let timestamp = OffsetDateTime::now_utc().unix_timestamp();
        let signature = sign_upload(timestamp, &self.credentials.api_secret);

        let mut part = Part::bytes(file.bytes.to_vec()).file_name(file.file_name);
        if let Some(content_type) = file.content_type {
            part = part
                .mime_str(&content_type)
                .map_err(|error| Error::UploadFailed(error.to_string()))?;
        }

        let form = Form::new()
            .part("file", part)
            .text("api_key", self.credentials.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("signature", signature);

        let response = self
            .http_client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|error| Error::UploadFailed(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UploadFailed(format!(
                "Cloudinary returned {status}: {body}"
            )));
        }

        response
            .json::<UploadResponse>()
            .await
            .map(|body| body.secure_url)
            .map_err(|error| Error::UploadFailed(error.to_string()))
    }
}
