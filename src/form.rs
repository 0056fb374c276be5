//! A form extractor that accepts both URL encoded and multipart bodies.
//!
//! Browsers post `FormData` as `multipart/form-data` while scripts tend to
//! send `application/x-www-form-urlencoded`, and every create endpoint must
//! take either. Text fields are deserialized into `T` the same way in both
//! cases; file parts are kept aside as [UploadedFile]s.

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::{StatusCode, header::CONTENT_TYPE},
};
use serde::{
    Deserialize, Deserializer,
    de::{DeserializeOwned, Error as _},
};

use crate::Error;

/// A file sent as part of a multipart form.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    /// The name of the form field the file was sent in.
    pub field_name: String,
    /// The file name reported by the client.
    pub file_name: String,
    /// The MIME type reported by the client.
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// The text fields of a form deserialized as `T`, plus any uploaded files.
#[derive(Debug)]
pub struct FormData<T> {
    pub fields: T,
    pub files: Vec<UploadedFile>,
}

impl<T> FormData<T> {
    /// Remove and return the file sent in `field_name`, if there is one.
    pub fn take_file(&mut self, field_name: &str) -> Option<UploadedFile> {
        let index = self
            .files
            .iter()
            .position(|file| file.field_name == field_name)?;

        Some(self.files.swap_remove(index))
    }

    /// Like [FormData::take_file], but the file is required.
    ///
    /// # Errors
    ///
    /// Returns [Error::MissingFile] if no file was sent in `field_name`.
    pub fn require_file(&mut self, field_name: &str) -> Result<UploadedFile, Error> {
        self.take_file(field_name)
            .ok_or_else(|| Error::MissingFile(field_name.to_owned()))
    }
}

impl<S, T> FromRequest<S> for FormData<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(request, state)
                .await
                .map_err(|rejection| body_error(rejection.status(), rejection.body_text()))?;

            parse_multipart(multipart).await
        } else {
            let body = Bytes::from_request(request, state)
                .await
                .map_err(|rejection| body_error(rejection.status(), rejection.body_text()))?;

            let fields = serde_urlencoded::from_bytes(&body)
                .map_err(|error| Error::InvalidForm(error.to_string()))?;

            Ok(Self {
                fields,
                files: Vec::new(),
            })
        }
    }
}

/// Bodies over the size limit are reported as such, anything else is a bad form.
fn body_error(status: StatusCode, body_text: String) -> Error {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge
    } else {
        Error::InvalidForm(body_text)
    }
}

/// Deserialize an amount of money, rejecting `NaN` and infinities.
///
/// Use with `#[serde(deserialize_with = "finite_amount")]`.
pub fn finite_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let amount = f64::deserialize(deserializer)?;

    if amount.is_finite() {
        Ok(amount)
    } else {
        Err(D::Error::custom(format!("{amount} is not a valid amount")))
    }
}

async fn parse_multipart<T: DeserializeOwned>(
    mut multipart: Multipart,
) -> Result<FormData<T>, Error> {
    let mut text_fields: Vec<(String, String)> = Vec::new();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| body_error(error.status(), error.body_text()))?
    {
        let field_name = field.name().unwrap_or_default().to_owned();

        let Some(file_name) = field.file_name().map(str::to_owned) else {
            let text = field
                .text()
                .await
                .map_err(|error| body_error(error.status(), error.body_text()))?;
            text_fields.push((field_name, text));
            continue;
        };

        let content_type = field.content_type().map(str::to_owned);
        let bytes = field
            .bytes()
            .await
            .map_err(|error| body_error(error.status(), error.body_text()))?;

        // Browsers send an empty, nameless part for a file input left blank.
        if file_name.is_empty() && bytes.is_empty() {
            continue;
        }

        files.push(UploadedFile {
            field_name,
            file_name,
            content_type,
            bytes,
        });
    }

    // Round trip through the URL encoded format so that both body types
    // share one deserializer, including number parsing.
    let encoded = serde_urlencoded::to_string(&text_fields)
        .map_err(|error| Error::InvalidForm(error.to_string()))?;
    let fields = serde_urlencoded::from_str(&encoded)
        .map_err(|error| Error::InvalidForm(error.to_string()))?;

    Ok(FormData { fields, files })
}
