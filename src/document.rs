//! Documents the user keeps on file, such as contracts and invoices.
//!
//! The file itself lives on the file host, only its public URL is stored.

use axum::{Extension, Json, extract::State};
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::{
    Error,
    db::{DatabaseState, with_connection},
    extract::PathParam,
    form::FormData,
    storage::{FileUploadState, upload_file},
    user::{User, UserID},
};

/// The form field the document file is sent in.
const FILE_FIELD: &str = "arquivo";

pub type DocumentId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "categoria")]
    pub category: String,
    #[serde(rename = "arquivo_url")]
    pub file_url: String,
    #[serde(rename = "data_upload", with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
    pub owner_id: UserID,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentForm {
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "categoria")]
    pub category: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub title: String,
    pub category: String,
    pub file_url: String,
    pub uploaded_at: OffsetDateTime,
}

pub fn create_document_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS document (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            category TEXT NOT NULL,
            file_url TEXT NOT NULL,
            uploaded_at TEXT NOT NULL,
            owner_id INTEGER NOT NULL REFERENCES user(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_document_owner ON document(owner_id);",
    )?;

    Ok(())
}

pub fn create_document(
    new_document: NewDocument,
    owner: UserID,
    connection: &Connection,
) -> Result<Document, Error> {
    connection.execute(
        "INSERT INTO document (title, category, file_url, uploaded_at, owner_id)
        VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            new_document.title,
            new_document.category,
            new_document.file_url,
            new_document.uploaded_at,
            owner.as_i64(),
        ],
    )?;

    Ok(Document {
        id: connection.last_insert_rowid(),
        title: new_document.title,
        category: new_document.category,
        file_url: new_document.file_url,
        uploaded_at: new_document.uploaded_at,
        owner_id: owner,
    })
}

pub fn get_documents(owner: UserID, connection: &Connection) -> Result<Vec<Document>, Error> {
    connection
        .prepare(
            "SELECT id, title, category, file_url, uploaded_at, owner_id FROM document
            WHERE owner_id = ?1 ORDER BY id ASC",
        )?
        .query_map([owner.as_i64()], map_row)?
        .map(|maybe_document| maybe_document.map_err(|error| error.into()))
        .collect()
}

/// Delete the document record `document_id` if `owner` owns it.
///
/// The file on the file host is left in place.
pub fn delete_document(
    document_id: DocumentId,
    owner: UserID,
    connection: &Connection,
) -> Result<bool, Error> {
    let rows_affected = connection.execute(
        "DELETE FROM document WHERE id = ?1 AND owner_id = ?2",
        (document_id, owner.as_i64()),
    )?;

    Ok(rows_affected > 0)
}

fn map_row(row: &Row) -> Result<Document, rusqlite::Error> {
    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        category: row.get(2)?,
        file_url: row.get(3)?,
        uploaded_at: row.get(4)?,
        owner_id: UserID::new(row.get(5)?),
    })
}

/// Upload a document for the current user and record where it was stored.
///
/// # Errors
///
/// Fails with [Error::MissingFile] if no file was sent in the `arquivo` field,
/// or with the upload error if the file host could not store it.
pub async fn create_document_endpoint(
    State(state): State<FileUploadState>,
    Extension(user): Extension<User>,
    mut form: FormData<DocumentForm>,
) -> Result<Json<Document>, Error> {
    let file = form.require_file(FILE_FIELD)?;
    let file_url = upload_file(state.file_host.as_deref(), file).await?;

    let new_document = NewDocument {
        title: form.fields.title,
        category: form.fields.category,
        file_url,
        uploaded_at: OffsetDateTime::now_utc(),
    };

    with_connection(&state.db_connection, |connection| {
        create_document(new_document, user.id, connection)
    })
    .map(Json)
}

pub async fn list_documents_endpoint(
    State(state): State<DatabaseState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Document>>, Error> {
    with_connection(&state.db_connection, |connection| {
        get_documents(user.id, connection)
    })
    .map(Json)
}

pub async fn delete_document_endpoint(
    State(state): State<DatabaseState>,
    Extension(user): Extension<User>,
    PathParam(document_id): PathParam<DocumentId>,
) -> Result<Json<Value>, Error> {
    with_connection(&state.db_connection, |connection| {
        delete_document(document_id, user.id, connection)
    })?;

    Ok(Json(json!({ "ok": true })))
}
