//! Categories a user sorts their income and expenses into.

use axum::{Extension, Json, extract::State};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    Error,
    db::{DatabaseState, with_connection},
    extract::PathParam,
    form::FormData,
    user::{User, UserID},
};

pub type CategoryId = i64;

/// A user defined label such as "Rent" or "Salary".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    /// Whether the category is for income or expenses. Free text.
    #[serde(rename = "type")]
    pub kind: String,
    pub owner_id: UserID,
}

/// The data needed to create a category, also used as the form body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Create the category table.
pub fn create_category_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS category (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            owner_id INTEGER NOT NULL REFERENCES user(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_category_owner ON category(owner_id);",
    )?;

    Ok(())
}

/// Create a category owned by `owner` and return it with its generated ID.
pub fn create_category(
    new_category: NewCategory,
    owner: UserID,
    connection: &Connection,
) -> Result<Category, Error> {
    connection.execute(
        "INSERT INTO category (name, kind, owner_id) VALUES (?1, ?2, ?3)",
        (&new_category.name, &new_category.kind, owner.as_i64()),
    )?;

    Ok(Category {
        id: connection.last_insert_rowid(),
        name: new_category.name,
        kind: new_category.kind,
        owner_id: owner,
    })
}

/// Retrieve every category owned by `owner` in the order they were created.
pub fn get_categories(owner: UserID, connection: &Connection) -> Result<Vec<Category>, Error> {
    connection
        .prepare(
            "SELECT id, name, kind, owner_id FROM category
            WHERE owner_id = :owner_id ORDER BY id ASC",
        )?
        .query_map(&[(":owner_id", &owner.as_i64())], map_row)?
        .map(|maybe_category| maybe_category.map_err(|error| error.into()))
        .collect()
}

/// Delete the category `category_id` if `owner` owns it.
///
/// Returns whether a row was deleted.
pub fn delete_category(
    category_id: CategoryId,
    owner: UserID,
    connection: &Connection,
) -> Result<bool, Error> {
    let rows_affected = connection.execute(
        "DELETE FROM category WHERE id = ?1 AND owner_id = ?2",
        (category_id, owner.as_i64()),
    )?;

    Ok(rows_affected > 0)
}

fn map_row(row: &Row) -> Result<Category, rusqlite::Error> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        owner_id: UserID::new(row.get(3)?),
    })
}

/// Create a category for the current user.
pub async fn create_category_endpoint(
    State(state): State<DatabaseState>,
    Extension(user): Extension<User>,
    FormData { fields, .. }: FormData<NewCategory>,
) -> Result<Json<Category>, Error> {
    with_connection(&state.db_connection, |connection| {
        create_category(fields, user.id, connection)
    })
    .map(Json)
}

/// List the current user's categories.
pub async fn list_categories_endpoint(
    State(state): State<DatabaseState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Category>>, Error> {
    with_connection(&state.db_connection, |connection| {
        get_categories(user.id, connection)
    })
    .map(Json)
}

/// Delete one of the current user's categories.
///
/// Succeeds even if the category does not exist or belongs to someone else,
/// in which case nothing is deleted.
pub async fn delete_category_endpoint(
    State(state): State<DatabaseState>,
    Extension(user): Extension<User>,
    PathParam(category_id): PathParam<CategoryId>,
) -> Result<Json<Value>, Error> {
    let deleted = with_connection(&state.db_connection, |connection| {
        delete_category(category_id, user.id, connection)
    })?;

    if !deleted {
        tracing::debug!("user {} has no category {category_id} to delete", user.id);
    }

    Ok(Json(json!({ "ok": true })))
}
