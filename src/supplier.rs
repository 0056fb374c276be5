//! Suppliers the user buys from.

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
    user::{User, UserID},
};

pub type SupplierId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: SupplierId,
    #[serde(rename = "nome")]
    pub name: String,
    pub email: String,
    #[serde(rename = "telefone")]
    pub phone: String,
    #[serde(rename = "categoria")]
    pub category: String,
    #[serde(rename = "data_cadastro", with = "time::serde::rfc3339")]
    pub registered_at: OffsetDateTime,
    pub owner_id: UserID,
}

/// The form body for a new supplier. Only the name is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierForm {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "telefone", default)]
    pub phone: String,
    #[serde(rename = "categoria", default)]
    pub category: String,
}

pub fn create_supplier_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS supplier (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT NOT NULL,
            category TEXT NOT NULL,
            registered_at TEXT NOT NULL,
            owner_id INTEGER NOT NULL REFERENCES user(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_supplier_owner ON supplier(owner_id);",
    )?;

    Ok(())
}

/// Create a supplier owned by `owner`, registered at `registered_at`.
pub fn create_supplier(
    form: SupplierForm,
    registered_at: OffsetDateTime,
    owner: UserID,
    connection: &Connection,
) -> Result<Supplier, Error> {
    connection.execute(
        "INSERT INTO supplier (name, email, phone, category, registered_at, owner_id)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            form.name,
            form.email,
            form.phone,
            form.category,
            registered_at,
            owner.as_i64(),
        ],
    )?;

    Ok(Supplier {
        id: connection.last_insert_rowid(),
        name: form.name,
        email: form.email,
        phone: form.phone,
        category: form.category,
        registered_at,
        owner_id: owner,
    })
}

pub fn get_suppliers(owner: UserID, connection: &Connection) -> Result<Vec<Supplier>, Error> {
    connection
        .prepare(
            "SELECT id, name, email, phone, category, registered_at, owner_id FROM supplier
            WHERE owner_id = ?1 ORDER BY id ASC",
        )?
        .query_map([owner.as_i64()], map_row)?
        .map(|maybe_supplier| maybe_supplier.map_err(|error| error.into()))
        .collect()
}

/// Delete the supplier `supplier_id` if `owner` owns it, returning whether a row was deleted.
pub fn delete_supplier(
    supplier_id: SupplierId,
    owner: UserID,
    connection: &Connection,
) -> Result<bool, Error> {
    connection
        .execute(
            "DELETE FROM supplier WHERE id = ?1 AND owner_id = ?2",
            (supplier_id, owner.as_i64()),
        )
        .map(|rows_affected| rows_affected > 0)
        .map_err(|error| error.into())
}

fn map_row(row: &Row) -> Result<Supplier, rusqlite::Error> {
    Ok(Supplier {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        category: row.get(4)?,
        registered_at: row.get(5)?,
        owner_id: UserID::new(row.get(6)?),
    })
}

pub async fn create_supplier_endpoint(
    State(state): State<DatabaseState>,
    Extension(user): Extension<User>,
    FormData { fields, .. }: FormData<SupplierForm>,
) -> Result<Json<Supplier>, Error> {
    with_connection(&state.db_connection, |connection| {
        create_supplier(fields, OffsetDateTime::now_utc(), user.id, connection)
    })
    .map(Json)
}

pub async fn list_suppliers_endpoint(
    State(state): State<DatabaseState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Supplier>>, Error> {
    with_connection(&state.db_connection, |connection| {
        get_suppliers(user.id, connection)
    })
    .map(Json)
}

pub async fn delete_supplier_endpoint(
    State(state): State<DatabaseState>,
    Extension(user): Extension<User>,
    PathParam(supplier_id): PathParam<SupplierId>,
) -> Result<Json<Value>, Error> {
    with_connection(&state.db_connection, |connection| {
        delete_supplier(supplier_id, user.id, connection)
    })?;

    Ok(Json(json!({ "ok": true })))
}
