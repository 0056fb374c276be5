//! The payment model and the database functions for storing and querying payments.

use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, form::finite_amount, user::UserID};

pub type PaymentId = i64;

/// Money the user has spent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "valor")]
    pub amount: f64,
    /// A free text label, not a reference to a [crate::category::Category].
    #[serde(rename = "categoria")]
    pub category: String,
    #[serde(rename = "data_pagamento", with = "time::serde::rfc3339")]
    pub paid_at: OffsetDateTime,
    /// Public URL of the uploaded receipt, if one was attached.
    #[serde(rename = "comprovante_path")]
    pub receipt_url: Option<String>,
    pub owner_id: UserID,
}

/// The fields a user fills in when creating or editing a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentForm {
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "valor", deserialize_with = "finite_amount")]
    pub amount: f64,
    #[serde(rename = "categoria")]
    pub category: String,
}

/// The data needed to insert a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub title: String,
    pub amount: f64,
    pub category: String,
    pub paid_at: OffsetDateTime,
    pub receipt_url: Option<String>,
}

/// Create the payment table.
pub fn create_payment_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS payment (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            amount REAL NOT NULL,
            category TEXT NOT NULL,
            paid_at TEXT NOT NULL,
            receipt_url TEXT,
            owner_id INTEGER NOT NULL REFERENCES user(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_payment_owner_paid_at ON payment(owner_id, paid_at);",
    )?;

    Ok(())
}

/// Create a payment owned by `owner` and return it with its generated ID.
pub fn create_payment(
    new_payment: NewPayment,
    owner: UserID,
    connection: &Connection,
) -> Result<Payment, Error> {
    connection.execute(
        "INSERT INTO payment (title, amount, category, paid_at, receipt_url, owner_id)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            new_payment.title,
            new_payment.amount,
            new_payment.category,
            new_payment.paid_at,
            new_payment.receipt_url,
            owner.as_i64(),
        ],
    )?;

    Ok(Payment {
        id: connection.last_insert_rowid(),
        title: new_payment.title,
        amount: new_payment.amount,
        category: new_payment.category,
        paid_at: new_payment.paid_at,
        receipt_url: new_payment.receipt_url,
        owner_id: owner,
    })
}

/// Retrieve a single payment, if `owner` owns it.
///
/// # Errors
///
/// Returns [Error::NotFound] if there is no such payment or it belongs to
/// another user.
pub fn get_payment(
    payment_id: PaymentId,
    owner: UserID,
    connection: &Connection,
) -> Result<Payment, Error> {
    connection
        .prepare(
            "SELECT id, title, amount, category, paid_at, receipt_url, owner_id FROM payment
            WHERE id = ?1 AND owner_id = ?2",
        )?
        .query_row((payment_id, owner.as_i64()), map_row)
        .map_err(|error| error.into())
}

/// Retrieve every payment owned by `owner` in the order they were created.
pub fn get_payments(owner: UserID, connection: &Connection) -> Result<Vec<Payment>, Error> {
    connection
        .prepare(
            "SELECT id, title, amount, category, paid_at, receipt_url, owner_id FROM payment
            WHERE owner_id = ?1 ORDER BY id ASC",
        )?
        .query_map([owner.as_i64()], map_row)?
        .map(|maybe_payment| maybe_payment.map_err(|error| error.into()))
        .collect()
}

/// Retrieve the `limit` most recent payments owned by `owner`, newest first.
///
/// Payments made at the same instant are ordered by descending ID.
pub fn get_recent_payments(
    owner: UserID,
    limit: u32,
    connection: &Connection,
) -> Result<Vec<Payment>, Error> {
    connection
        .prepare(
            "SELECT id, title, amount, category, paid_at, receipt_url, owner_id FROM payment
            WHERE owner_id = ?1 ORDER BY paid_at DESC, id DESC LIMIT ?2",
        )?
        .query_map((owner.as_i64(), limit), map_row)?
        .map(|maybe_payment| maybe_payment.map_err(|error| error.into()))
        .collect()
}

/// Overwrite the title, amount and category of a payment `owner` owns.
///
/// # Errors
///
/// Returns [Error::NotFound] if there is no such payment or it belongs to
/// another user.
pub fn update_payment(
    payment_id: PaymentId,
    owner: UserID,
    form: &PaymentForm,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE payment SET title = ?1, amount = ?2, category = ?3
        WHERE id = ?4 AND owner_id = ?5",
        params![
            form.title,
            form.amount,
            form.category,
            payment_id,
            owner.as_i64()
        ],
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Delete the payment `payment_id` if `owner` owns it.
///
/// Returns whether a row was deleted.
pub fn delete_payment(
    payment_id: PaymentId,
    owner: UserID,
    connection: &Connection,
) -> Result<bool, Error> {
    let rows_affected = connection.execute(
        "DELETE FROM payment WHERE id = ?1 AND owner_id = ?2",
        (payment_id, owner.as_i64()),
    )?;

    Ok(rows_affected > 0)
}

fn map_row(row: &Row) -> Result<Payment, rusqlite::Error> {
    Ok(Payment {
        id: row.get(0)?,
        title: row.get(1)?,
        amount: row.get(2)?,
        category: row.get(3)?,
        paid_at: row.get(4)?,
        receipt_url: row.get(5)?,
        owner_id: UserID::new(row.get(6)?),
    })
}
