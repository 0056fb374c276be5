//! Receivables, money the user has been paid or expects to be paid.

use axum::{Extension, Json, extract::State};
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::{
    Error,
    db::{DatabaseState, with_connection},
    extract::PathParam,
    form::{FormData, finite_amount},
    user::{User, UserID},
};

/// The client recorded when the form leaves it blank.
pub const DEFAULT_CLIENT: &str = "Cliente";
/// The status recorded when the form leaves it blank.
pub const DEFAULT_STATUS: &str = "Recebido";

pub type ReceivableId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receivable {
    pub id: ReceivableId,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "valor")]
    pub amount: f64,
    #[serde(rename = "cliente")]
    pub client: String,
    #[serde(rename = "data_recebimento", with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
    pub status: String,
    pub owner_id: UserID,
}

/// The form body for a new receivable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivableForm {
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "valor", deserialize_with = "finite_amount")]
    pub amount: f64,
    #[serde(rename = "cliente", default)]
    pub client: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReceivable {
    pub title: String,
    pub amount: f64,
    pub client: String,
    pub received_at: OffsetDateTime,
    pub status: String,
}

impl NewReceivable {
    /// Fill in the defaults for anything the form left blank.
    pub fn from_form(form: ReceivableForm, received_at: OffsetDateTime) -> Self {
        Self {
            title: form.title,
            amount: form.amount,
            client: non_blank_or(form.client, DEFAULT_CLIENT),
            received_at,
            status: non_blank_or(form.status, DEFAULT_STATUS),
        }
    }
}

fn non_blank_or(value: Option<String>, default: &str) -> String {
    value
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_owned())
}

/// Create the receivable table.
pub fn create_receivable_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS receivable (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            amount REAL NOT NULL,
            client TEXT NOT NULL,
            received_at TEXT NOT NULL,
            status TEXT NOT NULL,
            owner_id INTEGER NOT NULL REFERENCES user(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_receivable_owner ON receivable(owner_id);",
    )?;

    Ok(())
}

pub fn create_receivable(
    new_receivable: NewReceivable,
    owner: UserID,
    connection: &Connection,
) -> Result<Receivable, Error> {
    connection.execute(
        "INSERT INTO receivable (title, amount, client, received_at, status, owner_id)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            new_receivable.title,
            new_receivable.amount,
            new_receivable.client,
            new_receivable.received_at,
            new_receivable.status,
            owner.as_i64(),
        ],
    )?;

    Ok(Receivable {
        id: connection.last_insert_rowid(),
        title: new_receivable.title,
        amount: new_receivable.amount,
        client: new_receivable.client,
        received_at: new_receivable.received_at,
        status: new_receivable.status,
        owner_id: owner,
    })
}

pub fn get_receivables(owner: UserID, connection: &Connection) -> Result<Vec<Receivable>, Error> {
    connection
        .prepare(
            "SELECT id, title, amount, client, received_at, status, owner_id FROM receivable
            WHERE owner_id = ?1 ORDER BY id ASC",
        )?
        .query_map([owner.as_i64()], map_row)?
        .map(|maybe_receivable| maybe_receivable.map_err(|error| error.into()))
        .collect()
}

/// Delete the receivable `receivable_id` if `owner` owns it.
///
/// Returns whether a row was deleted.
pub fn delete_receivable(
    receivable_id: ReceivableId,
    owner: UserID,
    connection: &Connection,
) -> Result<bool, Error> {
    let rows_affected = connection.execute(
        "DELETE FROM receivable WHERE id = ?1 AND owner_id = ?2",
        (receivable_id, owner.as_i64()),
    )?;

    Ok(rows_affected > 0)
}

fn map_row(row: &Row) -> Result<Receivable, rusqlite::Error> {
    Ok(Receivable {
        id: row.get(0)?,
        title: row.get(1)?,
        amount: row.get(2)?,
        client: row.get(3)?,
        received_at: row.get(4)?,
        status: row.get(5)?,
        owner_id: UserID::new(row.get(6)?),
    })
}

/// Record a receivable for the current user, received now.
pub async fn create_receivable_endpoint(
    State(state): State<DatabaseState>,
    Extension(user): Extension<User>,
    FormData { fields, .. }: FormData<ReceivableForm>,
) -> Result<Json<Receivable>, Error> {
    let new_receivable = NewReceivable::from_form(fields, OffsetDateTime::now_utc());

    with_connection(&state.db_connection, |connection| {
        create_receivable(new_receivable, user.id, connection)
    })
    .map(Json)
}

pub async fn list_receivables_endpoint(
    State(state): State<DatabaseState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Receivable>>, Error> {
    with_connection(&state.db_connection, |connection| {
        get_receivables(user.id, connection)
    })
    .map(Json)
}

/// Delete one of the current user's receivables, doing nothing if it is not theirs.
pub async fn delete_receivable_endpoint(
    State(state): State<DatabaseState>,
    Extension(user): Extension<User>,
    PathParam(receivable_id): PathParam<ReceivableId>,
) -> Result<Json<Value>, Error> {
    let deleted = with_connection(&state.db_connection, |connection| {
        delete_receivable(receivable_id, user.id, connection)
    })?;

    if !deleted {
        tracing::debug!("user {} has no receivable {receivable_id} to delete", user.id);
    }

    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
mod receivable_tests {
    use rusqlite::Connection;
    use time::macros::datetime;

    use crate::{
        db::initialize,
        receivable::{
            DEFAULT_CLIENT, DEFAULT_STATUS, NewReceivable, ReceivableForm, create_receivable,
            delete_receivable, get_receivables,
        },
        test_utils::insert_user,
    };

    fn form(client: Option<&str>, status: Option<&str>) -> ReceivableForm {
        ReceivableForm {
            title: "Consultoria".to_owned(),
            amount: 2500.0,
            client: client.map(str::to_owned),
            status: status.map(str::to_owned),
        }
    }

    #[test]
    fn blank_client_and_status_get_defaults() {
        let received_at = datetime!(2025-04-10 10:00 UTC);

        let missing = NewReceivable::from_form(form(None, None), received_at);
        let blank = NewReceivable::from_form(form(Some(""), Some("  ")), received_at);

        for receivable in [missing, blank] {
            assert_eq!(receivable.client, DEFAULT_CLIENT);
            assert_eq!(receivable.status, DEFAULT_STATUS);
        }
    }

    #[test]
    fn provided_client_and_status_are_kept() {
        let receivable = NewReceivable::from_form(
            form(Some("ACME"), Some("Pendente")),
            datetime!(2025-04-10 10:00 UTC),
        );

        assert_eq!(receivable.client, "ACME");
        assert_eq!(receivable.status, "Pendente");
    }

    #[test]
    fn receivables_are_scoped_to_owner() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        let owner = insert_user("foo@bar.baz", &connection).id;
        let other = insert_user("other@bar.baz", &connection).id;
        let new_receivable =
            NewReceivable::from_form(form(None, None), datetime!(2025-04-10 10:00 UTC));
        let created = create_receivable(new_receivable, owner, &connection).unwrap();

        assert_eq!(get_receivables(owner, &connection), Ok(vec![created.clone()]));
        assert_eq!(get_receivables(other, &connection), Ok(vec![]));
        assert_eq!(delete_receivable(created.id, other, &connection), Ok(false));
        assert_eq!(delete_receivable(created.id, owner, &connection), Ok(true));
        assert_eq!(get_receivables(owner, &connection), Ok(vec![]));
    }
}
