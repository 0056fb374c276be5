//! Creates, resets and shares the application's SQLite database.

use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};

use crate::{
    AppState, Error, category::create_category_table, document::create_document_table,
    payment::create_payment_table, receivable::create_receivable_table,
    supplier::create_supplier_table, user::create_user_table,
};

/// Every table in the database, children before parents so that the list can
/// be used as a drop order.
const TABLES: [&str; 6] = [
    "document",
    "supplier",
    "receivable",
    "payment",
    "category",
    "user",
];

/// The state needed by route handlers that only touch the database.
#[derive(Debug, Clone)]
pub struct DatabaseState {
    /// The database connection shared by all requests.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DatabaseState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Run `query` while holding the database lock.
///
/// The lock is released before this function returns, so async handlers must
/// call it outside of any `.await` on an external service.
///
/// # Errors
///
/// Returns [Error::DatabaseLockError] if the lock is poisoned, otherwise
/// whatever `query` returns.
pub fn with_connection<T>(
    db_connection: &Mutex<Connection>,
    query: impl FnOnce(&Connection) -> Result<T, Error>,
) -> Result<T, Error> {
    let connection = db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })?;

    query(&connection)
}

/// Create all of the application tables if they do not already exist.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.pragma_update(None, "foreign_keys", "ON")?;

    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;
    create_tables(&transaction)?;
    transaction.commit()?;

    Ok(())
}

/// Drop and recreate every table, leaving the schema intact and all tables empty.
///
/// # Errors
/// Returns an error if there is an SQL error, in which case no table is changed.
pub fn reset(connection: &Connection) -> Result<(), Error> {
    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    for table in TABLES {
        transaction.execute_batch(&format!("DROP TABLE IF EXISTS \"{table}\";"))?;
    }

    create_tables(&transaction)?;
    transaction.commit()?;

    Ok(())
}

fn create_tables(connection: &Connection) -> Result<(), rusqlite::Error> {
    create_user_table(connection)?;
    create_category_table(connection)?;
    create_payment_table(connection)?;
    create_receivable_table(connection)?;
    create_supplier_table(connection)?;
    create_document_table(connection)?;

    Ok(())
}

#[cfg(test)]
mod db_tests {
    use rusqlite::Connection;

    use crate::{
        auth::PasswordHash,
        category::{NewCategory, create_category},
        db::{TABLES, initialize, reset},
        user::{NewUser, count_users, create_user},
    };

    fn count_rows(table: &str, connection: &Connection) -> i64 {
        connection
            .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
                row.get(0)
            })
            .unwrap()
    }

    #[test]
    fn initialize_is_idempotent() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).unwrap();
        initialize(&connection).unwrap();

        for table in TABLES {
            assert_eq!(count_rows(table, &connection), 0);
        }
    }

    #[test]
    fn initialize_enables_foreign_keys() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();

        let result = connection.execute(
            "INSERT INTO category (name, kind, owner_id) VALUES ('Food', 'expense', 42)",
            (),
        );

        assert!(result.is_err(), "want foreign key violation, got {result:?}");
    }

    #[test]
    fn reset_empties_tables_and_keeps_schema() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        let user = create_user(
            NewUser {
                email: "foo@bar.baz".to_owned(),
                full_name: "Foo".to_owned(),
                password_hash: PasswordHash::new_unchecked("hunter2"),
                avatar_url: None,
            },
            &connection,
        )
        .unwrap();
        create_category(
            NewCategory {
                name: "Food".to_owned(),
                kind: "expense".to_owned(),
            },
            user.id,
            &connection,
        )
        .unwrap();

        reset(&connection).unwrap();

        assert_eq!(count_users(&connection).unwrap(), 0);
        for table in TABLES {
            assert_eq!(count_rows(table, &connection), 0, "table {table} not empty");
        }

        // The schema must still accept new rows.
        create_user(
            NewUser {
                email: "foo@bar.baz".to_owned(),
                full_name: "Foo".to_owned(),
                password_hash: PasswordHash::new_unchecked("hunter2"),
                avatar_url: None,
            },
            &connection,
        )
        .unwrap();
        assert_eq!(count_users(&connection).unwrap(), 1);
    }
}
