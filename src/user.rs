//! Code for creating the user table and fetching users from the database.

use std::fmt::Display;

use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::{Error, auth::PasswordHash};

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors, and more flexible generics that can have distinct implementations for multiple ID types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A user of the application.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserID,
    /// The unique email the user signs in with.
    pub email: String,
    /// The user's display name.
    pub full_name: String,
    /// The user's password hash, or the provider sentinel for delegated logins.
    pub password_hash: PasswordHash,
    /// A public URL to the user's profile picture.
    pub avatar_url: Option<String>,
    /// The stored premium flag.
    ///
    /// Clients never see this value, see [UserProfile].
    pub is_premium: bool,
}

/// The data needed to insert a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub password_hash: PasswordHash,
    pub avatar_url: Option<String>,
}

/// The user data sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserID,
    pub email: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    /// Always `true`, whatever the stored flag says.
    pub is_premium: bool,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            avatar_url: user.avatar_url.clone(),
            is_premium: true,
        }
    }
}

/// Create the user table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                full_name TEXT NOT NULL,
                password TEXT NOT NULL,
                avatar_url TEXT,
                is_premium INTEGER NOT NULL DEFAULT 1
                )",
        (),
    )?;

    Ok(())
}

/// Create and insert a new user into the database.
///
/// New users are always stored as premium.
///
/// # Errors
///
/// Returns a [Error::DuplicateEmail] if the email is already taken, or a
/// [Error::SqlError] if some other SQL related error occurred.
pub fn create_user(new_user: NewUser, connection: &Connection) -> Result<User, Error> {
    connection.execute(
        "INSERT INTO user (email, full_name, password, avatar_url, is_premium)
        VALUES (?1, ?2, ?3, ?4, 1)",
        (
            &new_user.email,
            &new_user.full_name,
            new_user.password_hash.as_ref(),
            &new_user.avatar_url,
        ),
    )?;

    let id = UserID::new(connection.last_insert_rowid());

    Ok(User {
        id,
        email: new_user.email,
        full_name: new_user.full_name,
        password_hash: new_user.password_hash,
        avatar_url: new_user.avatar_url,
        is_premium: true,
    })
}

/// Get the user whose email is `email`.
///
/// # Errors
///
/// Returns [Error::NotFound] if no user has that email.
pub fn get_user_by_email(email: &str, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(
            "SELECT id, email, full_name, password, avatar_url, is_premium
            FROM user WHERE email = :email",
        )?
        .query_row(&[(":email", email)], map_row)
        .map_err(|error| error.into())
}

/// Get the user whose email is `email`, or `None` if there is no such user.
///
/// # Errors
///
/// Returns a [Error::SqlError] if an SQL related error occurred.
pub fn find_user_by_email(email: &str, connection: &Connection) -> Result<Option<User>, Error> {
    connection
        .prepare(
            "SELECT id, email, full_name, password, avatar_url, is_premium
            FROM user WHERE email = :email",
        )?
        .query_row(&[(":email", email)], map_row)
        .optional()
        .map_err(|error| error.into())
}

/// Set the display name of the user `user_id`.
pub fn update_full_name(
    user_id: UserID,
    full_name: &str,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user SET full_name = ?1 WHERE id = ?2",
        (full_name, user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Replace the password hash of the user `user_id`.
pub fn update_password(
    user_id: UserID,
    password_hash: &PasswordHash,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user SET password = ?1 WHERE id = ?2",
        (password_hash.as_ref(), user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Store a new avatar URL for the user `user_id`.
pub fn update_avatar_url(
    user_id: UserID,
    avatar_url: &str,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user SET avatar_url = ?1 WHERE id = ?2",
        (avatar_url, user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Get the number of users in the database.
///
/// # Errors
///
/// Returns a [Error::SqlError] if an SQL related error occurred.
pub fn count_users(connection: &Connection) -> Result<usize, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM user;", [], |row| row.get(0))
        .map_err(|error| error.into())
}

fn map_row(row: &Row) -> Result<User, rusqlite::Error> {
    let raw_password_hash: String = row.get(3)?;

    Ok(User {
        id: UserID::new(row.get(0)?),
        email: row.get(1)?,
        full_name: row.get(2)?,
        password_hash: PasswordHash::new_unchecked(&raw_password_hash),
        avatar_url: row.get(4)?,
        is_premium: row.get(5)?,
    })
}

#[cfg(test)]
mod user_tests {
    use rusqlite::Connection;

    use crate::{
        Error,
        auth::PasswordHash,
        user::{
            NewUser, UserProfile, count_users, create_user, find_user_by_email,
            get_user_by_email, update_avatar_url, update_full_name, update_password,
        },
    };

    use super::create_user_table;

    fn get_db_connection() -> Connection {
        let conn =
            Connection::open_in_memory().expect("Could not create in-memory SQLite database");
        create_user_table(&conn).expect("Could not create user table");

        conn
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_owned(),
            full_name: "Test User".to_owned(),
            password_hash: PasswordHash::new_unchecked("hunter2"),
            avatar_url: None,
        }
    }

    #[test]
    fn insert_user_succeeds() {
        let db_connection = get_db_connection();

        let inserted_user = create_user(new_user("foo@bar.baz"), &db_connection).unwrap();

        assert!(inserted_user.id.as_i64() > 0);
        assert_eq!(inserted_user.email, "foo@bar.baz");
        assert!(inserted_user.is_premium);
    }

    #[test]
    fn insert_user_fails_with_duplicate_email() {
        let db_connection = get_db_connection();
        create_user(new_user("foo@bar.baz"), &db_connection).unwrap();

        let result = create_user(new_user("foo@bar.baz"), &db_connection);

        assert_eq!(result, Err(Error::DuplicateEmail));
    }

    #[test]
    fn get_user_fails_with_unknown_email() {
        let db_connection = get_db_connection();

        assert_eq!(
            get_user_by_email("nobody@bar.baz", &db_connection),
            Err(Error::NotFound)
        );
        assert_eq!(
            find_user_by_email("nobody@bar.baz", &db_connection),
            Ok(None)
        );
    }

    #[test]
    fn get_user_succeeds_with_existing_email() {
        let db_connection = get_db_connection();
        let test_user = create_user(new_user("foo@bar.baz"), &db_connection).unwrap();

        let retrieved_user = get_user_by_email("foo@bar.baz", &db_connection).unwrap();

        assert_eq!(retrieved_user, test_user);
    }

    #[test]
    fn updates_are_persisted() {
        let db_connection = get_db_connection();
        let user = create_user(new_user("foo@bar.baz"), &db_connection).unwrap();

        update_full_name(user.id, "New Name", &db_connection).unwrap();
        update_password(user.id, &PasswordHash::new_unchecked("hunter3"), &db_connection)
            .unwrap();
        update_avatar_url(user.id, "https://img.example/me.png", &db_connection).unwrap();

        let user = get_user_by_email("foo@bar.baz", &db_connection).unwrap();
        assert_eq!(user.full_name, "New Name");
        assert_eq!(user.password_hash, PasswordHash::new_unchecked("hunter3"));
        assert_eq!(user.avatar_url.as_deref(), Some("https://img.example/me.png"));
    }

    #[test]
    fn profile_always_reports_premium() {
        let db_connection = get_db_connection();
        let user = create_user(new_user("foo@bar.baz"), &db_connection).unwrap();
        db_connection
            .execute("UPDATE user SET is_premium = 0", ())
            .unwrap();
        let user_from_db = get_user_by_email(&user.email, &db_connection).unwrap();
        assert!(!user_from_db.is_premium);

        let profile = UserProfile::from(&user_from_db);

        assert!(profile.is_premium);
    }

    #[test]
    fn returns_correct_count() {
        let db_connection = get_db_connection();

        let count = count_users(&db_connection).expect("Could not get user count");
        assert_eq!(0, count, "Want zero users before insertion, got {count}");

        create_user(new_user("foo@bar.baz"), &db_connection).unwrap();

        let count = count_users(&db_connection).expect("Could not get user count");
        assert_eq!(1, count, "Want one user after insertion, got {count}");
    }
}
