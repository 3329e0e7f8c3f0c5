use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::Database;
use crate::models::UserRow;

const USER_COLUMNS: &str =
    "id, email, password, display_name, photo_url, business_name, created_at";

impl Database {
    /// Insert a new user. Returns false if the email (or id) is already taken.
    pub fn create_user(&self, user: &UserRow) -> Result<bool> {
        self.with_conn(|conn| {
            let result = conn.execute(
                "INSERT INTO users (id, email, password, display_name, photo_url, business_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    user.id,
                    user.email,
                    user.password,
                    user.display_name,
                    user.photo_url,
                    user.business_name,
                    user.created_at,
                ],
            );
            match result {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let row = conn.query_row(&sql, [value], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        display_name: row.get(3)?,
        photo_url: row.get(4)?,
        business_name: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::user;

    #[test]
    fn lookup_by_email_and_id() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.create_user(&user("u1", "a@example.com")).unwrap());

        let by_email = db.get_user_by_email("a@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, "u1");
        assert_eq!(by_email.business_name.as_deref(), Some("Shop"));

        assert!(db.get_user_by_id("u1").unwrap().is_some());
        assert!(db.get_user_by_id("nobody").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.create_user(&user("u1", "a@example.com")).unwrap());
        assert!(!db.create_user(&user("u2", "a@example.com")).unwrap());
        assert!(db.get_user_by_id("u2").unwrap().is_none());
    }
}
