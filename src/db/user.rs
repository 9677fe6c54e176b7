/// User queries.
use anyhow::Result;
use rusqlite::Connection;

use crate::types::{User, UserId};

/// Emails are stored trimmed and lowercased.
pub fn create_user(arg: User, conn: &Connection) -> Result<UserId> {
    conn.execute(
        "INSERT INTO users (name, email) VALUES (?1, ?2)",
        (arg.name.trim(), normalize_email(&arg.email)),
    )?;
    Ok(conn.last_insert_rowid() as UserId)
}

pub fn query_user_by_email(email: &str, conn: &Connection) -> Result<Option<User>> {
    let mut stmt = conn.prepare("SELECT id, name, email FROM users WHERE email = ?1")?;
    let mut rows = stmt.query([normalize_email(email)])?;
    if let Some(row) = rows.next()? {
        Ok(Some(User {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            email: row.get(2)?,
        }))
    } else {
        Ok(None)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
