/// Running timer queries. A user has at most one running timer.
use anyhow::Result;
use rusqlite::Connection;

use crate::db::{parse_db_time, to_db_time};
use crate::types::{Scope, Timer, UserId};

pub fn start_timer(arg: &Timer, conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT INTO timers
            (user_id, description, project_id, client_id, is_personal, organisation_id, started_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        (
            arg.user_id,
            arg.description.trim(),
            arg.project_id,
            arg.client_id,
            arg.scope.is_personal(),
            arg.scope.organisation_id(),
            to_db_time(&arg.started_at),
        ),
    )?;
    Ok(())
}

pub fn query_timer(user_id: UserId, conn: &Connection) -> Result<Option<Timer>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, description, project_id, client_id, organisation_id, started_at
         FROM timers WHERE user_id = ?1",
    )?;
    let mut rows = stmt.query([user_id])?;
    if let Some(row) = rows.next()? {
        let started_at: String = row.get(5)?;
        Ok(Some(Timer {
            user_id: row.get(0)?,
            description: row.get(1)?,
            project_id: row.get(2)?,
            client_id: row.get(3)?,
            scope: Scope::from_organisation(row.get(4)?),
            started_at: parse_db_time(5, &started_at)?,
        }))
    } else {
        Ok(None)
    }
}

pub fn delete_timer(user_id: UserId, conn: &Connection) -> Result<bool> {
    let changed = conn.execute("DELETE FROM timers WHERE user_id = ?1", [user_id])?;
    Ok(changed > 0)
}
