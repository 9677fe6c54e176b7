/// Time entry queries.
///
/// There is deliberately no update path: `applied_rate` is written once on insert.
use anyhow::Result;
use chrono::{DateTime, Local};
use rusqlite::{Connection, Row};

use crate::db::{parse_db_time, to_db_time};
use crate::types::{EntryFilter, ProjectId, Scope, TimeEntry, TimeEntryId, UserId};

const ENTRY_COLUMNS: &str = "id, description, start_time, end_time, duration, project_id, \
     client_id, applied_rate, organisation_id, user_id, created_at";

const FILTER_CLAUSE: &str = "
    WHERE user_id = ?1 AND is_personal = ?2 AND organisation_id IS ?3
    AND (?4 IS NULL OR project_id = ?4)
    AND (?5 IS NULL OR client_id = ?5)
    AND (?6 IS NULL OR start_time >= ?6)
    AND (?7 IS NULL OR start_time <= ?7)";

pub fn create_time_entry(arg: TimeEntry, conn: &Connection) -> Result<TimeEntryId> {
    conn.execute(
        "INSERT INTO time_entries
            (description, start_time, end_time, duration, project_id, client_id,
             applied_rate, is_personal, organisation_id, user_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        (
            arg.description.trim(),
            to_db_time(&arg.start_time),
            arg.end_time.as_ref().map(to_db_time),
            arg.duration,
            arg.project_id,
            arg.client_id,
            arg.applied_rate,
            arg.scope.is_personal(),
            arg.scope.organisation_id(),
            arg.user_id,
            to_db_time(&arg.created_at),
        ),
    )?;
    Ok(conn.last_insert_rowid() as TimeEntryId)
}

pub fn query_time_entry_by_id(id: TimeEntryId, conn: &Connection) -> Result<Option<TimeEntry>> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM time_entries WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        Ok(Some(entry_from_row(row)?))
    } else {
        Ok(None)
    }
}

/// Entries matching the filter, newest first. `page` is 1-based; `None`
/// returns every match.
pub fn query_time_entries(
    filter: &EntryFilter,
    page: Option<(u32, u32)>,
    conn: &Connection,
) -> Result<Vec<TimeEntry>> {
    let (limit, offset) = match page {
        Some((page, limit)) => (
            i64::from(limit),
            i64::from(page.saturating_sub(1)) * i64::from(limit),
        ),
        None => (-1, 0),
    };
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM time_entries {FILTER_CLAUSE}
         ORDER BY start_time DESC, id DESC LIMIT ?8 OFFSET ?9"
    );
    let (start, end) = range_params(filter);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        (
            filter.user_id,
            filter.scope.is_personal(),
            filter.scope.organisation_id(),
            filter.project_id,
            filter.client_id,
            start,
            end,
            limit,
            offset,
        ),
        entry_from_row,
    )?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

pub fn count_time_entries(filter: &EntryFilter, conn: &Connection) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM time_entries {FILTER_CLAUSE}");
    let (start, end) = range_params(filter);
    let count: i64 = conn.query_row(
        &sql,
        (
            filter.user_id,
            filter.scope.is_personal(),
            filter.scope.organisation_id(),
            filter.project_id,
            filter.client_id,
            start,
            end,
        ),
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Total seconds logged by the user on the project for entries starting
/// within `[start, end]`, across every scope.
pub fn sum_duration_in_window(
    project_id: ProjectId,
    user_id: UserId,
    start: DateTime<Local>,
    end: DateTime<Local>,
    conn: &Connection,
) -> Result<i64> {
    let total: i64 = conn.query_row(
        "
        SELECT COALESCE(SUM(duration), 0)
        FROM time_entries
        WHERE project_id = ?1 AND user_id = ?2
        AND start_time >= ?3 AND start_time <= ?4",
        (project_id, user_id, to_db_time(&start), to_db_time(&end)),
        |row| row.get(0),
    )?;
    Ok(total)
}

fn range_params(filter: &EntryFilter) -> (Option<String>, Option<String>) {
    match &filter.range {
        Some((start, end)) => (Some(to_db_time(start)), Some(to_db_time(end))),
        None => (None, None),
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<TimeEntry> {
    let start_time: String = row.get(2)?;
    let end_time: Option<String> = row.get(3)?;
    let created_at: String = row.get(10)?;
    Ok(TimeEntry {
        id: Some(row.get(0)?),
        description: row.get(1)?,
        start_time: parse_db_time(2, &start_time)?,
        end_time: end_time.map(|raw| parse_db_time(3, &raw)).transpose()?,
        duration: row.get(4)?,
        project_id: row.get(5)?,
        client_id: row.get(6)?,
        applied_rate: row.get(7)?,
        scope: Scope::from_organisation(row.get(8)?),
        user_id: row.get(9)?,
        created_at: parse_db_time(10, &created_at)?,
    })
}
