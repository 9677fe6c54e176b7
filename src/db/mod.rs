/// Database module with user, organisation, client, project, rate rule,
/// time entry and timer queries plus migrations.
mod client;
mod migrations;
mod organisation;
mod project;
mod rate_rule;
mod time_entry;
mod timer;
mod user;

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Local, SecondsFormat, Utc};
use rusqlite::Connection;
use rusqlite::types::Type;
use tracing::debug;

// Re-export all public functions
pub use client::{archive_client, create_client, query_client_by_id, query_clients};
pub use organisation::{
    add_member, create_organisation, query_member_role, query_organisation_by_slug,
    query_organisations_for_user,
};
pub use project::{archive_project, create_project, query_project_by_id, query_projects};
pub use rate_rule::{
    create_rate_rule, deactivate_rate_rule, query_active_rate_rule, query_rate_rules,
};
pub use time_entry::{
    count_time_entries, create_time_entry, query_time_entries, query_time_entry_by_id,
    sum_duration_in_window,
};
pub use timer::{delete_timer, query_timer, start_timer};
pub use user::{create_user, query_user_by_email};

/// Opens (or creates) the SQLite database and runs migrations.
pub fn init(db_path: &str) -> Result<Connection> {
    debug!(path = db_path, "opening database");
    let conn = Connection::open(db_path)?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}

/// Returns the default database path inside the user's data directory.
/// Falls back to `./ratecard.db` when no data dir is found.
pub fn default_db_path() -> String {
    if let Some(data_dir) = dirs::data_local_dir() {
        let dir: PathBuf = data_dir.join("ratecard");
        std::fs::create_dir_all(&dir).ok();
        dir.join("ratecard.db").to_string_lossy().into_owned()
    } else {
        "ratecard.db".to_string()
    }
}

/// Timestamps are stored as UTC RFC 3339 with millisecond precision, so
/// string comparison in SQL matches chronological order.
pub(crate) fn to_db_time(dt: &DateTime<Local>) -> String {
    dt.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_db_time(column: usize, raw: &str) -> rusqlite::Result<DateTime<Local>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err)))
}
