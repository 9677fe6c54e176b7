/// Database migrations and schema management.
use anyhow::Result;
use rusqlite::Connection;

/// Creates the schema if it doesn't exist yet.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT    NOT NULL,
            email       TEXT    NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS organisations (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT    NOT NULL,
            slug        TEXT    NOT NULL UNIQUE,
            owner_id    INTEGER NOT NULL,
            currency    TEXT    NOT NULL DEFAULT 'GBP',
            FOREIGN KEY (owner_id) REFERENCES users(id)
        );

        CREATE TABLE IF NOT EXISTS organisation_members (
            organisation_id INTEGER NOT NULL,
            user_id         INTEGER NOT NULL,
            role            TEXT    NOT NULL DEFAULT 'member',
            joined_at       TEXT    NOT NULL,
            PRIMARY KEY (organisation_id, user_id),
            FOREIGN KEY (organisation_id) REFERENCES organisations(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES users(id)
        );

        CREATE TABLE IF NOT EXISTS clients (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT    NOT NULL,
            colour          TEXT    NOT NULL DEFAULT '#3B82F6',
            is_personal     INTEGER NOT NULL DEFAULT 1,
            organisation_id INTEGER,
            user_id         INTEGER NOT NULL,
            archived        INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (organisation_id) REFERENCES organisations(id),
            FOREIGN KEY (user_id) REFERENCES users(id)
        );

        CREATE TABLE IF NOT EXISTS projects (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT    NOT NULL,
            client_id       INTEGER NOT NULL,
            category        TEXT,
            colour          TEXT    NOT NULL DEFAULT '#10B981',
            default_rate    REAL    NOT NULL DEFAULT 0 CHECK (default_rate >= 0),
            is_personal     INTEGER NOT NULL DEFAULT 1,
            organisation_id INTEGER,
            user_id         INTEGER NOT NULL,
            archived        INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (client_id) REFERENCES clients(id),
            FOREIGN KEY (organisation_id) REFERENCES organisations(id),
            FOREIGN KEY (user_id) REFERENCES users(id)
        );

        CREATE TABLE IF NOT EXISTS rate_rules (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT    NOT NULL,
            project_id      INTEGER NOT NULL,
            base_rate       REAL    NOT NULL CHECK (base_rate >= 0),
            is_active       INTEGER NOT NULL DEFAULT 1,
            user_id         INTEGER NOT NULL,
            organisation_id INTEGER,
            created_at      TEXT    NOT NULL,
            FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES users(id)
        );

        CREATE TABLE IF NOT EXISTS rate_conditions (
            id                     INTEGER PRIMARY KEY AUTOINCREMENT,
            rule_id                INTEGER NOT NULL,
            position               INTEGER NOT NULL,
            weekly_hours_threshold REAL    NOT NULL CHECK (weekly_hours_threshold >= 0),
            new_rate               REAL    NOT NULL CHECK (new_rate >= 0),
            FOREIGN KEY (rule_id) REFERENCES rate_rules(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS time_entries (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            description     TEXT    NOT NULL,
            start_time      TEXT    NOT NULL,
            end_time        TEXT,
            duration        INTEGER NOT NULL CHECK (duration >= 0),
            project_id      INTEGER NOT NULL,
            client_id       INTEGER NOT NULL,
            applied_rate    REAL    NOT NULL DEFAULT 0 CHECK (applied_rate >= 0),
            is_personal     INTEGER NOT NULL DEFAULT 1,
            organisation_id INTEGER,
            user_id         INTEGER NOT NULL,
            created_at      TEXT    NOT NULL,
            FOREIGN KEY (project_id) REFERENCES projects(id),
            FOREIGN KEY (client_id) REFERENCES clients(id),
            FOREIGN KEY (user_id) REFERENCES users(id)
        );

        CREATE TABLE IF NOT EXISTS timers (
            user_id         INTEGER PRIMARY KEY,
            description     TEXT    NOT NULL,
            project_id      INTEGER NOT NULL,
            client_id       INTEGER NOT NULL,
            is_personal     INTEGER NOT NULL DEFAULT 1,
            organisation_id INTEGER,
            started_at      TEXT    NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id),
            FOREIGN KEY (project_id) REFERENCES projects(id)
        );

        CREATE INDEX IF NOT EXISTS idx_rate_rules_project_active
            ON rate_rules (project_id, is_active);
        CREATE INDEX IF NOT EXISTS idx_time_entries_project_user_start
            ON time_entries (project_id, user_id, start_time);
        CREATE INDEX IF NOT EXISTS idx_time_entries_user_scope
            ON time_entries (user_id, is_personal, organisation_id);
        ",
    )?;
    Ok(())
}
