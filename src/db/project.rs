/// Project-related database queries.
use anyhow::Result;
use rusqlite::{Connection, Row};

use crate::types::{ClientId, Project, ProjectId, Scope, UserId};

const PROJECT_COLUMNS: &str =
    "id, name, client_id, category, colour, default_rate, organisation_id, user_id, archived";

pub fn create_project(arg: Project, conn: &Connection) -> Result<ProjectId> {
    conn.execute(
        "INSERT INTO projects
            (name, client_id, category, colour, default_rate, is_personal, organisation_id, user_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        (
            arg.name.trim(),
            arg.client_id,
            &arg.category,
            &arg.colour,
            arg.default_rate,
            arg.scope.is_personal(),
            arg.scope.organisation_id(),
            arg.user_id,
        ),
    )?;
    Ok(conn.last_insert_rowid() as ProjectId)
}

/// Non-archived projects of the user within a scope, optionally for one client.
pub fn query_projects(
    user_id: UserId,
    scope: Scope,
    client_id: Option<ClientId>,
    conn: &Connection,
) -> Result<Vec<Project>> {
    let sql = format!(
        "
        SELECT {PROJECT_COLUMNS}
        FROM projects
        WHERE user_id = ?1 AND is_personal = ?2 AND organisation_id IS ?3 AND archived = 0
        AND (?4 IS NULL OR client_id = ?4)
        ORDER BY name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        (user_id, scope.is_personal(), scope.organisation_id(), client_id),
        project_from_row,
    )?;
    let mut projects = Vec::new();
    for row in rows {
        projects.push(row?);
    }
    Ok(projects)
}

pub fn query_project_by_id(id: ProjectId, conn: &Connection) -> Result<Option<Project>> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        Ok(Some(project_from_row(row)?))
    } else {
        Ok(None)
    }
}

pub fn archive_project(id: ProjectId, user_id: UserId, conn: &Connection) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE projects SET archived = 1 WHERE id = ?1 AND user_id = ?2",
        [id, user_id],
    )?;
    Ok(changed > 0)
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        client_id: row.get(2)?,
        category: row.get(3)?,
        colour: row.get(4)?,
        default_rate: row.get(5)?,
        scope: Scope::from_organisation(row.get(6)?),
        user_id: row.get(7)?,
        archived: row.get(8)?,
    })
}
