/// Organisation and membership queries.
use anyhow::Result;
use chrono::Local;
use rusqlite::Connection;

use crate::db::to_db_time;
use crate::types::{Organisation, OrganisationId, Role, UserId};

/// Creates the organisation and enrols its owner as an admin.
pub fn create_organisation(arg: Organisation, conn: &Connection) -> Result<OrganisationId> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO organisations (name, slug, owner_id, currency) VALUES (?1, ?2, ?3, ?4)",
        (
            arg.name.trim(),
            arg.slug.trim().to_lowercase(),
            arg.owner_id,
            &arg.currency,
        ),
    )?;
    let id = tx.last_insert_rowid() as OrganisationId;
    add_member(id, arg.owner_id, Role::Admin, &tx)?;
    tx.commit()?;
    Ok(id)
}

pub fn add_member(
    organisation_id: OrganisationId,
    user_id: UserId,
    role: Role,
    conn: &Connection,
) -> Result<()> {
    conn.execute(
        "INSERT INTO organisation_members (organisation_id, user_id, role, joined_at)
         VALUES (?1, ?2, ?3, ?4)",
        (
            organisation_id,
            user_id,
            role.as_str(),
            to_db_time(&Local::now()),
        ),
    )?;
    Ok(())
}

pub fn query_organisation_by_slug(slug: &str, conn: &Connection) -> Result<Option<Organisation>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, slug, owner_id, currency FROM organisations WHERE slug = ?1",
    )?;
    let mut rows = stmt.query([slug.trim().to_lowercase()])?;
    if let Some(row) = rows.next()? {
        Ok(Some(Organisation {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            slug: row.get(2)?,
            owner_id: row.get(3)?,
            currency: row.get(4)?,
        }))
    } else {
        Ok(None)
    }
}

pub fn query_organisations_for_user(
    user_id: UserId,
    conn: &Connection,
) -> Result<Vec<(Organisation, Role)>> {
    let mut stmt = conn.prepare(
        "
        SELECT o.id, o.name, o.slug, o.owner_id, o.currency, m.role
        FROM organisations o
        JOIN organisation_members m ON m.organisation_id = o.id
        WHERE m.user_id = ?1
        ORDER BY o.name",
    )?;
    let rows = stmt.query_map([user_id], |row| {
        let role: String = row.get(5)?;
        Ok((
            Organisation {
                id: Some(row.get(0)?),
                name: row.get(1)?,
                slug: row.get(2)?,
                owner_id: row.get(3)?,
                currency: row.get(4)?,
            },
            Role::parse(&role).unwrap_or(Role::Member),
        ))
    })?;
    let mut organisations = Vec::new();
    for row in rows {
        organisations.push(row?);
    }
    Ok(organisations)
}

pub fn query_member_role(
    organisation_id: OrganisationId,
    user_id: UserId,
    conn: &Connection,
) -> Result<Option<Role>> {
    let mut stmt = conn.prepare(
        "SELECT role FROM organisation_members WHERE organisation_id = ?1 AND user_id = ?2",
    )?;
    let mut rows = stmt.query([organisation_id, user_id])?;
    if let Some(row) = rows.next()? {
        let role: String = row.get(0)?;
        Ok(Role::parse(&role))
    } else {
        Ok(None)
    }
}
