/// Client queries.
use anyhow::Result;
use rusqlite::{Connection, Row};

use crate::types::{Client, ClientId, Scope, UserId};

pub fn create_client(arg: Client, conn: &Connection) -> Result<ClientId> {
    conn.execute(
        "INSERT INTO clients (name, colour, is_personal, organisation_id, user_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            arg.name.trim(),
            &arg.colour,
            arg.scope.is_personal(),
            arg.scope.organisation_id(),
            arg.user_id,
        ),
    )?;
    Ok(conn.last_insert_rowid() as ClientId)
}

/// Non-archived clients of the user within a scope, by name.
pub fn query_clients(user_id: UserId, scope: Scope, conn: &Connection) -> Result<Vec<Client>> {
    let mut stmt = conn.prepare(
        "
        SELECT id, name, colour, organisation_id, user_id, archived
        FROM clients
        WHERE user_id = ?1 AND is_personal = ?2 AND organisation_id IS ?3 AND archived = 0
        ORDER BY name",
    )?;
    let rows = stmt.query_map(
        (user_id, scope.is_personal(), scope.organisation_id()),
        client_from_row,
    )?;
    let mut clients = Vec::new();
    for row in rows {
        clients.push(row?);
    }
    Ok(clients)
}

pub fn query_client_by_id(id: ClientId, conn: &Connection) -> Result<Option<Client>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, colour, organisation_id, user_id, archived FROM clients WHERE id = ?1",
    )?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        Ok(Some(client_from_row(row)?))
    } else {
        Ok(None)
    }
}

pub fn archive_client(id: ClientId, user_id: UserId, conn: &Connection) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE clients SET archived = 1 WHERE id = ?1 AND user_id = ?2",
        [id, user_id],
    )?;
    Ok(changed > 0)
}

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        colour: row.get(2)?,
        scope: Scope::from_organisation(row.get(3)?),
        user_id: row.get(4)?,
        archived: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;

    #[test]
    fn archived_clients_are_hidden() {
        let conn = fixtures::conn();
        let user = fixtures::user(&conn, "ada@example.com");
        let id = fixtures::client(&conn, user);
        assert_eq!(query_clients(user, Scope::Personal, &conn).unwrap().len(), 1);

        assert!(archive_client(id, user, &conn).unwrap());
        assert!(query_clients(user, Scope::Personal, &conn).unwrap().is_empty());
        assert!(query_client_by_id(id, &conn).unwrap().unwrap().archived);
    }

    #[test]
    fn other_users_cannot_archive_a_client() {
        let conn = fixtures::conn();
        let owner = fixtures::user(&conn, "ada@example.com");
        let other = fixtures::user(&conn, "bob@example.com");
        let id = fixtures::client(&conn, owner);

        assert!(!archive_client(id, other, &conn).unwrap());
        assert!(!query_client_by_id(id, &conn).unwrap().unwrap().archived);
    }

    #[test]
    fn clients_are_listed_per_scope() {
        let conn = fixtures::conn();
        let user = fixtures::user(&conn, "ada@example.com");
        fixtures::client(&conn, user);
        assert!(query_clients(user, Scope::Organisation(7), &conn)
            .unwrap()
            .is_empty());
    }
}
