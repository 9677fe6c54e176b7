/// Rate rule queries. Conditions live in their own table, kept in insertion order.
use anyhow::Result;
use rusqlite::{Connection, Row};

use crate::db::{parse_db_time, to_db_time};
use crate::types::{ProjectId, RateCondition, RateRule, RateRuleId, UserId};

const RULE_COLUMNS: &str =
    "id, name, project_id, base_rate, is_active, user_id, organisation_id, created_at";

pub fn create_rate_rule(arg: RateRule, conn: &Connection) -> Result<RateRuleId> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO rate_rules
            (name, project_id, base_rate, is_active, user_id, organisation_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        (
            arg.name.trim(),
            arg.project_id,
            arg.base_rate,
            arg.is_active,
            arg.user_id,
            arg.organisation_id,
            to_db_time(&arg.created_at),
        ),
    )?;
    let rule_id = tx.last_insert_rowid() as RateRuleId;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO rate_conditions (rule_id, position, weekly_hours_threshold, new_rate)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (position, condition) in arg.conditions.iter().enumerate() {
            stmt.execute((
                rule_id,
                position as i64,
                condition.weekly_hours_threshold,
                condition.new_rate,
            ))?;
        }
    }
    tx.commit()?;
    Ok(rule_id)
}

/// The most recently created active rule for this project and user.
/// Rules created in the same millisecond are ordered by id.
pub fn query_active_rate_rule(
    project_id: ProjectId,
    user_id: UserId,
    conn: &Connection,
) -> Result<Option<RateRule>> {
    let sql = format!(
        "
        SELECT {RULE_COLUMNS}
        FROM rate_rules
        WHERE project_id = ?1 AND user_id = ?2 AND is_active = 1
        ORDER BY created_at DESC, id DESC
        LIMIT 1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([project_id, user_id])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let mut rule = rule_from_row(row)?;
    if let Some(id) = rule.id {
        rule.conditions = query_conditions(id, conn)?;
    }
    Ok(Some(rule))
}

/// All rules (active or not) for a project and user, newest first.
pub fn query_rate_rules(
    project_id: ProjectId,
    user_id: UserId,
    conn: &Connection,
) -> Result<Vec<RateRule>> {
    let sql = format!(
        "
        SELECT {RULE_COLUMNS}
        FROM rate_rules
        WHERE project_id = ?1 AND user_id = ?2
        ORDER BY created_at DESC, id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([project_id, user_id], rule_from_row)?;
    let mut rules = Vec::new();
    for row in rows {
        rules.push(row?);
    }
    for rule in &mut rules {
        if let Some(id) = rule.id {
            rule.conditions = query_conditions(id, conn)?;
        }
    }
    Ok(rules)
}

/// Deactivates one of the user's rules. Returns false if the user has no such rule.
pub fn deactivate_rate_rule(id: RateRuleId, user_id: UserId, conn: &Connection) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE rate_rules SET is_active = 0 WHERE id = ?1 AND user_id = ?2",
        [id, user_id],
    )?;
    Ok(changed > 0)
}

fn query_conditions(rule_id: RateRuleId, conn: &Connection) -> Result<Vec<RateCondition>> {
    let mut stmt = conn.prepare(
        "SELECT weekly_hours_threshold, new_rate FROM rate_conditions
         WHERE rule_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map([rule_id], |row| {
        Ok(RateCondition {
            weekly_hours_threshold: row.get(0)?,
            new_rate: row.get(1)?,
        })
    })?;
    let mut conditions = Vec::new();
    for row in rows {
        conditions.push(row?);
    }
    Ok(conditions)
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<RateRule> {
    let created_at: String = row.get(7)?;
    Ok(RateRule {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        project_id: row.get(2)?,
        base_rate: row.get(3)?,
        conditions: Vec::new(),
        is_active: row.get(4)?,
        user_id: row.get(5)?,
        organisation_id: row.get(6)?,
        created_at: parse_db_time(7, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local};

    use super::*;
    use crate::db::fixtures;

    fn rule(project_id: ProjectId, user_id: UserId, base_rate: f64, age_minutes: i64) -> RateRule {
        RateRule {
            id: None,
            name: format!("rule {base_rate}"),
            project_id,
            base_rate,
            conditions: vec![
                RateCondition {
                    weekly_hours_threshold: 20.0,
                    new_rate: 150.0,
                },
                RateCondition {
                    weekly_hours_threshold: 10.0,
                    new_rate: 100.0,
                },
            ],
            is_active: true,
            user_id,
            organisation_id: None,
            created_at: Local::now() - Duration::minutes(age_minutes),
        }
    }

    #[test]
    fn newest_active_rule_wins() {
        let conn = fixtures::conn();
        let user = fixtures::user(&conn, "ada@example.com");
        let client = fixtures::client(&conn, user);
        let project = fixtures::project(&conn, user, client, 50.0);

        create_rate_rule(rule(project, user, 60.0, 30), &conn).unwrap();
        let newest = create_rate_rule(rule(project, user, 75.0, 5), &conn).unwrap();
        create_rate_rule(rule(project, user, 70.0, 60), &conn).unwrap();

        let active = query_active_rate_rule(project, user, &conn).unwrap().unwrap();
        assert_eq!(active.id, Some(newest));
        assert_eq!(active.base_rate, 75.0);
        assert_eq!(active.conditions.len(), 2);
        assert_eq!(active.conditions[0].weekly_hours_threshold, 20.0);
    }

    #[test]
    fn inactive_rules_are_skipped() {
        let conn = fixtures::conn();
        let user = fixtures::user(&conn, "ada@example.com");
        let client = fixtures::client(&conn, user);
        let project = fixtures::project(&conn, user, client, 50.0);

        let older = create_rate_rule(rule(project, user, 60.0, 30), &conn).unwrap();
        let newer = create_rate_rule(rule(project, user, 75.0, 5), &conn).unwrap();
        assert!(deactivate_rate_rule(newer, user, &conn).unwrap());

        let active = query_active_rate_rule(project, user, &conn).unwrap().unwrap();
        assert_eq!(active.id, Some(older));

        deactivate_rate_rule(older, user, &conn).unwrap();
        assert!(query_active_rate_rule(project, user, &conn).unwrap().is_none());
        assert_eq!(query_rate_rules(project, user, &conn).unwrap().len(), 2);
    }

    #[test]
    fn same_millisecond_rules_prefer_highest_id() {
        let conn = fixtures::conn();
        let user = fixtures::user(&conn, "ada@example.com");
        let client = fixtures::client(&conn, user);
        let project = fixtures::project(&conn, user, client, 50.0);

        let first = rule(project, user, 60.0, 0);
        let mut second = rule(project, user, 90.0, 0);
        second.created_at = first.created_at;
        create_rate_rule(first, &conn).unwrap();
        let later = create_rate_rule(second, &conn).unwrap();

        let active = query_active_rate_rule(project, user, &conn).unwrap().unwrap();
        assert_eq!(active.id, Some(later));
        assert_eq!(active.base_rate, 90.0);
    }

    #[test]
    fn only_the_owner_can_deactivate_a_rule() {
        let conn = fixtures::conn();
        let owner = fixtures::user(&conn, "ada@example.com");
        let other = fixtures::user(&conn, "bob@example.com");
        let client = fixtures::client(&conn, owner);
        let project = fixtures::project(&conn, owner, client, 50.0);
        let id = create_rate_rule(rule(project, owner, 80.0, 5), &conn).unwrap();

        assert!(!deactivate_rate_rule(id, other, &conn).unwrap());
        let active = query_active_rate_rule(project, owner, &conn).unwrap().unwrap();
        assert_eq!(active.id, Some(id));
        assert_eq!(crate::rate::resolve_rate(&conn, project, owner, &week_of_now()), 80.0);

        assert!(deactivate_rate_rule(id, owner, &conn).unwrap());
        assert_eq!(crate::rate::resolve_rate(&conn, project, owner, &week_of_now()), 50.0);
    }

    fn week_of_now() -> crate::week::WeekWindow {
        crate::week::WeekWindow::containing(Local::now())
    }

    #[test]
    fn rules_are_scoped_per_user() {
        let conn = fixtures::conn();
        let owner = fixtures::user(&conn, "ada@example.com");
        let other = fixtures::user(&conn, "bob@example.com");
        let client = fixtures::client(&conn, owner);
        let project = fixtures::project(&conn, owner, client, 50.0);

        create_rate_rule(rule(project, owner, 75.0, 5), &conn).unwrap();
        assert!(query_active_rate_rule(project, other, &conn).unwrap().is_none());
    }
}
