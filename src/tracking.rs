/// Time entry creation and the running timer.
use anyhow::Result;
use chrono::{DateTime, Duration, Local};
use rusqlite::Connection;
use tracing::info;

use crate::db;
use crate::error::RatecardError;
use crate::rate::resolve_rate;
use crate::types::{ClientId, ProjectId, Scope, TimeEntry, Timer, UserId};
use crate::week::WeekWindow;

/// Input for a new time entry. Either `end` or a positive `duration` must be
/// given; `client_id` falls back to the project's client.
#[derive(Clone, Debug)]
pub struct NewTimeEntry {
    pub description: String,
    pub start: DateTime<Local>,
    pub end: Option<DateTime<Local>>,
    pub duration: Option<i64>,
    pub project_id: ProjectId,
    pub client_id: Option<ClientId>,
    pub scope: Scope,
}

/// Validates the entry, freezes the applicable hourly rate onto it and stores it.
pub fn record_entry(
    user_id: UserId,
    new: NewTimeEntry,
    now: DateTime<Local>,
    conn: &Connection,
) -> Result<TimeEntry> {
    let description = new.description.trim().to_string();
    if description.is_empty() {
        return Err(RatecardError::MissingField("description").into());
    }
    let duration = new.duration.filter(|seconds| *seconds != 0);
    if duration.is_some_and(|seconds| seconds < 0) {
        return Err(RatecardError::EndBeforeStart.into());
    }
    let end = match (new.end, duration) {
        (Some(end), _) => end,
        (None, Some(seconds)) => Duration::try_seconds(seconds)
            .and_then(|delta| new.start.checked_add_signed(delta))
            .ok_or_else(|| RatecardError::InvalidDuration(format!("{seconds}s")))?,
        (None, None) => return Err(RatecardError::MissingField("end or duration").into()),
    };
    if end < new.start {
        return Err(RatecardError::EndBeforeStart.into());
    }
    let duration = duration.unwrap_or_else(|| (end - new.start).num_seconds());

    let client_id = match new.client_id {
        Some(id) => id,
        None => db::query_project_by_id(new.project_id, conn)?
            .map(|project| project.client_id)
            .ok_or(RatecardError::MissingField("client"))?,
    };

    let window = WeekWindow::containing(new.start);
    let applied_rate = resolve_rate(conn, new.project_id, user_id, &window);

    let mut entry = TimeEntry {
        id: None,
        description,
        start_time: new.start,
        end_time: Some(end),
        duration,
        project_id: new.project_id,
        client_id,
        applied_rate,
        scope: new.scope,
        user_id,
        created_at: now,
    };
    let id = db::create_time_entry(entry.clone(), conn)?;
    entry = db::query_time_entry_by_id(id, conn)?.unwrap_or(TimeEntry {
        id: Some(id),
        ..entry
    });
    info!(
        entry_id = entry.id,
        project_id = entry.project_id,
        duration = entry.duration,
        applied_rate,
        "recorded time entry"
    );
    Ok(entry)
}

/// Starts a timer for the user. Only one timer may run at a time.
pub fn start_timer(
    user_id: UserId,
    description: String,
    project_id: ProjectId,
    scope: Scope,
    now: DateTime<Local>,
    conn: &Connection,
) -> Result<Timer> {
    if let Some(running) = db::query_timer(user_id, conn)? {
        return Err(RatecardError::TimerRunning(running.description).into());
    }
    let description = description.trim().to_string();
    if description.is_empty() {
        return Err(RatecardError::MissingField("description").into());
    }
    let project = db::query_project_by_id(project_id, conn)?
        .ok_or(RatecardError::ProjectNotFound(project_id))?;
    let timer = Timer {
        user_id,
        description,
        project_id,
        client_id: project.client_id,
        scope,
        started_at: now,
    };
    db::start_timer(&timer, conn)?;
    info!(user_id, project_id, "timer started");
    Ok(timer)
}

/// Stops the running timer and records it as an entry ending at `now`.
pub fn stop_timer(user_id: UserId, now: DateTime<Local>, conn: &Connection) -> Result<TimeEntry> {
    let timer = db::query_timer(user_id, conn)?.ok_or(RatecardError::NoRunningTimer)?;
    let tx = conn.unchecked_transaction()?;
    let entry = record_entry(
        user_id,
        NewTimeEntry {
            description: timer.description,
            start: timer.started_at,
            end: Some(now.max(timer.started_at)),
            duration: None,
            project_id: timer.project_id,
            client_id: Some(timer.client_id),
            scope: timer.scope,
        },
        now,
        &tx,
    )?;
    db::delete_timer(user_id, &tx)?;
    tx.commit()?;
    Ok(entry)
}

/// Drops the running timer without recording anything.
pub fn discard_timer(user_id: UserId, conn: &Connection) -> Result<()> {
    if !db::delete_timer(user_id, conn)? {
        return Err(RatecardError::NoRunningTimer.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::db::fixtures;
    use crate::types::{RateCondition, RateRule};

    fn at(d: u32, h: u32) -> DateTime<Local> {
        // March 2025: the 9th is a Sunday, the 15th a Saturday.
        Local.with_ymd_and_hms(2025, 3, d, h, 0, 0).unwrap()
    }

    fn new_entry(project_id: ProjectId, start: DateTime<Local>, hours: i64) -> NewTimeEntry {
        NewTimeEntry {
            description: "Build feature".to_string(),
            start,
            end: None,
            duration: Some(hours * 3600),
            project_id,
            client_id: None,
            scope: Scope::Personal,
        }
    }

    fn add_rule(conn: &Connection, project_id: ProjectId, user_id: UserId, base: f64, tiers: &[(f64, f64)]) {
        db::create_rate_rule(
            RateRule {
                id: None,
                name: "Weekly".to_string(),
                project_id,
                base_rate: base,
                conditions: tiers
                    .iter()
                    .map(|&(weekly_hours_threshold, new_rate)| RateCondition {
                        weekly_hours_threshold,
                        new_rate,
                    })
                    .collect(),
                is_active: true,
                user_id,
                organisation_id: None,
                created_at: Local::now(),
            },
            conn,
        )
        .unwrap();
    }

    struct Setup {
        conn: Connection,
        user: UserId,
        project: ProjectId,
    }

    fn setup(default_rate: f64) -> Setup {
        let conn = fixtures::conn();
        let user = fixtures::user(&conn, "ada@example.com");
        let client = fixtures::client(&conn, user);
        let project = fixtures::project(&conn, user, client, default_rate);
        Setup { conn, user, project }
    }

    #[test]
    fn default_rate_applies_without_rule() {
        let s = setup(50.0);
        let entry = record_entry(s.user, new_entry(s.project, at(10, 9), 2), at(10, 11), &s.conn).unwrap();
        assert_eq!(entry.applied_rate, 50.0);
        assert_eq!(entry.duration, 7200);
        assert_eq!(entry.end_time, Some(at(10, 11)));

        let stored = db::query_time_entry_by_id(entry.id.unwrap(), &s.conn).unwrap().unwrap();
        assert_eq!(stored.applied_rate, 50.0);
    }

    #[test]
    fn tier_kicks_in_once_week_reaches_threshold() {
        let s = setup(50.0);
        add_rule(&s.conn, s.project, s.user, 75.0, &[(10.0, 100.0), (20.0, 150.0)]);

        let first = record_entry(s.user, new_entry(s.project, at(10, 8), 10), at(10, 18), &s.conn).unwrap();
        assert_eq!(first.applied_rate, 75.0);

        let second = record_entry(s.user, new_entry(s.project, at(11, 8), 10), at(11, 18), &s.conn).unwrap();
        assert_eq!(second.applied_rate, 100.0);

        let third = record_entry(s.user, new_entry(s.project, at(12, 8), 1), at(12, 9), &s.conn).unwrap();
        assert_eq!(third.applied_rate, 150.0);
    }

    #[test]
    fn previous_week_hours_do_not_count() {
        let s = setup(50.0);
        add_rule(&s.conn, s.project, s.user, 75.0, &[(10.0, 100.0)]);
        // Saturday the 8th belongs to the previous week.
        record_entry(s.user, new_entry(s.project, at(8, 8), 12), at(8, 20), &s.conn).unwrap();
        let entry = record_entry(s.user, new_entry(s.project, at(9, 8), 1), at(9, 9), &s.conn).unwrap();
        assert_eq!(entry.applied_rate, 75.0);
    }

    #[test]
    fn applied_rate_is_frozen_after_rule_changes() {
        let s = setup(50.0);
        let entry = record_entry(s.user, new_entry(s.project, at(10, 9), 1), at(10, 10), &s.conn).unwrap();
        add_rule(&s.conn, s.project, s.user, 300.0, &[]);

        let stored = db::query_time_entry_by_id(entry.id.unwrap(), &s.conn).unwrap().unwrap();
        assert_eq!(stored.applied_rate, 50.0);

        let later = record_entry(s.user, new_entry(s.project, at(10, 11), 1), at(10, 12), &s.conn).unwrap();
        assert_eq!(later.applied_rate, 300.0);
    }

    #[test]
    fn missing_project_records_zero_rate_when_client_given() {
        let s = setup(50.0);
        let mut new = new_entry(999, at(10, 9), 1);
        new.client_id = Some(1);
        let entry = record_entry(s.user, new, at(10, 10), &s.conn).unwrap();
        assert_eq!(entry.applied_rate, 0.0);
    }

    #[test]
    fn end_time_derives_duration() {
        let s = setup(50.0);
        let mut new = new_entry(s.project, at(10, 9), 0);
        new.duration = None;
        new.end = Some(at(10, 9) + Duration::seconds(5400));
        let entry = record_entry(s.user, new, at(10, 11), &s.conn).unwrap();
        assert_eq!(entry.duration, 5400);
    }

    #[test]
    fn invalid_entries_are_rejected() {
        let s = setup(50.0);

        let mut blank = new_entry(s.project, at(10, 9), 1);
        blank.description = "   ".to_string();
        assert!(record_entry(s.user, blank, at(10, 10), &s.conn).is_err());

        let mut open = new_entry(s.project, at(10, 9), 0);
        open.duration = None;
        assert!(record_entry(s.user, open, at(10, 10), &s.conn).is_err());

        let mut backwards = new_entry(s.project, at(10, 9), 0);
        backwards.end = Some(at(10, 8));
        assert!(record_entry(s.user, backwards, at(10, 10), &s.conn).is_err());
    }

    #[test]
    fn oversized_duration_is_an_error() {
        let s = setup(50.0);
        for seconds in [i64::MAX / 2, i64::MAX] {
            let mut huge = new_entry(s.project, at(10, 9), 0);
            huge.duration = Some(seconds);
            let err = record_entry(s.user, huge, at(10, 10), &s.conn).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<RatecardError>(),
                Some(RatecardError::InvalidDuration(_))
            ));
        }
        let filter = crate::types::EntryFilter::new(s.user, Scope::Personal);
        assert_eq!(db::count_time_entries(&filter, &s.conn).unwrap(), 0);
    }

    #[test]
    fn saturday_last_millisecond_counts_toward_its_week() {
        let s = setup(50.0);
        add_rule(&s.conn, s.project, s.user, 75.0, &[(10.0, 100.0)]);
        let last_ms = Local.with_ymd_and_hms(2025, 3, 15, 23, 59, 59).unwrap()
            + Duration::milliseconds(999);

        let late = record_entry(s.user, new_entry(s.project, last_ms, 10), at(16, 10), &s.conn).unwrap();
        assert_eq!(late.applied_rate, 75.0);
        assert_eq!(late.start_time, last_ms);

        let midweek = record_entry(s.user, new_entry(s.project, at(12, 9), 1), at(12, 10), &s.conn).unwrap();
        assert_eq!(midweek.applied_rate, 100.0);

        let next_week = record_entry(s.user, new_entry(s.project, at(16, 9), 1), at(16, 10), &s.conn).unwrap();
        assert_eq!(next_week.applied_rate, 75.0);
    }

    #[test]
    fn timer_round_trip_records_entry() {
        let s = setup(40.0);
        start_timer(s.user, "Review".to_string(), s.project, Scope::Personal, at(10, 9), &s.conn).unwrap();
        assert!(start_timer(s.user, "Again".to_string(), s.project, Scope::Personal, at(10, 9), &s.conn).is_err());

        let entry = stop_timer(s.user, at(10, 11), &s.conn).unwrap();
        assert_eq!(entry.duration, 7200);
        assert_eq!(entry.applied_rate, 40.0);
        assert_eq!(entry.description, "Review");
        assert!(db::query_timer(s.user, &s.conn).unwrap().is_none());
        assert!(stop_timer(s.user, at(10, 12), &s.conn).is_err());
    }

    #[test]
    fn discard_drops_timer_without_entry() {
        let s = setup(40.0);
        start_timer(s.user, "Review".to_string(), s.project, Scope::Personal, at(10, 9), &s.conn).unwrap();
        discard_timer(s.user, &s.conn).unwrap();
        let filter = crate::types::EntryFilter::new(s.user, Scope::Personal);
        assert_eq!(db::count_time_entries(&filter, &s.conn).unwrap(), 0);
        assert!(discard_timer(s.user, &s.conn).is_err());
    }
}
