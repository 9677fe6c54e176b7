/// Tiered hourly-rate resolution.
///
/// The rate for a new time entry comes from the project's newest active rate
/// rule for the user: the highest tier whose weekly-hours threshold has been
/// reached wins, otherwise the rule's base rate. Without a rule the project's
/// default rate applies, and without a project the rate is zero.
///
/// Resolution never fails. Lookup errors are logged and fall back to the same
/// defaults, so billing problems can't block time tracking.
///
/// The weekly sum is read without isolation from concurrent writers, so two
/// entries created at the same moment near a threshold may both get the lower
/// tier.
use anyhow::Result;
use chrono::{DateTime, Local};
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::db;
use crate::types::{Project, ProjectId, RateRule, UserId};
use crate::week::WeekWindow;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Read-only lookups the resolver depends on.
pub trait RateSource {
    fn find_project_by_id(&self, id: ProjectId) -> Result<Option<Project>>;

    /// Most recently created active rule for the project owned by the user.
    fn find_active_rate_rule(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> Result<Option<RateRule>>;

    /// Seconds logged on the project by the user, for entries starting in `[start, end]`.
    fn sum_duration_in_window(
        &self,
        project_id: ProjectId,
        user_id: UserId,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<i64>;
}

impl RateSource for Connection {
    fn find_project_by_id(&self, id: ProjectId) -> Result<Option<Project>> {
        db::query_project_by_id(id, self)
    }

    fn find_active_rate_rule(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> Result<Option<RateRule>> {
        db::query_active_rate_rule(project_id, user_id, self)
    }

    fn sum_duration_in_window(
        &self,
        project_id: ProjectId,
        user_id: UserId,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<i64> {
        db::sum_duration_in_window(project_id, user_id, start, end, self)
    }
}

/// Hourly rate to freeze onto a new entry for this project, user and week.
pub fn resolve_rate<S: RateSource + ?Sized>(
    source: &S,
    project_id: ProjectId,
    user_id: UserId,
    window: &WeekWindow,
) -> f64 {
    let project = match source.find_project_by_id(project_id) {
        Ok(Some(project)) => project,
        Ok(None) => {
            debug!(project_id, "project not found, applying zero rate");
            return 0.0;
        }
        Err(err) => {
            warn!(project_id, error = %err, "project lookup failed, applying zero rate");
            return 0.0;
        }
    };

    let rule = match source.find_active_rate_rule(project_id, user_id) {
        Ok(Some(rule)) => rule,
        Ok(None) => return project.default_rate,
        Err(err) => {
            warn!(project_id, user_id, error = %err, "rate rule lookup failed, applying default rate");
            return project.default_rate;
        }
    };

    let seconds = source
        .sum_duration_in_window(project_id, user_id, window.start, window.end)
        .unwrap_or_else(|err| {
            warn!(project_id, user_id, error = %err, "weekly hours lookup failed, assuming none");
            0
        });
    let weekly_hours = seconds as f64 / SECONDS_PER_HOUR;
    let rate = select_tier(&rule, weekly_hours);
    debug!(project_id, user_id, weekly_hours, rate, "resolved rate from rule");
    rate
}

/// Highest tier reached by `weekly_hours` (threshold inclusive), else the base rate.
pub fn select_tier(rule: &RateRule, weekly_hours: f64) -> f64 {
    let mut conditions: Vec<_> = rule.conditions.iter().collect();
    conditions.sort_by(|a, b| b.weekly_hours_threshold.total_cmp(&a.weekly_hours_threshold));
    conditions
        .into_iter()
        .find(|condition| weekly_hours >= condition.weekly_hours_threshold)
        .map_or(rule.base_rate, |condition| condition.new_rate)
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use chrono::TimeZone;

    use super::*;
    use crate::types::{RateCondition, Scope};

    #[derive(Default)]
    struct FakeSource {
        project: Option<Project>,
        rule: Option<RateRule>,
        seconds: i64,
        fail_project: bool,
        fail_rule: bool,
        fail_sum: bool,
    }

    impl RateSource for FakeSource {
        fn find_project_by_id(&self, _id: ProjectId) -> Result<Option<Project>> {
            if self.fail_project {
                return Err(anyhow!("connection reset"));
            }
            Ok(self.project.clone())
        }

        fn find_active_rate_rule(&self, _: ProjectId, _: UserId) -> Result<Option<RateRule>> {
            if self.fail_rule {
                return Err(anyhow!("connection reset"));
            }
            Ok(self.rule.clone())
        }

        fn sum_duration_in_window(
            &self,
            _: ProjectId,
            _: UserId,
            _: DateTime<Local>,
            _: DateTime<Local>,
        ) -> Result<i64> {
            if self.fail_sum {
                return Err(anyhow!("connection reset"));
            }
            Ok(self.seconds)
        }
    }

    fn project(default_rate: f64) -> Project {
        Project {
            id: Some(1),
            name: "Website".to_string(),
            client_id: 1,
            category: None,
            colour: "#10B981".to_string(),
            default_rate,
            scope: Scope::Personal,
            user_id: 1,
            archived: false,
        }
    }

    fn rule(base_rate: f64, tiers: &[(f64, f64)]) -> RateRule {
        RateRule {
            id: Some(1),
            name: "Overtime".to_string(),
            project_id: 1,
            base_rate,
            conditions: tiers
                .iter()
                .map(|&(weekly_hours_threshold, new_rate)| RateCondition {
                    weekly_hours_threshold,
                    new_rate,
                })
                .collect(),
            is_active: true,
            user_id: 1,
            organisation_id: None,
            created_at: Local::now(),
        }
    }

    fn hours(h: f64) -> i64 {
        (h * 3600.0).round() as i64
    }

    fn window() -> WeekWindow {
        WeekWindow::containing(Local.with_ymd_and_hms(2025, 3, 12, 9, 0, 0).unwrap())
    }

    fn resolve(source: &FakeSource) -> f64 {
        resolve_rate(source, 1, 1, &window())
    }

    #[test]
    fn missing_project_resolves_to_zero() {
        let source = FakeSource {
            rule: Some(rule(75.0, &[])),
            ..Default::default()
        };
        assert_eq!(resolve(&source), 0.0);
    }

    #[test]
    fn no_rule_uses_project_default() {
        let source = FakeSource {
            project: Some(project(50.0)),
            seconds: hours(40.0),
            ..Default::default()
        };
        assert_eq!(resolve(&source), 50.0);
    }

    #[test]
    fn two_tier_rule_over_hour_ranges() {
        let tiers = [(10.0, 100.0), (20.0, 150.0)];
        for (h, expected) in [
            (0.0, 80.0),
            (9.99, 80.0),
            (10.0, 100.0),
            (19.5, 100.0),
            (20.0, 150.0),
            (45.0, 150.0),
        ] {
            let source = FakeSource {
                project: Some(project(50.0)),
                rule: Some(rule(80.0, &tiers)),
                seconds: hours(h),
                ..Default::default()
            };
            assert_eq!(resolve(&source), expected, "at {h} hours");
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        let source = FakeSource {
            project: Some(project(50.0)),
            rule: Some(rule(75.0, &[(22.5, 150.0)])),
            seconds: hours(22.5),
            ..Default::default()
        };
        assert_eq!(resolve(&source), 150.0);
    }

    #[test]
    fn just_below_threshold_uses_base_rate() {
        let source = FakeSource {
            project: Some(project(50.0)),
            rule: Some(rule(75.0, &[(22.5, 150.0)])),
            seconds: hours(22.49),
            ..Default::default()
        };
        assert_eq!(resolve(&source), 75.0);
    }

    #[test]
    fn unsorted_tiers_pick_highest_reached() {
        let source = FakeSource {
            project: Some(project(50.0)),
            rule: Some(rule(75.0, &[(10.0, 100.0), (30.0, 200.0), (20.0, 150.0)])),
            seconds: hours(25.0),
            ..Default::default()
        };
        assert_eq!(resolve(&source), 150.0);
    }

    #[test]
    fn repeated_resolution_is_stable() {
        let source = FakeSource {
            project: Some(project(50.0)),
            rule: Some(rule(75.0, &[(10.0, 100.0)])),
            seconds: hours(12.0),
            ..Default::default()
        };
        assert_eq!(resolve(&source), resolve(&source));
    }

    #[test]
    fn rule_without_conditions_uses_base_rate() {
        let source = FakeSource {
            project: Some(project(50.0)),
            rule: Some(rule(65.0, &[])),
            seconds: hours(100.0),
            ..Default::default()
        };
        assert_eq!(resolve(&source), 65.0);
    }

    #[test]
    fn lookup_failures_degrade() {
        let failing_project = FakeSource {
            project: Some(project(50.0)),
            fail_project: true,
            ..Default::default()
        };
        assert_eq!(resolve(&failing_project), 0.0);

        let failing_rule = FakeSource {
            project: Some(project(50.0)),
            fail_rule: true,
            ..Default::default()
        };
        assert_eq!(resolve(&failing_rule), 50.0);

        let failing_sum = FakeSource {
            project: Some(project(50.0)),
            rule: Some(rule(75.0, &[(0.0, 90.0), (10.0, 100.0)])),
            seconds: hours(12.0),
            fail_sum: true,
            ..Default::default()
        };
        assert_eq!(resolve(&failing_sum), 90.0);
    }

    #[test]
    fn select_tier_leaves_rule_order_untouched() {
        let rule = rule(75.0, &[(10.0, 100.0), (30.0, 200.0), (20.0, 150.0)]);
        assert_eq!(select_tier(&rule, 31.0), 200.0);
        assert_eq!(rule.conditions[0].weekly_hours_threshold, 10.0);
    }
}
