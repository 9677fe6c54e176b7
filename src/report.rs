/// Earnings reports built from stored entries and their frozen rates.
use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Local};
use rusqlite::Connection;
use serde::Serialize;

use crate::db;
use crate::types::{Client, ClientId, EntryFilter, Project, ProjectId, TimeEntry};

const SECONDS_PER_HOUR: f64 = 3600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Project,
    Client,
    Day,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total_duration: i64,
    pub formatted_total_time: String,
    pub total_earnings: f64,
    pub avg_rate: f64,
    pub entry_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakdownRow {
    pub id: String,
    pub name: String,
    pub colour: Option<String>,
    pub duration: i64,
    pub formatted_duration: String,
    pub earnings: f64,
    pub avg_rate: f64,
    pub entry_count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DateSpan {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub range: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub summary: Summary,
    pub breakdown: Vec<BreakdownRow>,
    pub date_range: DateSpan,
    pub group_by: GroupBy,
}

/// Names and colours used to label breakdown rows.
#[derive(Debug, Default)]
pub(crate) struct Labels {
    pub projects: HashMap<ProjectId, Project>,
    pub clients: HashMap<ClientId, Client>,
}

#[derive(Default)]
struct Bucket {
    duration: i64,
    weighted: f64,
    rate_sum: f64,
    count: usize,
}

impl Bucket {
    fn add(&mut self, entry: &TimeEntry) {
        self.duration += entry.duration;
        self.weighted += entry.duration as f64 * entry.applied_rate;
        self.rate_sum += entry.applied_rate;
        self.count += 1;
    }

    fn earnings(&self) -> f64 {
        self.weighted / SECONDS_PER_HOUR
    }

    fn avg_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.rate_sum / self.count as f64
        }
    }
}

/// Loads the filtered entries (the filter must carry a range) and builds the report.
pub(crate) fn load_report(
    filter: &EntryFilter,
    group_by: GroupBy,
    range_label: &str,
    conn: &Connection,
) -> Result<Report> {
    let entries = db::query_time_entries(filter, None, conn)?;
    let mut labels = Labels::default();
    for entry in &entries {
        if !labels.projects.contains_key(&entry.project_id) {
            if let Some(project) = db::query_project_by_id(entry.project_id, conn)? {
                labels.projects.insert(entry.project_id, project);
            }
        }
        if !labels.clients.contains_key(&entry.client_id) {
            if let Some(client) = db::query_client_by_id(entry.client_id, conn)? {
                labels.clients.insert(entry.client_id, client);
            }
        }
    }
    let (summary, breakdown) = build_report(&entries, &labels, group_by);
    let (start, end) = filter.range.unwrap_or_else(|| {
        let now = Local::now();
        (now, now)
    });
    Ok(Report {
        summary,
        breakdown,
        date_range: DateSpan {
            start,
            end,
            range: range_label.to_string(),
        },
        group_by,
    })
}

/// Summarises entries and breaks them down by the grouping, largest first.
pub(crate) fn build_report(
    entries: &[TimeEntry],
    labels: &Labels,
    group_by: GroupBy,
) -> (Summary, Vec<BreakdownRow>) {
    let mut total = Bucket::default();
    let mut groups: HashMap<String, Bucket> = HashMap::new();
    for entry in entries {
        total.add(entry);
        groups.entry(group_key(entry, group_by)).or_default().add(entry);
    }

    let summary = Summary {
        total_duration: total.duration,
        formatted_total_time: format_duration(total.duration),
        total_earnings: round_to(total.earnings(), 2),
        avg_rate: round_to(total.avg_rate(), 2),
        entry_count: total.count,
    };

    let mut breakdown: Vec<BreakdownRow> = groups
        .into_iter()
        .map(|(key, bucket)| {
            let (name, colour) = group_label(&key, group_by, labels);
            let percentage = if total.duration > 0 {
                round_to(bucket.duration as f64 / total.duration as f64 * 100.0, 1)
            } else {
                0.0
            };
            BreakdownRow {
                id: key,
                name,
                colour,
                duration: bucket.duration,
                formatted_duration: format_duration(bucket.duration),
                earnings: round_to(bucket.earnings(), 2),
                avg_rate: round_to(bucket.avg_rate(), 2),
                entry_count: bucket.count,
                percentage,
            }
        })
        .collect();
    breakdown.sort_by(|a, b| b.duration.cmp(&a.duration).then_with(|| a.name.cmp(&b.name)));

    (summary, breakdown)
}

fn group_key(entry: &TimeEntry, group_by: GroupBy) -> String {
    match group_by {
        GroupBy::Project => entry.project_id.to_string(),
        GroupBy::Client => entry.client_id.to_string(),
        GroupBy::Day => entry.start_time.format("%Y-%m-%d").to_string(),
    }
}

fn group_label(key: &str, group_by: GroupBy, labels: &Labels) -> (String, Option<String>) {
    let id = key.parse::<u32>().ok();
    match group_by {
        GroupBy::Project => id
            .and_then(|id| labels.projects.get(&id))
            .map(|p| (p.name.clone(), Some(p.colour.clone())))
            .unwrap_or_else(|| ("Unknown project".to_string(), None)),
        GroupBy::Client => id
            .and_then(|id| labels.clients.get(&id))
            .map(|c| (c.name.clone(), Some(c.colour.clone())))
            .unwrap_or_else(|| ("Unknown client".to_string(), None)),
        GroupBy::Day => (key.to_string(), None),
    }
}

/// `Xh Ym`, truncating seconds.
pub fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    format!("{hours}h {minutes}m")
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
