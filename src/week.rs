/// Calendar windows: the Sunday-to-Saturday billing week and report ranges.
use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveTime, TimeZone};

use crate::error::RatecardError;

/// The local calendar week (Sunday 00:00:00.000 to Saturday 23:59:59.999)
/// containing a timestamp. Not an ISO week.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeekWindow {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
}

impl WeekWindow {
    pub fn containing(ts: DateTime<Local>) -> Self {
        let sunday = week_sunday(ts.date_naive());
        let saturday = sunday + Days::new(6);
        Self {
            start: start_of_day(sunday),
            end: end_of_day(saturday),
        }
    }
}

/// Named report span as given on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RangeKind {
    Today,
    #[default]
    Week,
    Month,
    Custom,
}

/// Date span a report covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportRange {
    Today,
    Week,
    Month,
    Custom(NaiveDate, NaiveDate),
}

impl ReportRange {
    pub fn new(
        kind: RangeKind,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Self, RatecardError> {
        match kind {
            RangeKind::Today => Ok(ReportRange::Today),
            RangeKind::Week => Ok(ReportRange::Week),
            RangeKind::Month => Ok(ReportRange::Month),
            RangeKind::Custom => match (from, to) {
                (Some(from), Some(to)) => Ok(ReportRange::Custom(from, to)),
                _ => Err(RatecardError::InvalidDateRange(
                    "custom range requires start and end dates".to_string(),
                )),
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReportRange::Today => "today",
            ReportRange::Week => "week",
            ReportRange::Month => "month",
            ReportRange::Custom(..) => "custom",
        }
    }

    /// Resolves the range to concrete bounds relative to `now`.
    pub fn bounds(
        &self,
        now: DateTime<Local>,
    ) -> Result<(DateTime<Local>, DateTime<Local>), RatecardError> {
        let today = now.date_naive();
        match *self {
            ReportRange::Today => Ok((start_of_day(today), end_of_day(today))),
            ReportRange::Week => {
                let week = WeekWindow::containing(now);
                Ok((week.start, week.end))
            }
            ReportRange::Month => {
                let first = today.with_day(1).unwrap_or(today);
                let last = first
                    .checked_add_months(chrono::Months::new(1))
                    .and_then(|next| next.pred_opt())
                    .unwrap_or(today);
                Ok((start_of_day(first), end_of_day(last)))
            }
            ReportRange::Custom(from, to) => {
                if from > to {
                    return Err(RatecardError::InvalidDateRange(
                        "start date cannot be after end date".to_string(),
                    ));
                }
                Ok((start_of_day(from), end_of_day(to)))
            }
        }
    }
}

fn week_sunday(date: NaiveDate) -> NaiveDate {
    let back = u64::from(date.weekday().num_days_from_sunday());
    date - Days::new(back)
}

/// Local midnight; DST gaps resolve to the earliest valid instant.
pub fn start_of_day(date: NaiveDate) -> DateTime<Local> {
    local_datetime(date, NaiveTime::default())
}

pub fn end_of_day(date: NaiveDate) -> DateTime<Local> {
    let last = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or_default();
    local_datetime(date, last)
}

fn local_datetime(date: NaiveDate, time: NaiveTime) -> DateTime<Local> {
    let naive = date.and_time(time);
    let result = Local.from_local_datetime(&naive);
    result
        .earliest()
        .or_else(|| result.latest())
        .unwrap_or_else(|| {
            // Inside a DST gap: step forward an hour.
            let shifted = naive + chrono::Duration::hours(1);
            Local
                .from_local_datetime(&shifted)
                .earliest()
                .unwrap_or_else(|| Local.from_utc_datetime(&naive))
        })
}
