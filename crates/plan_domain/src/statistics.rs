use std::collections::HashMap;

use chrono::{Datelike, Days, Duration, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::calendar::local_date;
use crate::error::AggregationError;
use crate::plan::PlanRecord;

pub const WEEKDAY_LABELS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeriesPoint {
    pub label: String,
    pub value: f64,
}

/// Ordered `(label, value)` pairs ready for a chart.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct StatisticsSeries(Vec<SeriesPoint>);

impl StatisticsSeries {
    pub fn values(&self) -> Vec<f64> {
        self.0.iter().map(|point| point.value).collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.0.iter().map(|point| point.label.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<SeriesPoint> for StatisticsSeries {
    fn from_iter<I: IntoIterator<Item = SeriesPoint>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionCounts {
    pub completed: usize,
    pub pending: usize,
}

impl CompletionCounts {
    pub fn total(&self) -> usize {
        self.completed + self.pending
    }

    pub fn to_series(&self) -> StatisticsSeries {
        [("completed", self.completed), ("pending", self.pending)]
            .into_iter()
            .map(|(label, count)| SeriesPoint {
                label: label.to_string(),
                value: count as f64,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatisticsReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Study minutes per day, labelled `YYYY-MM-DD`.
    pub daily_minutes: StatisticsSeries,
    pub completion: CompletionCounts,
    pub skipped_records: usize,
}

/// Sums study minutes per local start day over `[start, end]`.
pub fn build_statistics_series<Tz: TimeZone>(
    records: &[PlanRecord],
    start: NaiveDate,
    end: NaiveDate,
    tz: &Tz,
) -> Result<StatisticsReport, AggregationError> {
    if end < start {
        return Err(AggregationError::InvalidRange { start, end });
    }

    let mut minutes_by_day: HashMap<NaiveDate, f64> = HashMap::new();
    let mut completion = CompletionCounts::default();
    let mut skipped_records = 0;

    for record in records {
        let day = local_date(record, tz);
        if day < start || day > end {
            continue;
        }
        if !record.has_valid_window() {
            warn!(
                plan_id = %record.id,
                start = %record.start_time,
                end = %record.end_time,
                "skipping plan with invalid time window"
            );
            skipped_records += 1;
            continue;
        }
        *minutes_by_day.entry(day).or_default() += minutes(record.duration());
        if record.is_completed() {
            completion.completed += 1;
        } else {
            completion.pending += 1;
        }
    }

    let daily_minutes = start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|day| SeriesPoint {
            label: day.format("%Y-%m-%d").to_string(),
            value: minutes_by_day.get(&day).copied().unwrap_or(0.0),
        })
        .collect();

    Ok(StatisticsReport {
        start,
        end,
        daily_minutes,
        completion,
        skipped_records,
    })
}

/// One Sunday-started week of study minutes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeeklySeries {
    pub week_start: NaiveDate,
    pub label: String,
    pub minutes: StatisticsSeries,
}

/// Upper bound on the number of weeks one series may cover.
pub const MAX_SERIES_WEEKS: usize = 520;

/// The last `weeks` weeks ending with the week containing `today`, oldest first.
pub fn build_weekly_series<Tz: TimeZone>(
    records: &[PlanRecord],
    today: NaiveDate,
    weeks: usize,
    tz: &Tz,
) -> Result<Vec<WeeklySeries>, AggregationError> {
    if weeks == 0 {
        return Ok(Vec::new());
    }
    if weeks > MAX_SERIES_WEEKS {
        return Err(AggregationError::TooManyWeeks {
            weeks,
            max: MAX_SERIES_WEEKS,
        });
    }
    let first_week = week_start(today)
        .and_then(|current| current.checked_sub_days(Days::new((weeks as u64 - 1) * 7)))
        .ok_or(AggregationError::OutOfRange { date: today })?;

    let mut buckets = vec![[0.0f64; 7]; weeks];
    for record in records {
        if !record.has_valid_window() {
            warn!(plan_id = %record.id, "skipping plan with invalid time window");
            continue;
        }
        let day = local_date(record, tz);
        let offset = (day - first_week).num_days();
        if offset < 0 || offset >= (weeks * 7) as i64 {
            continue;
        }
        let (week, weekday) = (offset as usize / 7, offset as usize % 7);
        buckets[week][weekday] += minutes(record.duration());
    }

    buckets
        .into_iter()
        .enumerate()
        .map(|(index, days)| {
            let week_start = first_week
                .checked_add_days(Days::new(index as u64 * 7))
                .ok_or(AggregationError::OutOfRange { date: today })?;
            let week_end = week_start.checked_add_days(Days::new(6)).unwrap_or(NaiveDate::MAX);
            Ok(WeeklySeries {
                week_start,
                label: format!("{} - {}", short_date(week_start), short_date(week_end)),
                minutes: WEEKDAY_LABELS
                    .iter()
                    .zip(days)
                    .map(|(label, value)| SeriesPoint {
                        label: (*label).to_string(),
                        value,
                    })
                    .collect(),
            })
        })
        .collect()
}

fn week_start(day: NaiveDate) -> Option<NaiveDate> {
    day.checked_sub_days(Days::new(u64::from(day.weekday().num_days_from_sunday())))
}

fn short_date(day: NaiveDate) -> String {
    format!("{}/{}/{}", day.day(), day.month(), day.year())
}

fn minutes(duration: Duration) -> f64 {
    duration.num_seconds() as f64 / 60.0
}
