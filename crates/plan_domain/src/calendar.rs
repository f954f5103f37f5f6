use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::AggregationError;
use crate::plan::PlanRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CalendarDayState {
    NoPlans,
    NoneCompleted,
    SomeCompleted,
    AllCompleted,
}

impl CalendarDayState {
    pub fn classify(total: usize, completed: usize) -> Self {
        match (total, completed) {
            (0, _) => CalendarDayState::NoPlans,
            (_, 0) => CalendarDayState::NoneCompleted,
            (t, c) if c >= t => CalendarDayState::AllCompleted,
            _ => CalendarDayState::SomeCompleted,
        }
    }
}

/// Day-by-day state of one month, keyed by `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CalendarMarking(BTreeMap<NaiveDate, CalendarDayState>);

impl CalendarMarking {
    pub fn get(&self, date: &NaiveDate) -> Option<CalendarDayState> {
        self.0.get(date).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &CalendarDayState)> {
        self.0.iter()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct DayTally {
    total: usize,
    completed: usize,
}

/// Classifies every day of `year`/`month` by the plans starting on it in `tz`.
pub fn build_calendar_marking<Tz: TimeZone>(
    records: &[PlanRecord],
    year: i32,
    month: u32,
    tz: &Tz,
) -> Result<CalendarMarking, AggregationError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or(AggregationError::InvalidMonth { year, month })?;

    let mut tallies: HashMap<NaiveDate, DayTally> = HashMap::new();
    for record in records {
        let day = local_date(record, tz);
        if (day.year(), day.month()) != (year, month) {
            continue;
        }
        let tally = tallies.entry(day).or_default();
        tally.total += 1;
        if record.is_completed() {
            tally.completed += 1;
        }
    }

    let marking = first
        .iter_days()
        .take(days_in_month(year, month) as usize)
        .map(|day| {
            let tally = tallies.get(&day).copied().unwrap_or_default();
            (day, CalendarDayState::classify(tally.total, tally.completed))
        })
        .collect();
    Ok(CalendarMarking(marking))
}

pub(crate) fn local_date<Tz: TimeZone>(record: &PlanRecord, tz: &Tz) -> NaiveDate {
    record.start_time.with_timezone(tz).date_naive()
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PlanId, PlanStatus};
    use chrono::{DateTime, Duration, FixedOffset, Utc};
    use pretty_assertions::assert_eq;

    fn plan(id: &str, start: DateTime<Utc>, status: PlanStatus) -> PlanRecord {
        PlanRecord {
            id: PlanId::new(id),
            title: format!("plan {id}"),
            description: None,
            start_time: start,
            end_time: start + Duration::minutes(45),
            status,
            notification_id: None,
            created_at: start,
            updated_at: start,
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_thirty_day_month_is_all_no_plans() {
        let marking = build_calendar_marking(&[], 2025, 6, &Utc).unwrap();
        assert_eq!(marking.len(), 30);
        assert!(marking
            .iter()
            .all(|(_, state)| *state == CalendarDayState::NoPlans));
    }

    #[test]
    fn february_honours_leap_years() {
        assert_eq!(build_calendar_marking(&[], 2024, 2, &Utc).unwrap().len(), 29);
        assert_eq!(build_calendar_marking(&[], 2023, 2, &Utc).unwrap().len(), 28);
        assert_eq!(build_calendar_marking(&[], 1900, 2, &Utc).unwrap().len(), 28);
        assert_eq!(build_calendar_marking(&[], 2000, 2, &Utc).unwrap().len(), 29);
    }

    #[test]
    fn classifies_mixed_and_complete_days() {
        let records = vec![
            plan("a", utc(2025, 6, 10, 8), PlanStatus::Completed),
            plan("b", utc(2025, 6, 10, 12), PlanStatus::Completed),
            plan("c", utc(2025, 6, 10, 18), PlanStatus::Pending),
            plan("d", utc(2025, 6, 11, 9), PlanStatus::Completed),
            plan("e", utc(2025, 6, 12, 9), PlanStatus::Pending),
            plan("f", utc(2025, 7, 1, 9), PlanStatus::Pending),
        ];
        let marking = build_calendar_marking(&records, 2025, 6, &Utc).unwrap();
        assert_eq!(marking.get(&day(2025, 6, 10)), Some(CalendarDayState::SomeCompleted));
        assert_eq!(marking.get(&day(2025, 6, 11)), Some(CalendarDayState::AllCompleted));
        assert_eq!(marking.get(&day(2025, 6, 12)), Some(CalendarDayState::NoneCompleted));
        assert_eq!(marking.get(&day(2025, 6, 13)), Some(CalendarDayState::NoPlans));
        assert_eq!(marking.get(&day(2025, 7, 1)), None);
    }

    #[test]
    fn buckets_by_local_date() {
        // 23:30 UTC on the 10th is already the 11th at UTC+2.
        let start = Utc.with_ymd_and_hms(2025, 6, 10, 23, 30, 0).unwrap();
        let records = vec![plan("late", start, PlanStatus::Completed)];
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let marking = build_calendar_marking(&records, 2025, 6, &tz).unwrap();
        assert_eq!(marking.get(&day(2025, 6, 10)), Some(CalendarDayState::NoPlans));
        assert_eq!(marking.get(&day(2025, 6, 11)), Some(CalendarDayState::AllCompleted));
    }

    #[test]
    fn rejects_invalid_month() {
        assert_eq!(
            build_calendar_marking(&[], 2025, 13, &Utc),
            Err(AggregationError::InvalidMonth {
                year: 2025,
                month: 13
            })
        );
    }

    #[test]
    fn serialises_with_iso_dates() {
        let marking = build_calendar_marking(&[], 2025, 2, &Utc).unwrap();
        let json = serde_json::to_value(&marking).unwrap();
        assert_eq!(json["2025-02-01"], "no-plans");
    }
}
