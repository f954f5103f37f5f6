use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::calendar::{build_calendar_marking, CalendarMarking};
use crate::error::AggregationError;
use crate::plan::PlanRecord;
use crate::statistics::{
    build_statistics_series, build_weekly_series, StatisticsReport, WeeklySeries,
};

/// What the screens currently display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRequest {
    pub year: i32,
    pub month: u32,
    pub range_start: NaiveDate,
    pub range_end: NaiveDate,
    pub today: NaiveDate,
    pub weeks: usize,
    pub now: DateTime<Utc>,
    pub upcoming_window: Duration,
}

/// Every derived structure for one snapshot. Recomputed from scratch each time.
#[derive(Debug, Clone, Serialize)]
pub struct PlanViews {
    pub calendar: CalendarMarking,
    pub statistics: StatisticsReport,
    pub weekly: Vec<WeeklySeries>,
    pub upcoming: Vec<PlanRecord>,
}

impl PlanViews {
    pub fn from_snapshot<Tz: TimeZone>(
        records: &[PlanRecord],
        request: &ViewRequest,
        tz: &Tz,
    ) -> Result<Self, AggregationError> {
        Ok(Self {
            calendar: build_calendar_marking(records, request.year, request.month, tz)?,
            statistics: build_statistics_series(
                records,
                request.range_start,
                request.range_end,
                tz,
            )?,
            weekly: build_weekly_series(records, request.today, request.weeks, tz)?,
            upcoming: upcoming_within(records, request.now, request.upcoming_window),
        })
    }
}

/// Plans starting in `(now, now + window]`, earliest first.
pub fn upcoming_within(
    records: &[PlanRecord],
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<PlanRecord> {
    let horizon = now + window;
    let mut upcoming: Vec<PlanRecord> = records
        .iter()
        .filter(|record| record.start_time > now && record.start_time <= horizon)
        .cloned()
        .collect();
    upcoming.sort_by_key(|record| record.start_time);
    upcoming
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CalendarDayState;
    use crate::plan::{PlanId, PlanStatus};

    fn plan(id: &str, start: DateTime<Utc>) -> PlanRecord {
        PlanRecord {
            id: PlanId::new(id),
            title: id.to_string(),
            description: None,
            start_time: start,
            end_time: start + Duration::minutes(30),
            status: PlanStatus::Pending,
            notification_id: None,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn upcoming_window_bounds() {
        let now = Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap();
        let records = vec![
            plan("edge", now + Duration::hours(1)),
            plan("past", now - Duration::minutes(1)),
            plan("now", now),
            plan("soon", now + Duration::minutes(10)),
            plan("later", now + Duration::minutes(61)),
        ];
        let ids: Vec<String> = upcoming_within(&records, now, Duration::hours(1))
            .into_iter()
            .map(|record| record.id.to_string())
            .collect();
        assert_eq!(ids, vec!["soon", "edge"]);
    }

    #[test]
    fn each_snapshot_is_independent() {
        let now = Utc.with_ymd_and_hms(2025, 9, 10, 8, 0, 0).unwrap();
        let request = ViewRequest {
            year: 2025,
            month: 9,
            range_start: NaiveDate::from_ymd_opt(2025, 9, 9).unwrap(),
            range_end: NaiveDate::from_ymd_opt(2025, 9, 11).unwrap(),
            today: NaiveDate::from_ymd_opt(2025, 9, 10).unwrap(),
            weeks: 4,
            now,
            upcoming_window: Duration::hours(1),
        };
        let first = vec![plan("a", now + Duration::minutes(30))];
        let views = PlanViews::from_snapshot(&first, &request, &Utc).unwrap();
        assert_eq!(views.upcoming.len(), 1);
        assert_eq!(views.statistics.daily_minutes.values(), vec![0.0, 30.0, 0.0]);

        let views = PlanViews::from_snapshot(&[], &request, &Utc).unwrap();
        assert!(views.upcoming.is_empty());
        assert_eq!(views.statistics.daily_minutes.values(), vec![0.0, 0.0, 0.0]);
        assert_eq!(views.calendar.len(), 30);
        assert!(views
            .calendar
            .iter()
            .all(|(_, state)| *state == CalendarDayState::NoPlans));
    }
}
