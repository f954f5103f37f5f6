use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Tunables shared by the coordinator and the derived views.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlannerSettings {
    pub reminder_lead_minutes: i64,
    pub upcoming_window_minutes: i64,
    pub statistics_weeks: usize,
}

impl PlannerSettings {
    pub fn reminder_lead(&self) -> Duration {
        Duration::minutes(self.reminder_lead_minutes.max(0))
    }

    pub fn upcoming_window(&self) -> Duration {
        Duration::minutes(self.upcoming_window_minutes.max(0))
    }
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            reminder_lead_minutes: 60,
            upcoming_window_minutes: 60,
            statistics_weeks: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: PlannerSettings =
            serde_json::from_str(r#"{ "reminder_lead_minutes": 15 }"#).unwrap();
        assert_eq!(settings.reminder_lead(), Duration::minutes(15));
        assert_eq!(settings.upcoming_window(), Duration::minutes(60));
        assert_eq!(settings.statistics_weeks, 4);
    }
}
