use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::notifications::NotificationHandle;

/// Opaque identifier assigned by the repository when a plan is created.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(String);

impl PlanId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account namespace every plan is stored under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    #[default]
    Pending,
    Completed,
}

impl PlanStatus {
    pub fn toggled(self) -> Self {
        match self {
            PlanStatus::Pending => PlanStatus::Completed,
            PlanStatus::Completed => PlanStatus::Pending,
        }
    }

    pub fn is_completed(self) -> bool {
        matches!(self, PlanStatus::Completed)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStatus::Pending => f.write_str("pending"),
            PlanStatus::Completed => f.write_str("completed"),
        }
    }
}

/// A persisted study plan as delivered by the repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanRecord {
    pub id: PlanId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(default)]
    pub notification_id: Option<NotificationHandle>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlanRecord {
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    /// Stored documents are not guaranteed to have passed validation.
    pub fn has_valid_window(&self) -> bool {
        self.end_time > self.start_time
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }
}

/// Unvalidated plan fields as captured by an add/edit form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Explicit status control of the edit form. Ignored when adding.
    #[serde(default)]
    pub status: Option<PlanStatus>,
}

impl PlanDraft {
    pub fn new(title: impl Into<String>, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            description: None,
            start_time,
            end_time,
            status: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_status(mut self, status: PlanStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Plan fields that passed [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidPlan {
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: Option<PlanStatus>,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("plan title must not be empty")]
    EmptyTitle,
    #[error("plan must end after it starts")]
    EndBeforeStart,
}

pub fn validate(draft: &PlanDraft) -> Result<ValidPlan, ValidationError> {
    let title = draft.title.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if draft.end_time <= draft.start_time {
        return Err(ValidationError::EndBeforeStart);
    }
    let description = draft
        .description
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string);
    Ok(ValidPlan {
        title: title.to_string(),
        description,
        start_time: draft.start_time,
        end_time: draft.end_time,
        status: draft.status,
    })
}

/// Payload handed to [`crate::repository::PlanRepository::create`]. Timestamps
/// are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlan {
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: PlanStatus,
}

impl From<ValidPlan> for NewPlan {
    fn from(plan: ValidPlan) -> Self {
        Self {
            title: plan.title,
            description: plan.description,
            start_time: plan.start_time,
            end_time: plan.end_time,
            status: PlanStatus::Pending,
        }
    }
}

/// Partial update. `None` leaves a field untouched; `notification_id` uses a
/// nested option so a handle can be cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Option<PlanStatus>,
    pub notification_id: Option<Option<NotificationHandle>>,
}

impl PlanPatch {
    pub fn status(status: PlanStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn notification(handle: Option<NotificationHandle>) -> Self {
        Self {
            notification_id: Some(handle),
            ..Self::default()
        }
    }

    pub fn from_valid(plan: ValidPlan) -> Self {
        Self {
            title: Some(plan.title),
            description: Some(plan.description),
            start_time: Some(plan.start_time),
            end_time: Some(plan.end_time),
            status: plan.status,
            notification_id: None,
        }
    }

    /// Applies the patch to a record. Timestamps are left to the store.
    pub fn apply_to(&self, record: &mut PlanRecord) {
        if let Some(title) = &self.title {
            record.title = title.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(start) = self.start_time {
            record.start_time = start;
        }
        if let Some(end) = self.end_time {
            record.end_time = end;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(handle) = &self.notification_id {
            record.notification_id = handle.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, hour, minute, 0).unwrap()
    }

    #[test]
    fn rejects_blank_titles() {
        for title in ["", "   ", "\t\n"] {
            let draft = PlanDraft::new(title, at(9, 0), at(10, 0));
            assert_eq!(validate(&draft), Err(ValidationError::EmptyTitle));
        }
    }

    #[test]
    fn rejects_non_positive_windows() {
        let same = PlanDraft::new("Algebra", at(9, 0), at(9, 0));
        assert_eq!(validate(&same), Err(ValidationError::EndBeforeStart));

        let reversed = PlanDraft::new("Algebra", at(10, 0), at(9, 0));
        assert_eq!(validate(&reversed), Err(ValidationError::EndBeforeStart));
    }

    #[test]
    fn empty_title_reported_before_window() {
        let draft = PlanDraft::new(" ", at(10, 0), at(9, 0));
        assert_eq!(validate(&draft), Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn normalises_title_and_description() {
        let draft = PlanDraft::new("  Read chapter 4 ", at(9, 0), at(10, 30)).with_description("   ");
        let valid = validate(&draft).expect("valid draft");
        assert_eq!(valid.title, "Read chapter 4");
        assert_eq!(valid.description, None);
        assert_eq!(NewPlan::from(valid).status, PlanStatus::Pending);
    }

    #[test]
    fn status_toggle_round_trips() {
        assert_eq!(PlanStatus::Pending.toggled(), PlanStatus::Completed);
        assert_eq!(PlanStatus::Pending.toggled().toggled(), PlanStatus::Pending);
    }

    #[test]
    fn patch_leaves_untouched_fields() {
        let mut record = PlanRecord {
            id: PlanId::new("p1"),
            title: "Chemistry".into(),
            description: Some("lab notes".into()),
            start_time: at(9, 0),
            end_time: at(10, 0),
            status: PlanStatus::Pending,
            notification_id: Some(NotificationHandle::new("n1")),
            created_at: at(8, 0),
            updated_at: at(8, 0),
        };
        PlanPatch::status(PlanStatus::Completed).apply_to(&mut record);
        assert_eq!(record.status, PlanStatus::Completed);
        assert_eq!(record.description.as_deref(), Some("lab notes"));
        assert_eq!(record.notification_id, Some(NotificationHandle::new("n1")));

        PlanPatch::notification(None).apply_to(&mut record);
        assert!(record.notification_id.is_none());
    }

    #[test]
    fn status_serialises_lowercase() {
        let json = serde_json::to_string(&PlanStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
