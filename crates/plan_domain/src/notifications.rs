use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::plan::PlanId;

pub const REMINDER_TITLE: &str = "Study reminder";

/// Opaque reference to a scheduled local notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationHandle(String);

impl NotificationHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Navigation payload carried by every reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub plan_id: PlanId,
}

impl NotificationPayload {
    pub fn to_data(&self) -> Value {
        json!({ "planId": self.plan_id })
    }

    pub fn from_data(data: &Value) -> Result<Self, NotificationError> {
        serde_json::from_value(data.clone())
            .map_err(|err| NotificationError::InvalidPayload(err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub fire_at: DateTime<Utc>,
    pub data: Value,
}

impl NotificationRequest {
    pub fn reminder(plan_id: &PlanId, plan_title: &str, fire_at: DateTime<Utc>) -> Self {
        let payload = NotificationPayload {
            plan_id: plan_id.clone(),
        };
        Self {
            title: REMINDER_TITLE.to_string(),
            body: format!("Time to start your plan: {plan_title}"),
            fire_at,
            data: payload.to_data(),
        }
    }
}

/// Raised by the platform when a notification is delivered or tapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub handle: NotificationHandle,
    pub data: Value,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("notification permission was not granted")]
    PermissionDenied,
    #[error("notification payload is malformed: {0}")]
    InvalidPayload(String),
    #[error("notification platform failure: {0}")]
    Platform(String),
}

/// Which half of a cancel-then-schedule pair failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReminderError {
    #[error("could not cancel reminder `{handle}`: {source}")]
    Cancel {
        handle: NotificationHandle,
        source: NotificationError,
    },
    #[error("could not schedule reminder: {0}")]
    Schedule(NotificationError),
}

/// Local-notification adapters implement this trait.
#[async_trait]
pub trait NotificationPlatform: Send + Sync {
    async fn request_permission(&self) -> Result<bool, NotificationError>;
    async fn schedule_one_shot(
        &self,
        request: NotificationRequest,
    ) -> Result<NotificationHandle, NotificationError>;
    /// Must succeed for handles that already fired or were cancelled.
    async fn cancel(&self, handle: &NotificationHandle) -> Result<(), NotificationError>;
}

type LockMap = Mutex<HashMap<PlanId, Arc<AsyncMutex<()>>>>;

/// Proof that the caller holds the per-plan notification lock. The plan's
/// entry leaves the lock map when the last holder or waiter lets go.
pub struct PlanGuard {
    plan_id: PlanId,
    guard: Option<OwnedMutexGuard<()>>,
    lock: Arc<AsyncMutex<()>>,
    locks: Arc<LockMap>,
}

impl PlanGuard {
    pub fn plan_id(&self) -> &PlanId {
        &self.plan_id
    }
}

impl Drop for PlanGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock();
        // One reference in the map, one here: nobody else is waiting.
        if Arc::strong_count(&self.lock) == 2
            && locks
                .get(&self.plan_id)
                .is_some_and(|entry| Arc::ptr_eq(entry, &self.lock))
        {
            locks.remove(&self.plan_id);
        }
    }
}

/// Maps plan time windows onto one-shot reminders and serialises handle
/// changes per plan.
pub struct NotificationScheduler {
    platform: Arc<dyn NotificationPlatform>,
    lead: Duration,
    locks: Arc<LockMap>,
}

impl NotificationScheduler {
    pub fn new(platform: Arc<dyn NotificationPlatform>, lead: Duration) -> Self {
        Self {
            platform,
            lead,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn fire_time(&self, start_time: DateTime<Utc>) -> DateTime<Utc> {
        start_time - self.lead
    }

    pub async fn request_permission(&self) -> Result<bool, NotificationError> {
        let granted = self.platform.request_permission().await?;
        if !granted {
            warn!("notification permission denied; reminders will not be delivered");
        }
        Ok(granted)
    }

    /// Returns `Ok(None)` when `fire_at` is not strictly in the future.
    pub async fn schedule(
        &self,
        plan_id: &PlanId,
        title: &str,
        fire_at: DateTime<Utc>,
    ) -> Result<Option<NotificationHandle>, NotificationError> {
        if fire_at <= Utc::now() {
            debug!(%plan_id, %fire_at, "reminder time already passed; nothing scheduled");
            return Ok(None);
        }
        let handle = self
            .platform
            .schedule_one_shot(NotificationRequest::reminder(plan_id, title, fire_at))
            .await?;
        debug!(%plan_id, %handle, %fire_at, "reminder scheduled");
        Ok(Some(handle))
    }

    pub async fn cancel(&self, handle: &NotificationHandle) -> Result<(), NotificationError> {
        self.platform.cancel(handle).await?;
        debug!(%handle, "reminder cancelled");
        Ok(())
    }

    pub async fn lock_plan(&self, plan_id: &PlanId) -> PlanGuard {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(plan_id.clone()).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        PlanGuard {
            plan_id: plan_id.clone(),
            guard: Some(guard),
            lock,
            locks: Arc::clone(&self.locks),
        }
    }

    pub async fn reschedule(
        &self,
        old: Option<&NotificationHandle>,
        plan_id: &PlanId,
        title: &str,
        fire_at: DateTime<Utc>,
    ) -> Result<Option<NotificationHandle>, ReminderError> {
        let guard = self.lock_plan(plan_id).await;
        self.reschedule_guarded(&guard, old, title, fire_at).await
    }

    /// Cancel-then-schedule under a lock the caller already holds.
    pub async fn reschedule_guarded(
        &self,
        guard: &PlanGuard,
        old: Option<&NotificationHandle>,
        title: &str,
        fire_at: DateTime<Utc>,
    ) -> Result<Option<NotificationHandle>, ReminderError> {
        if let Some(handle) = old {
            self.cancel(handle)
                .await
                .map_err(|source| ReminderError::Cancel {
                    handle: handle.clone(),
                    source,
                })?;
        }
        self.schedule(guard.plan_id(), title, fire_at)
            .await
            .map_err(ReminderError::Schedule)
    }

    /// Recovers the plan a tapped reminder points at.
    pub fn plan_for_response(&self, response: &NotificationResponse) -> Option<PlanId> {
        match NotificationPayload::from_data(&response.data) {
            Ok(payload) => Some(payload.plan_id),
            Err(err) => {
                warn!(handle = %response.handle, %err, "ignoring notification without plan payload");
                None
            }
        }
    }

    /// Plans whose lock is currently held or awaited.
    pub fn tracked_locks(&self) -> usize {
        self.locks.lock().len()
    }
}
