use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use plan_domain::notifications::{
    NotificationError, NotificationHandle, NotificationPlatform, NotificationRequest,
    NotificationResponse,
};
use tracing::{debug, info};

struct PlatformState {
    pending: BTreeMap<String, NotificationRequest>,
    next_id: u64,
    permission: bool,
    fail_next_schedule: Option<NotificationError>,
}

/// Local notification tray kept in memory. Pending reminders can be
/// inspected and "delivered" by hand.
pub struct MemoryNotificationPlatform {
    state: Mutex<PlatformState>,
    latency: Duration,
}

impl MemoryNotificationPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PlatformState {
                pending: BTreeMap::new(),
                next_id: 1,
                permission: true,
                fail_next_schedule: None,
            }),
            latency: Duration::ZERO,
        }
    }

    /// Delays every platform call, which lets tests interleave operations.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_permission(&self, granted: bool) {
        self.state.lock().permission = granted;
    }

    pub fn fail_next_schedule(&self, error: NotificationError) {
        self.state.lock().fail_next_schedule = Some(error);
    }

    pub fn pending(&self) -> Vec<(NotificationHandle, NotificationRequest)> {
        self.state
            .lock()
            .pending
            .iter()
            .map(|(id, request)| (NotificationHandle::new(id.clone()), request.clone()))
            .collect()
    }

    pub fn is_pending(&self, handle: &NotificationHandle) -> bool {
        self.state.lock().pending.contains_key(handle.as_str())
    }

    /// Fires a pending reminder as if the user tapped it.
    pub fn deliver(&self, handle: &NotificationHandle) -> Option<NotificationResponse> {
        let request = self.state.lock().pending.remove(handle.as_str())?;
        info!(%handle, title = %request.title, "reminder delivered");
        Some(NotificationResponse {
            handle: handle.clone(),
            data: request.data,
        })
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl Default for MemoryNotificationPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationPlatform for MemoryNotificationPlatform {
    async fn request_permission(&self) -> Result<bool, NotificationError> {
        Ok(self.state.lock().permission)
    }

    async fn schedule_one_shot(
        &self,
        request: NotificationRequest,
    ) -> Result<NotificationHandle, NotificationError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        if let Some(error) = state.fail_next_schedule.take() {
            return Err(error);
        }
        if !state.permission {
            return Err(NotificationError::PermissionDenied);
        }
        let id = format!("local-{}", state.next_id);
        state.next_id += 1;
        debug!(handle = %id, fire_at = %request.fire_at, "one-shot notification registered");
        state.pending.insert(id.clone(), request);
        Ok(NotificationHandle::new(id))
    }

    async fn cancel(&self, handle: &NotificationHandle) -> Result<(), NotificationError> {
        self.simulate_latency().await;
        if self.state.lock().pending.remove(handle.as_str()).is_none() {
            debug!(%handle, "cancel for unknown or delivered notification ignored");
        }
        Ok(())
    }
}
