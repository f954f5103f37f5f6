use std::ops::{Bound, RangeBounds};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::plan::{NewPlan, PlanId, PlanPatch, PlanRecord, UserId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("network unavailable: {0}")]
    Network(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("plan `{0}` not found")]
    NotFound(PlanId),
    #[error("repository call timed out")]
    Timeout,
    #[error("repository failure: {0}")]
    Backend(String),
}

/// Range predicate on `start_time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanFilter {
    start: Bound<DateTime<Utc>>,
    end: Bound<DateTime<Utc>>,
}

impl PlanFilter {
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    pub fn starting_in(range: impl RangeBounds<DateTime<Utc>>) -> Self {
        Self {
            start: range.start_bound().cloned(),
            end: range.end_bound().cloned(),
        }
    }

    /// Both ends inclusive.
    pub fn starting_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self::starting_in(from..=to)
    }

    pub fn starting_after(instant: DateTime<Utc>) -> Self {
        Self {
            start: Bound::Excluded(instant),
            end: Bound::Unbounded,
        }
    }

    pub fn matches(&self, record: &PlanRecord) -> bool {
        (self.start, self.end).contains(&record.start_time)
    }
}

impl Default for PlanFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// A full result set at one point in time.
pub type Snapshot = Arc<[PlanRecord]>;

/// Live, push-based sequence of snapshots. The first item is the state at
/// subscription time. Dropping the subscription unsubscribes.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<Snapshot>,
    on_unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<Snapshot>,
        on_unsubscribe: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            receiver,
            on_unsubscribe: Some(Box::new(on_unsubscribe)),
        }
    }

    /// Waits for the next snapshot. Returns `None` once unsubscribed or when
    /// the store shuts down.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }

    /// Idempotent; later calls are no-ops.
    pub fn unsubscribe(&mut self) {
        if let Some(release) = self.on_unsubscribe.take() {
            release();
        }
        self.receiver.close();
    }

    pub fn is_active(&self) -> bool {
        self.on_unsubscribe.is_some()
    }
}

impl Stream for Subscription {
    type Item = Snapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Persistence port; every call is scoped to one account.
#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn create(&self, user: &UserId, plan: NewPlan) -> Result<PlanId, RepositoryError>;
    async fn update(
        &self,
        user: &UserId,
        id: &PlanId,
        patch: PlanPatch,
    ) -> Result<(), RepositoryError>;
    async fn delete(&self, user: &UserId, id: &PlanId) -> Result<(), RepositoryError>;
    async fn get(&self, user: &UserId, id: &PlanId) -> Result<Option<PlanRecord>, RepositoryError>;
    /// Results ordered by `start_time` ascending.
    async fn query(
        &self,
        user: &UserId,
        filter: &PlanFilter,
    ) -> Result<Vec<PlanRecord>, RepositoryError>;
    async fn subscribe(&self, user: &UserId) -> Result<Subscription, RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanStatus;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record_at(hour: u32) -> PlanRecord {
        let start = Utc.with_ymd_and_hms(2025, 5, 1, hour, 0, 0).unwrap();
        PlanRecord {
            id: PlanId::new(format!("p{hour}")),
            title: "Review".into(),
            description: None,
            start_time: start,
            end_time: start + chrono::Duration::hours(1),
            status: PlanStatus::Pending,
            notification_id: None,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn between_filter_is_inclusive() {
        let from = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap();
        let filter = PlanFilter::starting_between(from, to);
        assert!(filter.matches(&record_at(8)));
        assert!(filter.matches(&record_at(10)));
        assert!(!filter.matches(&record_at(11)));
    }

    #[test]
    fn after_filter_excludes_boundary() {
        let at = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
        let filter = PlanFilter::starting_after(at);
        assert!(!filter.matches(&record_at(9)));
        assert!(filter.matches(&record_at(12)));
        assert!(PlanFilter::all().matches(&record_at(0)));
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let released = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let counter = Arc::clone(&released);
        let mut subscription = Subscription::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(Arc::from(vec![record_at(9)])).unwrap();
        let first = subscription.next().await.expect("initial snapshot");
        assert_eq!(first.len(), 1);

        subscription.unsubscribe();
        subscription.unsubscribe();
        drop(subscription);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(tx.send(Arc::from(Vec::new())).is_err());
    }
}
