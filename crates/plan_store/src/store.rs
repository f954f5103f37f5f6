use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use plan_domain::{
    plan::{NewPlan, PlanId, PlanPatch, PlanRecord, UserId},
    repository::{PlanFilter, PlanRepository, RepositoryError, Snapshot, Subscription},
};
use tokio::sync::mpsc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Repository call a queued fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Create,
    Update,
    Delete,
    Get,
    Query,
    Subscribe,
}

#[derive(Default)]
struct UserCollection {
    plans: HashMap<PlanId, PlanRecord>,
    subscribers: HashMap<u64, mpsc::UnboundedSender<Snapshot>>,
}

impl UserCollection {
    fn snapshot(&self) -> Snapshot {
        let mut records: Vec<PlanRecord> = self.plans.values().cloned().collect();
        sort_by_start(&mut records);
        Arc::from(records)
    }

    fn publish(&mut self) {
        if self.subscribers.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        self.subscribers
            .retain(|_, sender| sender.send(Arc::clone(&snapshot)).is_ok());
    }
}

#[derive(Default)]
struct StoreState {
    users: HashMap<UserId, UserCollection>,
    last_stamp: Option<DateTime<Utc>>,
    next_subscriber: u64,
}

impl StoreState {
    /// Server-side clock: never goes backwards.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if last >= now => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

/// In-process document store with per-account namespaces and push-based
/// snapshots.
#[derive(Default)]
pub struct MemoryPlanStore {
    state: Arc<RwLock<StoreState>>,
    faults: Mutex<VecDeque<(StoreOp, RepositoryError)>>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: StoreOp, error: RepositoryError) {
        self.faults.lock().push_back((op, error));
    }

    /// Inserts a record as-is, bypassing validation. Useful for legacy data.
    pub fn insert_raw(&self, user: &UserId, record: PlanRecord) {
        let mut state = self.state.write();
        let collection = state.users.entry(user.clone()).or_default();
        collection.plans.insert(record.id.clone(), record);
        collection.publish();
    }

    pub fn subscriber_count(&self, user: &UserId) -> usize {
        self.state
            .read()
            .users
            .get(user)
            .map(|collection| collection.subscribers.len())
            .unwrap_or(0)
    }

    fn check_fault(&self, op: StoreOp) -> Result<(), RepositoryError> {
        let mut faults = self.faults.lock();
        match faults.iter().position(|(queued, _)| *queued == op) {
            Some(index) => match faults.remove(index) {
                Some((_, error)) => Err(error),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PlanRepository for MemoryPlanStore {
    #[instrument(skip(self, plan))]
    async fn create(&self, user: &UserId, plan: NewPlan) -> Result<PlanId, RepositoryError> {
        self.check_fault(StoreOp::Create)?;
        let mut state = self.state.write();
        let stamp = state.stamp();
        let id = PlanId::new(Uuid::new_v4().simple().to_string());
        let record = PlanRecord {
            id: id.clone(),
            title: plan.title,
            description: plan.description,
            start_time: plan.start_time,
            end_time: plan.end_time,
            status: plan.status,
            notification_id: None,
            created_at: stamp,
            updated_at: stamp,
        };
        let collection = state.users.entry(user.clone()).or_default();
        collection.plans.insert(id.clone(), record);
        collection.publish();
        debug!(plan_id = %id, "document created");
        Ok(id)
    }

    async fn update(
        &self,
        user: &UserId,
        id: &PlanId,
        patch: PlanPatch,
    ) -> Result<(), RepositoryError> {
        self.check_fault(StoreOp::Update)?;
        let mut state = self.state.write();
        let stamp = state.stamp();
        let collection = state
            .users
            .get_mut(user)
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
        let record = collection
            .plans
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
        patch.apply_to(record);
        record.updated_at = stamp;
        collection.publish();
        Ok(())
    }

    async fn delete(&self, user: &UserId, id: &PlanId) -> Result<(), RepositoryError> {
        self.check_fault(StoreOp::Delete)?;
        let mut state = self.state.write();
        let collection = state
            .users
            .get_mut(user)
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
        collection
            .plans
            .remove(id)
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
        collection.publish();
        debug!(plan_id = %id, "document deleted");
        Ok(())
    }

    async fn get(&self, user: &UserId, id: &PlanId) -> Result<Option<PlanRecord>, RepositoryError> {
        self.check_fault(StoreOp::Get)?;
        let state = self.state.read();
        Ok(state
            .users
            .get(user)
            .and_then(|collection| collection.plans.get(id))
            .cloned())
    }

    async fn query(
        &self,
        user: &UserId,
        filter: &PlanFilter,
    ) -> Result<Vec<PlanRecord>, RepositoryError> {
        self.check_fault(StoreOp::Query)?;
        let state = self.state.read();
        let mut records: Vec<PlanRecord> = state
            .users
            .get(user)
            .map(|collection| {
                collection
                    .plans
                    .values()
                    .filter(|record| filter.matches(record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        sort_by_start(&mut records);
        Ok(records)
    }

    async fn subscribe(&self, user: &UserId) -> Result<Subscription, RepositoryError> {
        self.check_fault(StoreOp::Subscribe)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscriber_id = {
            let mut state = self.state.write();
            let subscriber_id = state.next_subscriber;
            state.next_subscriber += 1;
            let collection = state.users.entry(user.clone()).or_default();
            // The receiver is still held locally, so this cannot fail.
            let _ = sender.send(collection.snapshot());
            collection.subscribers.insert(subscriber_id, sender);
            subscriber_id
        };
        debug!(%user, subscriber_id, "live query opened");

        let state: Weak<RwLock<StoreState>> = Arc::downgrade(&self.state);
        let user = user.clone();
        Ok(Subscription::new(receiver, move || {
            if let Some(state) = state.upgrade() {
                if let Some(collection) = state.write().users.get_mut(&user) {
                    collection.subscribers.remove(&subscriber_id);
                }
            }
        }))
    }
}

fn sort_by_start(records: &mut [PlanRecord]) {
    records.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.id.cmp(&b.id))
    });
}
