use std::ops::Bound;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use tracing::{info, instrument, warn};

use crate::{
    error::{Operation, PlanError},
    notifications::{
        NotificationError, NotificationHandle, NotificationPlatform, NotificationScheduler,
        ReminderError,
    },
    plan::{validate, NewPlan, PlanDraft, PlanId, PlanPatch, PlanRecord, PlanStatus, UserId},
    repository::{PlanFilter, PlanRepository, RepositoryError, Subscription},
    settings::PlannerSettings,
};

/// What happened to a plan's reminder during a lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderOutcome {
    Scheduled(NotificationHandle),
    /// The reminder time had already passed.
    NotScheduled,
    Failed(ReminderFailure),
}

impl ReminderOutcome {
    pub fn handle(&self) -> Option<&NotificationHandle> {
        match self {
            ReminderOutcome::Scheduled(handle) => Some(handle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderFailure {
    Notification(ReminderError),
    /// The reminder was scheduled but its handle could not be stored, so it
    /// was cancelled again.
    Attach(RepositoryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedPlan {
    pub id: PlanId,
    pub reminder: ReminderOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    NoReminder,
    Cancelled(NotificationHandle),
    Failed {
        handle: NotificationHandle,
        error: NotificationError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedPlan {
    pub id: PlanId,
    pub reminder: CancelOutcome,
}

/// Orchestrates plan mutations against the repository and keeps reminders in
/// step with them.
pub struct PlanService {
    repository: Arc<dyn PlanRepository>,
    scheduler: NotificationScheduler,
    settings: PlannerSettings,
}

pub struct PlanServiceBuilder {
    repository: Option<Arc<dyn PlanRepository>>,
    platform: Option<Arc<dyn NotificationPlatform>>,
    settings: PlannerSettings,
}

impl PlanServiceBuilder {
    pub fn new() -> Self {
        Self {
            repository: None,
            platform: None,
            settings: PlannerSettings::default(),
        }
    }

    pub fn with_repository(mut self, repository: Arc<dyn PlanRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_notification_platform(mut self, platform: Arc<dyn NotificationPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_settings(mut self, settings: PlannerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<PlanService, PlanError> {
        let repository = self
            .repository
            .ok_or(PlanError::Configuration("plan repository"))?;
        let platform = self
            .platform
            .ok_or(PlanError::Configuration("notification platform"))?;
        Ok(PlanService {
            repository,
            scheduler: NotificationScheduler::new(platform, self.settings.reminder_lead()),
            settings: self.settings,
        })
    }
}

impl Default for PlanServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanService {
    pub fn builder() -> PlanServiceBuilder {
        PlanServiceBuilder::new()
    }

    pub fn scheduler(&self) -> &NotificationScheduler {
        &self.scheduler
    }

    /// Validates, stores, then schedules and attaches the reminder. The second
    /// half may fail without undoing the first: the plan then simply has no
    /// reminder.
    #[instrument(skip(self, draft))]
    pub async fn add_plan(&self, user: &UserId, draft: PlanDraft) -> Result<AddedPlan, PlanError> {
        let plan = validate(&draft)?;
        let title = plan.title.clone();
        let start_time = plan.start_time;

        let id = self
            .repository
            .create(user, NewPlan::from(plan))
            .await
            .map_err(|err| PlanError::repository(Operation::AddPlan, None, err))?;
        info!(plan_id = %id, "plan created");

        let _guard = self.scheduler.lock_plan(&id).await;
        let fire_at = self.scheduler.fire_time(start_time);
        let reminder = match self.scheduler.schedule(&id, &title, fire_at).await {
            Ok(None) => ReminderOutcome::NotScheduled,
            Err(err) => {
                warn!(plan_id = %id, %err, "plan stored without reminder");
                ReminderOutcome::Failed(ReminderFailure::Notification(ReminderError::Schedule(err)))
            }
            Ok(Some(handle)) => {
                match self
                    .repository
                    .update(user, &id, PlanPatch::notification(Some(handle.clone())))
                    .await
                {
                    Ok(()) => ReminderOutcome::Scheduled(handle),
                    Err(err) => {
                        warn!(plan_id = %id, %err, "could not attach reminder; cancelling it");
                        self.cancel_quietly(&handle).await;
                        ReminderOutcome::Failed(ReminderFailure::Attach(err))
                    }
                }
            }
        };
        Ok(AddedPlan { id, reminder })
    }

    /// Replaces the plan's fields. The current reminder is cancelled and a new
    /// one scheduled for the new start time, and the new handle is stored in
    /// the same write as the fields.
    #[instrument(skip(self, draft))]
    pub async fn update_plan(
        &self,
        user: &UserId,
        id: &PlanId,
        draft: PlanDraft,
    ) -> Result<ReminderOutcome, PlanError> {
        let plan = validate(&draft)?;
        let guard = self.scheduler.lock_plan(id).await;
        let current = self.fetch(user, id, Operation::UpdatePlan).await?;

        let fire_at = self.scheduler.fire_time(plan.start_time);
        let title = plan.title.clone();
        let mut patch = PlanPatch::from_valid(plan);
        let reminder = match self
            .scheduler
            .reschedule_guarded(&guard, current.notification_id.as_ref(), &title, fire_at)
            .await
        {
            Ok(Some(handle)) => {
                patch.notification_id = Some(Some(handle.clone()));
                ReminderOutcome::Scheduled(handle)
            }
            Ok(None) => {
                patch.notification_id = Some(None);
                ReminderOutcome::NotScheduled
            }
            // The old reminder may still be live, so the record keeps pointing at it.
            Err(err @ ReminderError::Cancel { .. }) => {
                warn!(plan_id = %id, %err, "keeping previous reminder");
                ReminderOutcome::Failed(ReminderFailure::Notification(err))
            }
            Err(err @ ReminderError::Schedule(_)) => {
                warn!(plan_id = %id, %err, "plan updated without reminder");
                patch.notification_id = Some(None);
                ReminderOutcome::Failed(ReminderFailure::Notification(err))
            }
        };

        if let Err(err) = self.repository.update(user, id, patch).await {
            if let Some(handle) = reminder.handle() {
                self.cancel_quietly(handle).await;
            }
            return Err(PlanError::repository(Operation::UpdatePlan, Some(id), err));
        }
        info!(plan_id = %id, "plan updated");
        Ok(reminder)
    }

    /// Cancels the reminder first, then removes the record.
    #[instrument(skip(self))]
    pub async fn delete_plan(&self, user: &UserId, id: &PlanId) -> Result<DeletedPlan, PlanError> {
        let _guard = self.scheduler.lock_plan(id).await;
        let current = self.fetch(user, id, Operation::DeletePlan).await?;

        let reminder = match current.notification_id {
            None => CancelOutcome::NoReminder,
            Some(handle) => match self.scheduler.cancel(&handle).await {
                Ok(()) => CancelOutcome::Cancelled(handle),
                Err(error) => {
                    warn!(plan_id = %id, %handle, %error, "reminder could not be cancelled");
                    CancelOutcome::Failed { handle, error }
                }
            },
        };

        self.repository
            .delete(user, id)
            .await
            .map_err(|err| PlanError::repository(Operation::DeletePlan, Some(id), err))?;
        info!(plan_id = %id, "plan deleted");
        Ok(DeletedPlan {
            id: id.clone(),
            reminder,
        })
    }

    /// Flips pending/completed. The reminder is left alone.
    #[instrument(skip(self))]
    pub async fn toggle_completion(
        &self,
        user: &UserId,
        id: &PlanId,
    ) -> Result<PlanStatus, PlanError> {
        let _guard = self.scheduler.lock_plan(id).await;
        let current = self.fetch(user, id, Operation::ToggleCompletion).await?;
        let status = current.status.toggled();
        self.repository
            .update(user, id, PlanPatch::status(status))
            .await
            .map_err(|err| PlanError::repository(Operation::ToggleCompletion, Some(id), err))?;
        info!(plan_id = %id, %status, "plan status changed");
        Ok(status)
    }

    pub async fn get_plan(&self, user: &UserId, id: &PlanId) -> Result<PlanRecord, PlanError> {
        self.fetch(user, id, Operation::GetPlan).await
    }

    pub async fn list_plans(&self, user: &UserId) -> Result<Vec<PlanRecord>, PlanError> {
        self.query(user, &PlanFilter::all()).await
    }

    /// Plans starting on `date` in the given zone.
    pub async fn plans_on<Tz: TimeZone>(
        &self,
        user: &UserId,
        date: NaiveDate,
        tz: &Tz,
    ) -> Result<Vec<PlanRecord>, PlanError> {
        let from = local_midnight(date, tz);
        let until = date
            .succ_opt()
            .map(|next| local_midnight(next, tz))
            .map(Bound::Excluded)
            .unwrap_or(Bound::Unbounded);
        self.query(user, &PlanFilter::starting_in((Bound::Included(from), until)))
            .await
    }

    /// Plans starting within the configured window after `now`.
    pub async fn upcoming_reminders(
        &self,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PlanRecord>, PlanError> {
        let horizon = now + self.settings.upcoming_window();
        self.query(
            user,
            &PlanFilter::starting_in((Bound::Excluded(now), Bound::Included(horizon))),
        )
        .await
    }

    pub async fn subscribe(&self, user: &UserId) -> Result<Subscription, PlanError> {
        self.repository
            .subscribe(user)
            .await
            .map_err(|err| PlanError::repository(Operation::Subscribe, None, err))
    }
}

impl PlanService {
    async fn fetch(
        &self,
        user: &UserId,
        id: &PlanId,
        operation: Operation,
    ) -> Result<PlanRecord, PlanError> {
        self.repository
            .get(user, id)
            .await
            .and_then(|found| found.ok_or_else(|| RepositoryError::NotFound(id.clone())))
            .map_err(|err| PlanError::repository(operation, Some(id), err))
    }

    async fn query(&self, user: &UserId, filter: &PlanFilter) -> Result<Vec<PlanRecord>, PlanError> {
        self.repository
            .query(user, filter)
            .await
            .map_err(|err| PlanError::repository(Operation::ListPlans, None, err))
    }

    async fn cancel_quietly(&self, handle: &NotificationHandle) {
        if let Err(err) = self.scheduler.cancel(handle).await {
            warn!(%handle, %err, "reminder left scheduled");
        }
    }
}

/// First instant of `date` in `tz`. When midnight falls in a DST gap the day
/// starts at the first local time that exists.
fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..=24 * 4)
        .filter_map(|step| midnight.checked_add_signed(Duration::minutes(15 * step)))
        .find_map(|local| tz.from_local_datetime(&local).earliest())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}
