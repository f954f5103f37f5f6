use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, Local, Utc};
use plan_domain::{
    auth::{require_user, AuthSession},
    plan::{PlanDraft, UserId},
    repository::Snapshot,
    settings::PlannerSettings,
    statistics::MAX_SERIES_WEEKS,
    views::{PlanViews, ViewRequest},
    PlanService,
};
use plan_store::{MemoryNotificationPlatform, MemoryPlanStore, StaticAuthSession};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub(crate) user_id: String,
    pub(crate) settings: PlannerSettings,
    pub(crate) seed_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(user) = lookup("PLANNER_USER_ID") {
            let user = user.trim();
            if !user.is_empty() {
                config.user_id = user.to_string();
            }
        }
        if let Some(lead) = lookup("PLANNER_REMINDER_LEAD_MINUTES") {
            if let Ok(value) = lead.trim().parse::<i64>() {
                config.settings.reminder_lead_minutes = value.max(0);
            }
        }
        if let Some(window) = lookup("PLANNER_UPCOMING_WINDOW_MINUTES") {
            if let Ok(value) = window.trim().parse::<i64>() {
                config.settings.upcoming_window_minutes = value.max(0);
            }
        }
        if let Some(weeks) = lookup("PLANNER_STATS_WEEKS") {
            if let Ok(value) = weeks.trim().parse::<usize>() {
                if value > 0 {
                    config.settings.statistics_weeks = value.min(MAX_SERIES_WEEKS);
                }
            }
        }
        if let Some(path) = lookup("PLANNER_SEED_FILE") {
            if !path.trim().is_empty() {
                info!(path = %path, "seed file configured");
                config.seed_file = Some(PathBuf::from(path));
            }
        }
        config
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_id: "local".to_string(),
            settings: PlannerSettings::default(),
            seed_file: None,
        }
    }
}

/// Runs the planner against the in-process bindings and logs the derived
/// views for every snapshot until interrupted or signed out.
pub async fn run(config: AppConfig) -> Result<()> {
    info!(user = %config.user_id, "starting planner");
    let store = Arc::new(MemoryPlanStore::new());
    let platform = Arc::new(MemoryNotificationPlatform::new());
    let session = StaticAuthSession::signed_in(UserId::new(config.user_id.clone()));

    let service = PlanService::builder()
        .with_repository(store)
        .with_notification_platform(platform)
        .with_settings(config.settings)
        .build()
        .context("failed to initialise plan service")?;

    match service.scheduler().request_permission().await {
        Ok(true) => debug!("notification permission granted"),
        Ok(false) => warn!("reminders disabled: notification permission denied"),
        Err(err) => warn!(%err, "notification permission request failed"),
    }

    let user = require_user(&session).context("no account to load plans for")?;
    let mut live = service
        .subscribe(&user)
        .await
        .context("failed to subscribe to plans")?;

    if let Some(path) = &config.seed_file {
        let drafts = load_seed(path)?;
        seed_plans(&service, &user, drafts).await;
    }

    let mut auth_changes = session.auth_state_changes();
    loop {
        tokio::select! {
            snapshot = live.next() => match snapshot {
                Some(snapshot) => log_views(&snapshot, &config)?,
                None => break,
            },
            changed = auth_changes.changed() => {
                if changed.is_err() || auth_changes.borrow().is_none() {
                    info!("signed out; stopping");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }
    live.unsubscribe();
    Ok(())
}

fn load_seed(path: &Path) -> Result<Vec<PlanDraft>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    parse_seed(&text).with_context(|| format!("invalid seed file {}", path.display()))
}

pub(crate) fn parse_seed(text: &str) -> Result<Vec<PlanDraft>> {
    Ok(serde_json::from_str(text)?)
}

async fn seed_plans(service: &PlanService, user: &UserId, drafts: Vec<PlanDraft>) {
    let total = drafts.len();
    let mut added = 0usize;
    for draft in drafts {
        let title = draft.title.clone();
        match service.add_plan(user, draft).await {
            Ok(plan) => {
                debug!(plan_id = %plan.id, reminder = ?plan.reminder, "seeded plan");
                added += 1;
            }
            Err(err) => warn!(%title, %err, "skipping seed entry"),
        }
    }
    info!(added, total, "seed file loaded");
}

pub(crate) fn view_request(settings: &PlannerSettings) -> ViewRequest {
    let now = Utc::now();
    let today = now.with_timezone(&Local).date_naive();
    ViewRequest {
        year: today.year(),
        month: today.month(),
        range_start: today - Duration::days(6),
        range_end: today,
        today,
        weeks: settings.statistics_weeks,
        now,
        upcoming_window: settings.upcoming_window(),
    }
}

fn log_views(snapshot: &Snapshot, config: &AppConfig) -> Result<()> {
    let request = view_request(&config.settings);
    let views = PlanViews::from_snapshot(snapshot, &request, &Local)
        .context("failed to derive plan views")?;
    let rendered = serde_json::to_string(&views).context("failed to render plan views")?;
    info!(
        plan_count = snapshot.len(),
        upcoming = views.upcoming.len(),
        views = %rendered,
        "snapshot received"
    );
    Ok(())
}
