use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

use crate::plan::{PlanId, ValidationError};
use crate::repository::RepositoryError;

/// Coordinator operation an error was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    AddPlan,
    UpdatePlan,
    DeletePlan,
    ToggleCompletion,
    GetPlan,
    ListPlans,
    Subscribe,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::AddPlan => "add_plan",
            Operation::UpdatePlan => "update_plan",
            Operation::DeletePlan => "delete_plan",
            Operation::ToggleCompletion => "toggle_completion",
            Operation::GetPlan => "get_plan",
            Operation::ListPlans => "list_plans",
            Operation::Subscribe => "subscribe",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("invalid plan: {0}")]
    Validation(#[from] ValidationError),
    #[error("{operation} failed{}: {source}", plan_suffix(.plan_id))]
    Repository {
        operation: Operation,
        plan_id: Option<PlanId>,
        #[source]
        source: RepositoryError,
    },
    #[error("no user is signed in")]
    NotSignedIn,
    #[error("plan service is missing a {0}")]
    Configuration(&'static str),
}

impl PlanError {
    pub fn repository(
        operation: Operation,
        plan_id: Option<&PlanId>,
        source: RepositoryError,
    ) -> Self {
        PlanError::Repository {
            operation,
            plan_id: plan_id.cloned(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PlanError::Repository {
                source: RepositoryError::NotFound(_),
                ..
            }
        )
    }
}

fn plan_suffix(plan_id: &Option<PlanId>) -> String {
    plan_id
        .as_ref()
        .map(|id| format!(" for plan `{id}`"))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AggregationError {
    #[error("{year}-{month} is not a calendar month")]
    InvalidMonth { year: i32, month: u32 },
    #[error("range ends on {end} before it starts on {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("{weeks} weeks requested, at most {max} are supported")]
    TooManyWeeks { weeks: usize, max: usize },
    #[error("weekly series around {date} leaves the supported date range")]
    OutOfRange { date: NaiveDate },
}
