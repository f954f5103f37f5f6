pub mod auth;
pub mod calendar;
pub mod error;
pub mod notifications;
pub mod plan;
pub mod repository;
pub mod service;
pub mod settings;
pub mod statistics;
pub mod views;

pub use crate::error::{AggregationError, Operation, PlanError};
pub use crate::plan::{validate, PlanDraft, PlanId, PlanRecord, PlanStatus, UserId, ValidationError};
pub use crate::service::{PlanService, PlanServiceBuilder};
