//! In-process bindings for the collaborators the planner core consumes.

mod platform;
mod session;
mod store;

pub use crate::platform::MemoryNotificationPlatform;
pub use crate::session::StaticAuthSession;
pub use crate::store::{MemoryPlanStore, StoreOp};
