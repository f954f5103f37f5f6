use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::PlanError;
use crate::plan::UserId;

/// Session collaborator. Credentials never pass through the core.
#[async_trait]
pub trait AuthSession: Send + Sync {
    fn current_user_id(&self) -> Option<UserId>;
    /// Emits the signed-in account whenever it changes.
    fn auth_state_changes(&self) -> watch::Receiver<Option<UserId>>;
    async fn sign_out(&self) -> Result<(), PlanError>;
}

pub fn require_user(session: &dyn AuthSession) -> Result<UserId, PlanError> {
    session.current_user_id().ok_or(PlanError::NotSignedIn)
}
