use async_trait::async_trait;
use plan_domain::{auth::AuthSession, plan::UserId, PlanError};
use tokio::sync::watch;
use tracing::info;

/// Session whose signed-in account is set directly, for tests and the
/// headless runner.
pub struct StaticAuthSession {
    state: watch::Sender<Option<UserId>>,
}

impl StaticAuthSession {
    pub fn signed_in(user: UserId) -> Self {
        Self {
            state: watch::Sender::new(Some(user)),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            state: watch::Sender::new(None),
        }
    }
}

#[async_trait]
impl AuthSession for StaticAuthSession {
    fn current_user_id(&self) -> Option<UserId> {
        self.state.borrow().clone()
    }

    fn auth_state_changes(&self) -> watch::Receiver<Option<UserId>> {
        self.state.subscribe()
    }

    async fn sign_out(&self) -> Result<(), PlanError> {
        if self.state.send_replace(None).is_some() {
            info!("signed out");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plan_domain::auth::require_user;

    #[tokio::test]
    async fn sign_out_is_observed_by_watchers() {
        let session = StaticAuthSession::signed_in(UserId::new("u1"));
        let mut changes = session.auth_state_changes();
        assert_eq!(require_user(&session).unwrap(), UserId::new("u1"));

        session.sign_out().await.unwrap();
        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow(), None);
        assert!(matches!(require_user(&session), Err(PlanError::NotSignedIn)));
    }

    #[test]
    fn signed_out_session_has_no_user() {
        let session = StaticAuthSession::signed_out();
        assert_eq!(*session.auth_state_changes().borrow(), None);
        assert!(matches!(require_user(&session), Err(PlanError::NotSignedIn)));
    }
}
