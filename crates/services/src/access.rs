use std::sync::Arc;

use persona_core::model::{AssessmentId, UserId};
use storage::repository::AccessRepository;
use tracing::{debug, warn};

/// Decides whether an identity may start an assessment.
///
/// Fails closed: no identity, a store error, a missing decision, or an
/// explicit denial all yield `false`.
#[derive(Clone)]
pub struct AccessGate {
    repo: Arc<dyn AccessRepository>,
}

impl AccessGate {
    #[must_use]
    pub fn new(repo: Arc<dyn AccessRepository>) -> Self {
        Self { repo }
    }

    pub async fn can_access(&self, identity: Option<UserId>, assessment_id: &AssessmentId) -> bool {
        let Some(user_id) = identity else {
            debug!(assessment_id = %assessment_id, "access denied: no authenticated user");
            return false;
        };

        match self.repo.check_access(user_id, assessment_id).await {
            Ok(Some(true)) => true,
            Ok(other) => {
                debug!(
                    user_id = %user_id,
                    assessment_id = %assessment_id,
                    decision = ?other,
                    "access denied"
                );
                false
            }
            Err(err) => {
                warn!(
                    user_id = %user_id,
                    assessment_id = %assessment_id,
                    error = %err,
                    "access check failed; denying"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use storage::repository::{InMemoryRepository, StorageError};

    struct BrokenAccess;

    #[async_trait]
    impl AccessRepository for BrokenAccess {
        async fn check_access(
            &self,
            _user_id: UserId,
            _assessment_id: &AssessmentId,
        ) -> Result<Option<bool>, StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn set_access(
            &self,
            _user_id: UserId,
            _assessment_id: &AssessmentId,
            _granted: bool,
        ) -> Result<(), StorageError> {
            Err(StorageError::Connection("offline".into()))
        }
    }

    #[tokio::test]
    async fn grants_only_explicit_true() {
        let repo = InMemoryRepository::new();
        let gate = AccessGate::new(Arc::new(repo.clone()));
        let user = UserId::random();
        let id = AssessmentId::new("big-five");

        assert!(!gate.can_access(Some(user), &id).await);
        repo.set_access(user, &id, false).await.unwrap();
        assert!(!gate.can_access(Some(user), &id).await);
        repo.set_access(user, &id, true).await.unwrap();
        assert!(gate.can_access(Some(user), &id).await);
    }

    #[tokio::test]
    async fn missing_identity_is_denied() {
        let repo = InMemoryRepository::new();
        let id = AssessmentId::new("big-five");
        repo.set_access(UserId::random(), &id, true).await.unwrap();
        let gate = AccessGate::new(Arc::new(repo));
        assert!(!gate.can_access(None, &id).await);
    }

    #[tokio::test]
    async fn store_errors_fail_closed() {
        let gate = AccessGate::new(Arc::new(BrokenAccess));
        assert!(
            !gate
                .can_access(Some(UserId::random()), &AssessmentId::new("big-five"))
                .await
        );
    }
}
