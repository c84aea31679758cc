use std::sync::Arc;

use persona_core::model::{AssessmentId, SessionProgress, UserId};
use storage::repository::{ProgressRepository, StorageError};
use tracing::{debug, warn};

/// Fail-safe adapter over `ProgressRepository`.
///
/// Every call is a single round-trip with no caching or retry. Failures are
/// logged and reported as `None` / `false`; nothing is propagated.
/// Concurrent writers for the same (user, assessment) pair collapse onto one
/// row, and the most recent successful `save` wins.
#[derive(Clone)]
pub struct ProgressStore {
    repo: Arc<dyn ProgressRepository>,
}

impl ProgressStore {
    #[must_use]
    pub fn new(repo: Arc<dyn ProgressRepository>) -> Self {
        Self { repo }
    }

    /// Stored progress for the pair; a load failure reads as "never started".
    pub async fn load(
        &self,
        user_id: UserId,
        assessment_id: &AssessmentId,
    ) -> Option<SessionProgress> {
        match self.repo.get_progress(user_id, assessment_id).await {
            Ok(progress) => progress,
            Err(StorageError::NotFound) => None,
            Err(err) => {
                warn!(
                    user_id = %user_id,
                    assessment_id = %assessment_id,
                    error = %err,
                    "failed to load progress; treating as not started"
                );
                None
            }
        }
    }

    /// Upsert progress; `true` only once the store confirmed the write.
    pub async fn save(&self, progress: &SessionProgress) -> bool {
        match self.repo.upsert_progress(progress).await {
            Ok(()) => {
                debug!(
                    user_id = %progress.user_id(),
                    assessment_id = %progress.assessment_id(),
                    index = progress.current_question_index(),
                    "progress saved"
                );
                true
            }
            Err(err) => {
                warn!(
                    user_id = %progress.user_id(),
                    assessment_id = %progress.assessment_id(),
                    error = %err,
                    "failed to save progress"
                );
                false
            }
        }
    }

    /// Remove progress for the pair. Already-absent rows count as success.
    pub async fn delete(&self, user_id: UserId, assessment_id: &AssessmentId) -> bool {
        match self.repo.delete_progress(user_id, assessment_id).await {
            Ok(()) | Err(StorageError::NotFound) => true,
            Err(err) => {
                warn!(
                    user_id = %user_id,
                    assessment_id = %assessment_id,
                    error = %err,
                    "failed to delete progress"
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
    use persona_core::model::{AnswerId, AnswerRecord, QuestionId};
    use persona_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    struct Failing(StorageError);

    impl Failing {
        fn err(&self) -> StorageError {
            match &self.0 {
                StorageError::NotFound => StorageError::NotFound,
                other => StorageError::Connection(other.to_string()),
            }
        }
    }

    #[async_trait]
    impl ProgressRepository for Failing {
        async fn upsert_progress(&self, _progress: &SessionProgress) -> Result<(), StorageError> {
            Err(self.err())
        }

        async fn get_progress(
            &self,
            _user_id: UserId,
            _assessment_id: &AssessmentId,
        ) -> Result<Option<SessionProgress>, StorageError> {
            Err(self.err())
        }

        async fn delete_progress(
            &self,
            _user_id: UserId,
            _assessment_id: &AssessmentId,
        ) -> Result<(), StorageError> {
            Err(self.err())
        }
    }

    fn progress(user: UserId) -> SessionProgress {
        let mut p =
            SessionProgress::start(user, AssessmentId::new("big-five"), 2, fixed_now()).unwrap();
        p.record_answer(
            AnswerRecord::new(QuestionId::new("q1"), AnswerId::new("a")),
            fixed_now(),
        )
        .unwrap();
        p
    }

    #[tokio::test]
    async fn save_load_delete_round_trip() {
        let store = ProgressStore::new(Arc::new(InMemoryRepository::new()));
        let user = UserId::random();
        let id = AssessmentId::new("big-five");
        let saved = progress(user);

        assert!(store.save(&saved).await);
        let loaded = store.load(user, &id).await.unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.current_question_label(), 2);

        assert!(store.delete(user, &id).await);
        assert!(store.load(user, &id).await.is_none());
        assert!(store.delete(user, &id).await);
    }

    #[tokio::test]
    async fn failures_degrade_to_absent_and_false() {
        let store = ProgressStore::new(Arc::new(Failing(StorageError::Connection(
            "timeout".into(),
        ))));
        let user = UserId::random();
        let id = AssessmentId::new("big-five");

        assert!(store.load(user, &id).await.is_none());
        assert!(!store.save(&progress(user)).await);
        assert!(!store.delete(user, &id).await);
    }

    #[tokio::test]
    async fn not_found_is_a_normal_outcome() {
        let store = ProgressStore::new(Arc::new(Failing(StorageError::NotFound)));
        let user = UserId::random();
        let id = AssessmentId::new("big-five");

        assert!(store.load(user, &id).await.is_none());
        assert!(store.delete(user, &id).await);
    }
}
