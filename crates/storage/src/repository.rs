use async_trait::async_trait;
use persona_core::model::{AssessmentId, AssessmentResult, SessionProgress, UserId, UserStatistics};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Storage identifier for an archived result.
///
/// NOTE: This is `i64` to match `SQLite` row IDs.
pub type ResultId = i64;

/// An archived result together with its storage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub id: ResultId,
    pub result: AssessmentResult,
}

impl ResultRow {
    #[must_use]
    pub fn new(id: ResultId, result: AssessmentResult) -> Self {
        Self { id, result }
    }
}

/// Repository contract for in-flight session progress.
///
/// Merge policy: rows are keyed by `(user_id, assessment_id)`. A write for an
/// existing key replaces the stored row entirely (last writer wins, no field
/// merge). Every implementation must keep this unique-key overwrite semantic.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Insert or overwrite the progress row for the progress' (user, assessment) pair.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn upsert_progress(&self, progress: &SessionProgress) -> Result<(), StorageError>;

    /// Fetch the progress row for a pair, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn get_progress(
        &self,
        user_id: UserId,
        assessment_id: &AssessmentId,
    ) -> Result<Option<SessionProgress>, StorageError>;

    /// Remove the progress row for a pair. Removing a missing row succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete cannot be executed.
    async fn delete_progress(
        &self,
        user_id: UserId,
        assessment_id: &AssessmentId,
    ) -> Result<(), StorageError>;
}

/// Append-only repository for finalized results.
#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Insert a new result row. Never updates an existing row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn append_result(&self, result: &AssessmentResult) -> Result<ResultId, StorageError>;

    /// Most recent result (by completion time, then id) for a pair.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn latest_result(
        &self,
        user_id: UserId,
        assessment_id: &AssessmentId,
    ) -> Result<Option<ResultRow>, StorageError>;

    /// Results for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn list_results(&self, user_id: UserId, limit: u32)
    -> Result<Vec<ResultRow>, StorageError>;
}

/// Read-only aggregate over a user's results.
#[async_trait]
pub trait StatisticsRepository: Send + Sync {
    /// Aggregate for a user; `None` when the user has no results.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn user_statistics(&self, user_id: UserId)
    -> Result<Option<UserStatistics>, StorageError>;
}

/// Remote access check for assessments.
#[async_trait]
pub trait AccessRepository: Send + Sync {
    /// Raw answer of the access procedure; `None` means no decision was returned.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the check cannot be executed.
    async fn check_access(
        &self,
        user_id: UserId,
        assessment_id: &AssessmentId,
    ) -> Result<Option<bool>, StorageError>;

    /// Record an access decision for a pair, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the grant cannot be stored.
    async fn set_access(
        &self,
        user_id: UserId,
        assessment_id: &AssessmentId,
        granted: bool,
    ) -> Result<(), StorageError>;
}

type PairKey = (UserId, AssessmentId);

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<PairKey, SessionProgress>>>,
    results: Arc<Mutex<Vec<ResultRow>>>,
    access: Arc<Mutex<HashMap<PairKey, bool>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn newest_first(a: &ResultRow, b: &ResultRow) -> std::cmp::Ordering {
    b.result
        .completed_at()
        .cmp(&a.result.completed_at())
        .then_with(|| b.id.cmp(&a.id))
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn upsert_progress(&self, progress: &SessionProgress) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        guard.insert(
            (progress.user_id(), progress.assessment_id().clone()),
            progress.clone(),
        );
        Ok(())
    }

    async fn get_progress(
        &self,
        user_id: UserId,
        assessment_id: &AssessmentId,
    ) -> Result<Option<SessionProgress>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.get(&(user_id, assessment_id.clone())).cloned())
    }

    async fn delete_progress(
        &self,
        user_id: UserId,
        assessment_id: &AssessmentId,
    ) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        guard.remove(&(user_id, assessment_id.clone()));
        Ok(())
    }
}

#[async_trait]
impl ResultRepository for InMemoryRepository {
    async fn append_result(&self, result: &AssessmentResult) -> Result<ResultId, StorageError> {
        let mut guard = self.results.lock().map_err(poisoned)?;
        let id = ResultId::try_from(guard.len() + 1)
            .map_err(|_| StorageError::Serialization("result id overflow".into()))?;
        guard.push(ResultRow::new(id, result.clone()));
        Ok(id)
    }

    async fn latest_result(
        &self,
        user_id: UserId,
        assessment_id: &AssessmentId,
    ) -> Result<Option<ResultRow>, StorageError> {
        let guard = self.results.lock().map_err(poisoned)?;
        Ok(guard
            .iter()
            .filter(|row| {
                row.result.user_id() == user_id && row.result.assessment_id() == assessment_id
            })
            .min_by(|a, b| newest_first(a, b))
            .cloned())
    }

    async fn list_results(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ResultRow>, StorageError> {
        let guard = self.results.lock().map_err(poisoned)?;
        let mut rows: Vec<ResultRow> = guard
            .iter()
            .filter(|row| row.result.user_id() == user_id)
            .cloned()
            .collect();
        rows.sort_by(newest_first);
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }
}

#[async_trait]
impl StatisticsRepository for InMemoryRepository {
    async fn user_statistics(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserStatistics>, StorageError> {
        let guard = self.results.lock().map_err(poisoned)?;
        let mine: Vec<&AssessmentResult> = guard
            .iter()
            .map(|row| &row.result)
            .filter(|r| r.user_id() == user_id)
            .collect();
        if mine.is_empty() {
            return Ok(None);
        }

        let total = u32::try_from(mine.len())
            .map_err(|_| StorageError::Serialization("result count overflow".into()))?;
        let sum: u32 = mine.iter().map(|r| u32::from(r.percentage_score())).sum();
        let unique: HashSet<&AssessmentId> = mine.iter().map(|r| r.assessment_id()).collect();
        let unique_tests_taken = u32::try_from(unique.len())
            .map_err(|_| StorageError::Serialization("unique count overflow".into()))?;

        Ok(Some(UserStatistics {
            total_completed: total,
            average_score: f64::from(sum) / f64::from(total),
            last_test_date: mine.iter().map(|r| r.completed_at()).max(),
            unique_tests_taken,
        }))
    }
}

#[async_trait]
impl AccessRepository for InMemoryRepository {
    async fn check_access(
        &self,
        user_id: UserId,
        assessment_id: &AssessmentId,
    ) -> Result<Option<bool>, StorageError> {
        let guard = self.access.lock().map_err(poisoned)?;
        Ok(guard.get(&(user_id, assessment_id.clone())).copied())
    }

    async fn set_access(
        &self,
        user_id: UserId,
        assessment_id: &AssessmentId,
        granted: bool,
    ) -> Result<(), StorageError> {
        let mut guard = self.access.lock().map_err(poisoned)?;
        guard.insert((user_id, assessment_id.clone()), granted);
        Ok(())
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub results: Arc<dyn ResultRepository>,
    pub statistics: Arc<dyn StatisticsRepository>,
    pub access: Arc<dyn AccessRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            progress: Arc::new(repo.clone()),
            results: Arc::new(repo.clone()),
            statistics: Arc::new(repo.clone()),
            access: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use persona_core::model::{AnswerId, AnswerRecord, QuestionId};
    use persona_core::scoring::ScoreVector;
    use persona_core::time::fixed_now;

    fn progress(user: UserId, answered: &[&str]) -> SessionProgress {
        let mut p =
            SessionProgress::start(user, AssessmentId::new("big-five"), 3, fixed_now()).unwrap();
        for q in answered {
            p.record_answer(
                AnswerRecord::new(QuestionId::new(*q), AnswerId::new("a")),
                fixed_now(),
            )
            .unwrap();
        }
        p
    }

    fn result(user: UserId, test: &str, pct: u8, minutes: i64) -> AssessmentResult {
        AssessmentResult::from_persisted(
            user,
            AssessmentId::new(test),
            test.to_uppercase(),
            ScoreVector::new(),
            pct,
            Vec::new(),
            None,
            None,
            None,
            fixed_now() + Duration::minutes(minutes),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn upsert_overwrites_same_pair() {
        let repo = InMemoryRepository::new();
        let user = UserId::random();
        repo.upsert_progress(&progress(user, &["q1"])).await.unwrap();
        repo.upsert_progress(&progress(user, &["q1", "q2"])).await.unwrap();

        let stored = repo
            .get_progress(user, &AssessmentId::new("big-five"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.current_question_index(), 2);
        assert_eq!(repo.progress.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let repo = InMemoryRepository::new();
        let user = UserId::random();
        let id = AssessmentId::new("big-five");
        repo.upsert_progress(&progress(user, &[])).await.unwrap();

        repo.delete_progress(user, &id).await.unwrap();
        repo.delete_progress(user, &id).await.unwrap();
        assert!(repo.get_progress(user, &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn results_are_append_only_and_ordered() {
        let repo = InMemoryRepository::new();
        let user = UserId::random();
        let other = UserId::random();

        repo.append_result(&result(user, "big-five", 40, 0)).await.unwrap();
        repo.append_result(&result(user, "big-five", 60, 10)).await.unwrap();
        repo.append_result(&result(user, "enneagram", 80, 5)).await.unwrap();
        repo.append_result(&result(other, "big-five", 10, 20)).await.unwrap();

        let latest = repo
            .latest_result(user, &AssessmentId::new("big-five"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.result.percentage_score(), 60);

        let history = repo.list_results(user, 10).await.unwrap();
        let scores: Vec<u8> = history.iter().map(|r| r.result.percentage_score()).collect();
        assert_eq!(scores, vec![60, 80, 40]);

        let limited = repo.list_results(user, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn statistics_aggregate_user_results() {
        let repo = InMemoryRepository::new();
        let user = UserId::random();
        assert!(repo.user_statistics(user).await.unwrap().is_none());

        repo.append_result(&result(user, "big-five", 40, 0)).await.unwrap();
        repo.append_result(&result(user, "big-five", 60, 10)).await.unwrap();
        repo.append_result(&result(user, "enneagram", 80, 5)).await.unwrap();

        let stats = repo.user_statistics(user).await.unwrap().unwrap();
        assert_eq!(stats.total_completed, 3);
        assert_eq!(stats.unique_tests_taken, 2);
        assert!((stats.average_score - 60.0).abs() < f64::EPSILON);
        assert_eq!(stats.last_test_date, Some(fixed_now() + Duration::minutes(10)));
    }

    #[tokio::test]
    async fn access_defaults_to_no_decision() {
        let repo = InMemoryRepository::new();
        let user = UserId::random();
        let id = AssessmentId::new("big-five");
        assert_eq!(repo.check_access(user, &id).await.unwrap(), None);

        repo.set_access(user, &id, true).await.unwrap();
        assert_eq!(repo.check_access(user, &id).await.unwrap(), Some(true));
    }
}
