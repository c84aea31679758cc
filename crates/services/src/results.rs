use std::sync::Arc;

use chrono::{DateTime, Utc};
use persona_core::model::{AssessmentId, AssessmentResult, UserId, UserStatistics};
use persona_core::profile::{Profile, rank};
use persona_core::scoring::normalize;
use storage::repository::{ResultId, ResultRepository, ResultRow, StatisticsRepository};
use tracing::{debug, warn};

//
// ─── ARCHIVE ───────────────────────────────────────────────────────────────────
//

/// Fail-safe, append-only access to finalized results.
///
/// Reads degrade to empty/absent on failure; `append` reports failure as `None`.
#[derive(Clone)]
pub struct ResultArchive {
    results: Arc<dyn ResultRepository>,
    statistics: Arc<dyn StatisticsRepository>,
}

impl ResultArchive {
    #[must_use]
    pub fn new(
        results: Arc<dyn ResultRepository>,
        statistics: Arc<dyn StatisticsRepository>,
    ) -> Self {
        Self {
            results,
            statistics,
        }
    }

    /// Insert a result. Returns its archive id, or `None` if the store refused it.
    pub async fn append(&self, result: &AssessmentResult) -> Option<ResultId> {
        match self.results.append_result(result).await {
            Ok(id) => {
                debug!(
                    user_id = %result.user_id(),
                    assessment_id = %result.assessment_id(),
                    result_id = id,
                    "result archived"
                );
                Some(id)
            }
            Err(err) => {
                warn!(
                    user_id = %result.user_id(),
                    assessment_id = %result.assessment_id(),
                    error = %err,
                    "failed to archive result"
                );
                None
            }
        }
    }

    /// Most recent result for the pair by completion time.
    pub async fn latest(
        &self,
        identity: Option<UserId>,
        assessment_id: &AssessmentId,
    ) -> Option<ResultRow> {
        let user_id = identity?;
        match self.results.latest_result(user_id, assessment_id).await {
            Ok(row) => row,
            Err(err) => {
                warn!(
                    user_id = %user_id,
                    assessment_id = %assessment_id,
                    error = %err,
                    "failed to load latest result"
                );
                None
            }
        }
    }

    /// Results for the identity, newest first. Ties on completion time
    /// are ordered by archive id, highest first.
    pub async fn history(&self, identity: Option<UserId>, limit: u32) -> Vec<ResultRow> {
        let Some(user_id) = identity else {
            return Vec::new();
        };
        match self.results.list_results(user_id, limit).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "failed to load result history");
                Vec::new()
            }
        }
    }

    /// Aggregate over the identity's results; absent for users without results.
    pub async fn statistics(&self, identity: Option<UserId>) -> Option<UserStatistics> {
        let user_id = identity?;
        match self.statistics.user_statistics(user_id).await {
            Ok(stats) => stats,
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "failed to load statistics");
                None
            }
        }
    }
}

//
// ─── VIEW ──────────────────────────────────────────────────────────────────────
//

/// One category line of a result, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryScore {
    pub category: String,
    pub raw: i32,
    pub normalized: u8,
}

/// Display model for a finalized result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultView {
    pub id: Option<ResultId>,
    pub assessment_name: String,
    pub completed_at: DateTime<Utc>,
    pub percentage_score: u8,
    /// Ranked like the profile derivation: highest score first.
    pub categories: Vec<CategoryScore>,
    pub primary: Profile,
    pub secondary: Option<Profile>,
    pub completion_time_seconds: Option<u32>,
}

impl ResultView {
    #[must_use]
    pub fn from_result(id: Option<ResultId>, result: &AssessmentResult) -> Self {
        let categories = rank(result.scores())
            .into_iter()
            .map(|(category, raw)| CategoryScore {
                normalized: normalize(raw),
                category,
                raw,
            })
            .collect();

        let primary = result.primary_profile().map_or_else(
            || persona_core::profile::derive(result.scores()),
            Profile::for_name,
        );
        let secondary = result.secondary_profile().map(Profile::for_name);

        Self {
            id,
            assessment_name: result.assessment_name().to_owned(),
            completed_at: result.completed_at(),
            percentage_score: result.percentage_score(),
            categories,
            primary,
            secondary,
            completion_time_seconds: result.completion_time_seconds(),
        }
    }

    #[must_use]
    pub fn from_row(row: &ResultRow) -> Self {
        Self::from_result(Some(row.id), &row.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use persona_core::profile::Category;
    use persona_core::scoring::ScoreVector;
    use persona_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, StorageError};

    struct Offline;

    #[async_trait]
    impl ResultRepository for Offline {
        async fn append_result(&self, _result: &AssessmentResult) -> Result<ResultId, StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn latest_result(
            &self,
            _user_id: UserId,
            _assessment_id: &AssessmentId,
        ) -> Result<Option<ResultRow>, StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn list_results(
            &self,
            _user_id: UserId,
            _limit: u32,
        ) -> Result<Vec<ResultRow>, StorageError> {
            Err(StorageError::Connection("offline".into()))
        }
    }

    #[async_trait]
    impl StatisticsRepository for Offline {
        async fn user_statistics(
            &self,
            _user_id: UserId,
        ) -> Result<Option<UserStatistics>, StorageError> {
            Err(StorageError::Connection("offline".into()))
        }
    }

    fn result(user: UserId, pct: u8, minutes: i64) -> AssessmentResult {
        let scores: ScoreVector = [
            ("openness".to_owned(), 4),
            ("conscientiousness".to_owned(), 4),
            ("neuroticism".to_owned(), -5),
        ]
        .into_iter()
        .collect();
        AssessmentResult::from_persisted(
            user,
            AssessmentId::new("big-five"),
            "Big Five".into(),
            scores,
            pct,
            Vec::new(),
            Some("openness".into()),
            Some("conscientiousness".into()),
            Some(120),
            fixed_now() + Duration::minutes(minutes),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn archive_round_trips_through_repository() {
        let repo = InMemoryRepository::new();
        let archive = ResultArchive::new(Arc::new(repo.clone()), Arc::new(repo));
        let user = UserId::random();
        let id = AssessmentId::new("big-five");

        let first = archive.append(&result(user, 40, 0)).await.unwrap();
        let second = archive.append(&result(user, 60, 5)).await.unwrap();
        assert_ne!(first, second);

        let latest = archive.latest(Some(user), &id).await.unwrap();
        assert_eq!(latest.id, second);

        let history = archive.history(Some(user), 10).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second);

        let stats = archive.statistics(Some(user)).await.unwrap();
        assert_eq!(stats.total_completed, 2);
    }

    #[tokio::test]
    async fn anonymous_identity_reads_nothing() {
        let repo = InMemoryRepository::new();
        let archive = ResultArchive::new(Arc::new(repo.clone()), Arc::new(repo));
        let id = AssessmentId::new("big-five");

        assert!(archive.latest(None, &id).await.is_none());
        assert!(archive.history(None, 10).await.is_empty());
        assert!(archive.statistics(None).await.is_none());
    }

    #[tokio::test]
    async fn store_failures_degrade_to_absent() {
        let archive = ResultArchive::new(Arc::new(Offline), Arc::new(Offline));
        let user = UserId::random();

        assert!(archive.append(&result(user, 40, 0)).await.is_none());
        assert!(
            archive
                .latest(Some(user), &AssessmentId::new("big-five"))
                .await
                .is_none()
        );
        assert!(archive.history(Some(user), 10).await.is_empty());
        assert!(archive.statistics(Some(user)).await.is_none());
    }

    #[test]
    fn view_ranks_and_normalizes_categories() {
        let view = ResultView::from_result(Some(7), &result(UserId::random(), 60, 0));

        let names: Vec<&str> = view.categories.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(names, vec!["openness", "conscientiousness", "neuroticism"]);
        assert_eq!(view.categories[0].normalized, 90);
        assert_eq!(view.categories[2].normalized, 0);
        assert_eq!(view.primary.category, Category::Openness);
        assert_eq!(
            view.secondary.map(|p| p.category),
            Some(Category::Conscientiousness)
        );
        assert_eq!(view.id, Some(7));
    }
}
