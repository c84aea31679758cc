use async_trait::async_trait;
use persona_core::model::{AssessmentId, AssessmentResult, UserId};

use super::SqliteRepository;
use super::mapping::{conn, map_result_row, to_json, user_id_to_text};
use crate::repository::{ResultId, ResultRepository, ResultRow, StorageError};

const RESULT_COLUMNS: &str = r"
    id, user_id, test_id, test_name, scores, percentage_score, answers,
    primary_profile, secondary_profile, completion_time_seconds, completed_at
";

#[async_trait]
impl ResultRepository for SqliteRepository {
    async fn append_result(&self, result: &AssessmentResult) -> Result<ResultId, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO test_results (
                    user_id, test_id, test_name, scores, percentage_score, answers,
                    primary_profile, secondary_profile, completion_time_seconds, completed_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
        )
        .bind(user_id_to_text(result.user_id()))
        .bind(result.assessment_id().as_str())
        .bind(result.assessment_name())
        .bind(to_json("scores", result.scores())?)
        .bind(i64::from(result.percentage_score()))
        .bind(to_json("answers", result.answers())?)
        .bind(result.primary_profile())
        .bind(result.secondary_profile())
        .bind(result.completion_time_seconds().map(i64::from))
        .bind(result.completed_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(res.last_insert_rowid())
    }

    async fn latest_result(
        &self,
        user_id: UserId,
        assessment_id: &AssessmentId,
    ) -> Result<Option<ResultRow>, StorageError> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM test_results
             WHERE user_id = ?1 AND test_id = ?2
             ORDER BY completed_at DESC, id DESC
             LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(user_id_to_text(user_id))
            .bind(assessment_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_result_row).transpose()
    }

    async fn list_results(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ResultRow>, StorageError> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM test_results
             WHERE user_id = ?1
             ORDER BY completed_at DESC, id DESC
             LIMIT ?2"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id_to_text(user_id))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_result_row(&row)?);
        }
        Ok(out)
    }
}
