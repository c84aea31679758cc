use async_trait::async_trait;
use persona_core::model::{AssessmentId, SessionProgress, UserId};

use super::SqliteRepository;
use super::mapping::{conn, map_progress_row, to_json, user_id_to_text};
use crate::repository::{ProgressRepository, StorageError};

#[async_trait]
impl ProgressRepository for SqliteRepository {
    async fn upsert_progress(&self, progress: &SessionProgress) -> Result<(), StorageError> {
        // Conflict key (user_id, test_id): the later write replaces every column.
        sqlx::query(
            r"
                INSERT INTO test_progress (
                    user_id, test_id, total_questions, current_question_index,
                    completed_questions, answers, progress_percentage, last_updated
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(user_id, test_id) DO UPDATE SET
                    total_questions = excluded.total_questions,
                    current_question_index = excluded.current_question_index,
                    completed_questions = excluded.completed_questions,
                    answers = excluded.answers,
                    progress_percentage = excluded.progress_percentage,
                    last_updated = excluded.last_updated
            ",
        )
        .bind(user_id_to_text(progress.user_id()))
        .bind(progress.assessment_id().as_str())
        .bind(i64::from(progress.total_questions()))
        .bind(i64::from(progress.current_question_index()))
        .bind(to_json("completed_questions", progress.completed_question_ids())?)
        .bind(to_json("answers", progress.answers())?)
        .bind(progress.progress_percentage())
        .bind(progress.last_updated())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_progress(
        &self,
        user_id: UserId,
        assessment_id: &AssessmentId,
    ) -> Result<Option<SessionProgress>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    user_id, test_id, total_questions, current_question_index,
                    completed_questions, answers, last_updated
                FROM test_progress
                WHERE user_id = ?1 AND test_id = ?2
            ",
        )
        .bind(user_id_to_text(user_id))
        .bind(assessment_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn delete_progress(
        &self,
        user_id: UserId,
        assessment_id: &AssessmentId,
    ) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM test_progress WHERE user_id = ?1 AND test_id = ?2")
            .bind(user_id_to_text(user_id))
            .bind(assessment_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}
