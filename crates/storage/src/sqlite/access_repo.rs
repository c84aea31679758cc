use async_trait::async_trait;
use persona_core::model::{AssessmentId, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, ser, user_id_to_text};
use crate::repository::{AccessRepository, StorageError};

#[async_trait]
impl AccessRepository for SqliteRepository {
    async fn check_access(
        &self,
        user_id: UserId,
        assessment_id: &AssessmentId,
    ) -> Result<Option<bool>, StorageError> {
        let row = sqlx::query("SELECT granted FROM test_access WHERE user_id = ?1 AND test_id = ?2")
            .bind(user_id_to_text(user_id))
            .bind(assessment_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let granted: i64 = row.try_get("granted").map_err(ser)?;
        Ok(match granted {
            1 => Some(true),
            0 => Some(false),
            _ => None,
        })
    }

    async fn set_access(
        &self,
        user_id: UserId,
        assessment_id: &AssessmentId,
        granted: bool,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO test_access (user_id, test_id, granted)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(user_id, test_id) DO UPDATE SET granted = excluded.granted
            ",
        )
        .bind(user_id_to_text(user_id))
        .bind(assessment_id.as_str())
        .bind(i64::from(granted))
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}
