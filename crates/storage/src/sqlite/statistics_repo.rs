use async_trait::async_trait;
use persona_core::model::{UserId, UserStatistics};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, parse_timestamp, ser, u32_from_i64, user_id_to_text};
use crate::repository::{StatisticsRepository, StorageError};

#[async_trait]
impl StatisticsRepository for SqliteRepository {
    async fn user_statistics(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserStatistics>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    total_tests_completed, average_score, last_test_date, unique_tests_taken
                FROM user_test_statistics
                WHERE user_id = ?1
            ",
        )
        .bind(user_id_to_text(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        // Aggregate columns come back untyped, so the date is decoded from text.
        let last_test_date = row
            .try_get::<Option<String>, _>("last_test_date")
            .map_err(ser)?
            .map(|raw| parse_timestamp(&raw))
            .transpose()?;

        Ok(Some(UserStatistics {
            total_completed: u32_from_i64(
                "total_tests_completed",
                row.try_get::<i64, _>("total_tests_completed").map_err(ser)?,
            )?,
            average_score: row.try_get::<f64, _>("average_score").map_err(ser)?,
            last_test_date,
            unique_tests_taken: u32_from_i64(
                "unique_tests_taken",
                row.try_get::<i64, _>("unique_tests_taken").map_err(ser)?,
            )?,
        }))
    }
}
