use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates progress, results (append-only), access grants, the per-user
/// statistics view and indexes.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        // One row per (user, test): the unique key is the upsert conflict target.
        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS test_progress (
                    id INTEGER PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    test_id TEXT NOT NULL,
                    total_questions INTEGER NOT NULL CHECK (total_questions > 0),
                    current_question_index INTEGER NOT NULL
                        CHECK (current_question_index BETWEEN 0 AND total_questions),
                    completed_questions TEXT NOT NULL,
                    answers TEXT NOT NULL,
                    progress_percentage REAL NOT NULL
                        CHECK (progress_percentage BETWEEN 0 AND 100),
                    last_updated TEXT NOT NULL,
                    UNIQUE (user_id, test_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS test_results (
                    id INTEGER PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    test_id TEXT NOT NULL,
                    test_name TEXT NOT NULL,
                    scores TEXT NOT NULL,
                    percentage_score INTEGER NOT NULL CHECK (percentage_score BETWEEN 0 AND 100),
                    answers TEXT NOT NULL,
                    primary_profile TEXT,
                    secondary_profile TEXT,
                    completion_time_seconds INTEGER CHECK (completion_time_seconds >= 0),
                    completed_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TRIGGER IF NOT EXISTS test_results_append_only
                BEFORE UPDATE ON test_results
                BEGIN
                    SELECT RAISE(ABORT, 'test_results is append-only');
                END;
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS test_access (
                    user_id TEXT NOT NULL,
                    test_id TEXT NOT NULL,
                    granted INTEGER NOT NULL CHECK (granted IN (0, 1)),
                    PRIMARY KEY (user_id, test_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE VIEW IF NOT EXISTS user_test_statistics AS
                SELECT
                    user_id,
                    COUNT(*) AS total_tests_completed,
                    AVG(percentage_score) AS average_score,
                    MAX(completed_at) AS last_test_date,
                    COUNT(DISTINCT test_id) AS unique_tests_taken
                FROM test_results
                GROUP BY user_id;
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_test_results_user_completed
                    ON test_results (user_id, completed_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_test_results_user_test_completed
                    ON test_results (user_id, test_id, completed_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
