use chrono::{DateTime, Utc};
use persona_core::model::{
    AnswerRecord, AssessmentId, AssessmentResult, QuestionId, SessionProgress, UserId,
};
use persona_core::scoring::ScoreVector;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;

use crate::repository::{ResultRow, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn user_id_to_text(id: UserId) -> String {
    id.to_string()
}

pub(crate) fn user_id_from_text(raw: &str) -> Result<UserId, StorageError> {
    raw.parse::<UserId>().map_err(ser)
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn to_json<T: Serialize + ?Sized>(field: &'static str, v: &T) -> Result<String, StorageError> {
    serde_json::to_string(v)
        .map_err(|e| StorageError::Serialization(format!("encode {field}: {e}")))
}

pub(crate) fn from_json<T: DeserializeOwned>(field: &'static str, raw: &str) -> Result<T, StorageError> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::Serialization(format!("decode {field}: {e}")))
}

/// Parses a timestamp written by the `chrono` encoder (RFC 3339).
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("invalid timestamp {raw}: {e}")))
}

pub(crate) fn map_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<SessionProgress, StorageError> {
    let user_id = user_id_from_text(&row.try_get::<String, _>("user_id").map_err(ser)?)?;
    let test_id = AssessmentId::new(row.try_get::<String, _>("test_id").map_err(ser)?);
    let total = u32_from_i64(
        "total_questions",
        row.try_get::<i64, _>("total_questions").map_err(ser)?,
    )?;
    let index = u32_from_i64(
        "current_question_index",
        row.try_get::<i64, _>("current_question_index").map_err(ser)?,
    )?;
    let completed: Vec<QuestionId> = from_json(
        "completed_questions",
        &row.try_get::<String, _>("completed_questions").map_err(ser)?,
    )?;
    let answers: Vec<AnswerRecord> =
        from_json("answers", &row.try_get::<String, _>("answers").map_err(ser)?)?;
    let last_updated: DateTime<Utc> = row.try_get("last_updated").map_err(ser)?;

    // progress_percentage is derived; the stored column is informational only.
    SessionProgress::from_persisted(user_id, test_id, total, index, completed, answers, last_updated)
        .map_err(ser)
}

pub(crate) fn map_result_row(row: &sqlx::sqlite::SqliteRow) -> Result<ResultRow, StorageError> {
    let id: i64 = row.try_get("id").map_err(ser)?;
    let user_id = user_id_from_text(&row.try_get::<String, _>("user_id").map_err(ser)?)?;
    let scores: ScoreVector = from_json("scores", &row.try_get::<String, _>("scores").map_err(ser)?)?;
    let answers: Vec<AnswerRecord> =
        from_json("answers", &row.try_get::<String, _>("answers").map_err(ser)?)?;
    let percentage = row.try_get::<i64, _>("percentage_score").map_err(ser)?;
    let percentage = u8::try_from(percentage)
        .map_err(|_| StorageError::Serialization(format!("invalid percentage_score: {percentage}")))?;
    let completion_time = row
        .try_get::<Option<i64>, _>("completion_time_seconds")
        .map_err(ser)?
        .map(|v| u32_from_i64("completion_time_seconds", v))
        .transpose()?;

    let result = AssessmentResult::from_persisted(
        user_id,
        AssessmentId::new(row.try_get::<String, _>("test_id").map_err(ser)?),
        row.try_get("test_name").map_err(ser)?,
        scores,
        percentage,
        answers,
        row.try_get("primary_profile").map_err(ser)?,
        row.try_get("secondary_profile").map_err(ser)?,
        completion_time,
        row.try_get("completed_at").map_err(ser)?,
    )
    .map_err(ser)?;

    Ok(ResultRow::new(id, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_text_round_trips() {
        let id = UserId::random();
        assert_eq!(user_id_from_text(&user_id_to_text(id)).unwrap(), id);
        assert!(matches!(
            user_id_from_text("nope"),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn parses_chrono_encoded_timestamps() {
        let ts = parse_timestamp("2023-11-14T22:13:20+00:00").unwrap();
        assert_eq!(ts, persona_core::time::fixed_now());
    }

    #[test]
    fn negative_counts_are_rejected() {
        assert!(u32_from_i64("total_questions", -1).is_err());
    }
}
