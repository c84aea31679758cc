use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::{AnswerId, AssessmentId, QuestionId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("assessment must have at least one question")]
    NoQuestions,

    #[error("question index {index} exceeds total questions {total}")]
    IndexOutOfRange { index: u32, total: u32 },

    #[error("{completed} completed questions exceed total questions {total}")]
    TooManyCompleted { completed: usize, total: u32 },

    #[error("question {0} was already answered")]
    AlreadyAnswered(QuestionId),

    #[error("answers ({answers}) do not match completed questions ({completed})")]
    AnswerCountMismatch { answers: usize, completed: usize },

    #[error("question index {index} does not match {completed} completed questions")]
    IndexMismatch { index: u32, completed: usize },

    #[error("answer at position {position} is for question {answered}, expected {expected}")]
    AnswerOrderMismatch {
        position: usize,
        expected: QuestionId,
        answered: QuestionId,
    },

    #[error("all questions have been answered")]
    Exhausted,
}

//
// ─── ANSWER RECORD ─────────────────────────────────────────────────────────────
//

/// A submitted (question, answer) pair. Append-only within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_id: QuestionId,
    pub answer_id: AnswerId,
}

impl AnswerRecord {
    #[must_use]
    pub fn new(question_id: QuestionId, answer_id: AnswerId) -> Self {
        Self {
            question_id,
            answer_id,
        }
    }
}

//
// ─── SESSION PROGRESS ──────────────────────────────────────────────────────────
//

/// Resumable, in-flight progress for one (user, assessment) pair.
///
/// The completion percentage is never stored on this type; it is always
/// derived from the completed set and the total question count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    user_id: UserId,
    assessment_id: AssessmentId,
    total_questions: u32,
    current_question_index: u32,
    completed_question_ids: Vec<QuestionId>,
    answers: Vec<AnswerRecord>,
    last_updated: DateTime<Utc>,
}

impl SessionProgress {
    /// Fresh progress at question index 0.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NoQuestions` if `total_questions` is zero.
    pub fn start(
        user_id: UserId,
        assessment_id: AssessmentId,
        total_questions: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, ProgressError> {
        if total_questions == 0 {
            return Err(ProgressError::NoQuestions);
        }
        Ok(Self {
            user_id,
            assessment_id,
            total_questions,
            current_question_index: 0,
            completed_question_ids: Vec::new(),
            answers: Vec::new(),
            last_updated: now,
        })
    }

    /// Rehydrate progress from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the index or completed set violate the
    /// bounds implied by `total_questions`, if the index differs from the
    /// completed count, or if answers and completed ids diverge.
    pub fn from_persisted(
        user_id: UserId,
        assessment_id: AssessmentId,
        total_questions: u32,
        current_question_index: u32,
        completed_question_ids: Vec<QuestionId>,
        answers: Vec<AnswerRecord>,
        last_updated: DateTime<Utc>,
    ) -> Result<Self, ProgressError> {
        if total_questions == 0 {
            return Err(ProgressError::NoQuestions);
        }
        if current_question_index > total_questions {
            return Err(ProgressError::IndexOutOfRange {
                index: current_question_index,
                total: total_questions,
            });
        }
        if completed_question_ids.len() > total_questions as usize {
            return Err(ProgressError::TooManyCompleted {
                completed: completed_question_ids.len(),
                total: total_questions,
            });
        }
        let mut seen = HashSet::with_capacity(completed_question_ids.len());
        for id in &completed_question_ids {
            if !seen.insert(id) {
                return Err(ProgressError::AlreadyAnswered(id.clone()));
            }
        }
        if answers.len() != completed_question_ids.len() {
            return Err(ProgressError::AnswerCountMismatch {
                answers: answers.len(),
                completed: completed_question_ids.len(),
            });
        }
        if current_question_index as usize != completed_question_ids.len() {
            return Err(ProgressError::IndexMismatch {
                index: current_question_index,
                completed: completed_question_ids.len(),
            });
        }
        for (position, (expected, answer)) in completed_question_ids.iter().zip(&answers).enumerate() {
            if &answer.question_id != expected {
                return Err(ProgressError::AnswerOrderMismatch {
                    position,
                    expected: expected.clone(),
                    answered: answer.question_id.clone(),
                });
            }
        }

        Ok(Self {
            user_id,
            assessment_id,
            total_questions,
            current_question_index,
            completed_question_ids,
            answers,
            last_updated,
        })
    }

    /// Record an answer, advance the index and stamp `last_updated`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Exhausted` when every question is already
    /// answered, or `ProgressError::AlreadyAnswered` for a repeated question.
    pub fn record_answer(
        &mut self,
        record: AnswerRecord,
        now: DateTime<Utc>,
    ) -> Result<(), ProgressError> {
        if self.current_question_index >= self.total_questions
            || self.completed_question_ids.len() >= self.total_questions as usize
        {
            return Err(ProgressError::Exhausted);
        }
        if self.completed_question_ids.contains(&record.question_id) {
            return Err(ProgressError::AlreadyAnswered(record.question_id));
        }

        self.completed_question_ids.push(record.question_id.clone());
        self.answers.push(record);
        self.current_question_index += 1;
        self.last_updated = now;
        Ok(())
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn assessment_id(&self) -> &AssessmentId {
        &self.assessment_id
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn current_question_index(&self) -> u32 {
        self.current_question_index
    }

    /// 1-based label of the current question (`index + 1`).
    #[must_use]
    pub fn current_question_label(&self) -> u32 {
        self.current_question_index.saturating_add(1)
    }

    /// Question ids answered so far, in submission order.
    #[must_use]
    pub fn completed_question_ids(&self) -> &[QuestionId] {
        &self.completed_question_ids
    }

    #[must_use]
    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    #[must_use]
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.completed_question_ids.len()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        (self.total_questions as usize).saturating_sub(self.completed_count())
    }

    /// `100 * completed / total`, recomputed on every call.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percentage(&self) -> f64 {
        100.0 * self.completed_count() as f64 / f64::from(self.total_questions)
    }

    /// True once every question has an answer.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed_count() == self.total_questions as usize
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn record(q: &str, a: &str) -> AnswerRecord {
        AnswerRecord::new(QuestionId::new(q), AnswerId::new(a))
    }

    fn fresh(total: u32) -> SessionProgress {
        SessionProgress::start(
            UserId::random(),
            AssessmentId::new("big-five"),
            total,
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn percentage_tracks_completed_count() {
        let mut progress = fresh(4);
        assert_eq!(progress.progress_percentage(), 0.0);

        for (i, q) in ["q1", "q2", "q3", "q4"].iter().enumerate() {
            progress.record_answer(record(q, "a"), fixed_now()).unwrap();
            let expected = 100.0 * (i + 1) as f64 / 4.0;
            assert_eq!(progress.progress_percentage(), expected);
        }
        assert!(progress.is_complete());
        assert_eq!(progress.remaining(), 0);
    }

    #[test]
    fn record_answer_advances_and_stamps() {
        let mut progress = fresh(3);
        let later = fixed_now() + Duration::minutes(2);
        progress.record_answer(record("q1", "a"), later).unwrap();

        assert_eq!(progress.current_question_index(), 1);
        assert_eq!(progress.current_question_label(), 2);
        assert_eq!(progress.completed_question_ids(), &[QuestionId::new("q1")]);
        assert_eq!(progress.answers(), &[record("q1", "a")]);
        assert_eq!(progress.last_updated(), later);
    }

    #[test]
    fn repeated_question_is_rejected() {
        let mut progress = fresh(3);
        progress.record_answer(record("q1", "a"), fixed_now()).unwrap();
        let err = progress
            .record_answer(record("q1", "b"), fixed_now())
            .unwrap_err();
        assert_eq!(err, ProgressError::AlreadyAnswered(QuestionId::new("q1")));
        assert_eq!(progress.current_question_index(), 1);
    }

    #[test]
    fn cannot_answer_past_the_end() {
        let mut progress = fresh(1);
        progress.record_answer(record("q1", "a"), fixed_now()).unwrap();
        let err = progress
            .record_answer(record("q2", "a"), fixed_now())
            .unwrap_err();
        assert_eq!(err, ProgressError::Exhausted);
    }

    #[test]
    fn zero_question_progress_is_rejected() {
        let err = SessionProgress::start(
            UserId::random(),
            AssessmentId::new("x"),
            0,
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, ProgressError::NoQuestions);
    }

    #[test]
    fn from_persisted_enforces_bounds() {
        let user = UserId::random();
        let id = AssessmentId::new("big-five");

        let err = SessionProgress::from_persisted(
            user,
            id.clone(),
            2,
            3,
            Vec::new(),
            Vec::new(),
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, ProgressError::IndexOutOfRange { .. }));

        let err = SessionProgress::from_persisted(
            user,
            id.clone(),
            1,
            1,
            vec![QuestionId::new("q1"), QuestionId::new("q2")],
            vec![record("q1", "a"), record("q2", "a")],
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, ProgressError::TooManyCompleted { .. }));

        let err = SessionProgress::from_persisted(
            user,
            id,
            2,
            1,
            vec![QuestionId::new("q1")],
            Vec::new(),
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, ProgressError::AnswerCountMismatch { .. }));
    }

    #[test]
    fn from_persisted_requires_index_to_match_completed() {
        let err = SessionProgress::from_persisted(
            UserId::random(),
            AssessmentId::new("big-five"),
            2,
            0,
            vec![QuestionId::new("q1")],
            vec![record("q1", "agree")],
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, ProgressError::IndexMismatch { index: 0, completed: 1 });
    }

    #[test]
    fn from_persisted_requires_answers_in_completed_order() {
        let err = SessionProgress::from_persisted(
            UserId::random(),
            AssessmentId::new("big-five"),
            3,
            2,
            vec![QuestionId::new("q1"), QuestionId::new("q2")],
            vec![record("q2", "a"), record("q1", "a")],
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ProgressError::AnswerOrderMismatch {
                position: 0,
                expected: QuestionId::new("q1"),
                answered: QuestionId::new("q2"),
            }
        );
    }

    #[test]
    fn from_persisted_accepts_consistent_row() {
        let progress = SessionProgress::from_persisted(
            UserId::random(),
            AssessmentId::new("big-five"),
            2,
            1,
            vec![QuestionId::new("q1")],
            vec![record("q1", "a")],
            fixed_now(),
        )
        .unwrap();
        assert_eq!(progress.current_question_label(), 2);
        assert_eq!(progress.progress_percentage(), 50.0);
    }

    #[test]
    fn answer_record_uses_camel_case_keys() {
        let json = serde_json::to_string(&record("q1", "a")).unwrap();
        assert_eq!(json, r#"{"questionId":"q1","answerId":"a"}"#);
    }
}
