use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{AnswerRecord, AssessmentDefinition, AssessmentId, UserId};
use crate::profile::derive_pair;
use crate::scoring::{ScoreVector, ScoringError, fold};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResultError {
    #[error("only {answered} of {total} questions answered")]
    Incomplete { answered: usize, total: u32 },

    #[error("percentage score must be in 0..=100, got {0}")]
    InvalidPercentage(u8),

    #[error(transparent)]
    Scoring(#[from] ScoringError),
}

/// Immutable record of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentResult {
    user_id: UserId,
    assessment_id: AssessmentId,
    assessment_name: String,
    scores: ScoreVector,
    percentage_score: u8,
    answers: Vec<AnswerRecord>,
    primary_profile: Option<String>,
    secondary_profile: Option<String>,
    completion_time_seconds: Option<u32>,
    completed_at: DateTime<Utc>,
}

impl AssessmentResult {
    /// Score a complete answer list and derive its profiles.
    ///
    /// # Errors
    ///
    /// Returns `ResultError::Incomplete` unless every question is answered,
    /// and `ResultError::Scoring` if an answer cannot be resolved.
    pub fn from_answers(
        user_id: UserId,
        definition: &AssessmentDefinition,
        answers: Vec<AnswerRecord>,
        completion_time_seconds: Option<u32>,
        completed_at: DateTime<Utc>,
    ) -> Result<Self, ResultError> {
        let total = definition.total_questions();
        if answers.len() != total as usize {
            return Err(ResultError::Incomplete {
                answered: answers.len(),
                total,
            });
        }

        let scores = fold(&answers, definition)?;
        let (primary, secondary) = derive_pair(&scores);

        Ok(Self {
            user_id,
            assessment_id: definition.id().clone(),
            assessment_name: definition.name().to_owned(),
            percentage_score: scores.percentage_score(),
            scores,
            answers,
            primary_profile: Some(primary.category.as_str().to_owned()),
            secondary_profile: secondary.map(|p| p.category.as_str().to_owned()),
            completion_time_seconds,
            completed_at,
        })
    }

    /// Rehydrate a result from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ResultError::InvalidPercentage` if the stored percentage exceeds 100.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        user_id: UserId,
        assessment_id: AssessmentId,
        assessment_name: String,
        scores: ScoreVector,
        percentage_score: u8,
        answers: Vec<AnswerRecord>,
        primary_profile: Option<String>,
        secondary_profile: Option<String>,
        completion_time_seconds: Option<u32>,
        completed_at: DateTime<Utc>,
    ) -> Result<Self, ResultError> {
        if percentage_score > 100 {
            return Err(ResultError::InvalidPercentage(percentage_score));
        }
        Ok(Self {
            user_id,
            assessment_id,
            assessment_name,
            scores,
            percentage_score,
            answers,
            primary_profile,
            secondary_profile,
            completion_time_seconds,
            completed_at,
        })
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
    pub fn assessment_name(&self) -> &str {
        &self.assessment_name
    }

    #[must_use]
    pub fn scores(&self) -> &ScoreVector {
        &self.scores
    }

    #[must_use]
    pub fn percentage_score(&self) -> u8 {
        self.percentage_score
    }

    #[must_use]
    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    #[must_use]
    pub fn primary_profile(&self) -> Option<&str> {
        self.primary_profile.as_deref()
    }

    #[must_use]
    pub fn secondary_profile(&self) -> Option<&str> {
        self.secondary_profile.as_deref()
    }

    #[must_use]
    pub fn completion_time_seconds(&self) -> Option<u32> {
        self.completion_time_seconds
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}

/// Cross-result aggregate for one user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserStatistics {
    pub total_completed: u32,
    pub average_score: f64,
    pub last_test_date: Option<DateTime<Utc>>,
    pub unique_tests_taken: u32,
}
