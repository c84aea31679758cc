use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::{AnswerId, AnswerRecord, AssessmentDefinition, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScoringError {
    #[error("answer {answer} does not belong to question {question}")]
    UnknownAnswer {
        question: QuestionId,
        answer: AnswerId,
    },
}

/// Lower bound of the raw per-category range used for display normalization.
pub const RAW_SCORE_MIN: i32 = -5;
/// Upper bound of the raw per-category range used for display normalization.
pub const RAW_SCORE_MAX: i32 = 5;

//
// ─── SCORE VECTOR ──────────────────────────────────────────────────────────────
//

/// Accumulated score per category name.
///
/// Backed by a sorted map so iteration and serialization are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreVector(BTreeMap<String, i32>);

impl ScoreVector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to `category`, starting absent categories at 0.
    ///
    /// Saturates at the `i32` bounds. Use [`fold`] or `collect` to sum many
    /// deltas without the result depending on their order.
    pub fn add(&mut self, category: &str, delta: i32) {
        let entry = self.0.entry(category.to_owned()).or_insert(0);
        *entry = entry.saturating_add(delta);
    }

    /// Build from exact `i64` totals, clamping each once into `i32`.
    fn from_totals(totals: BTreeMap<String, i64>) -> Self {
        Self(
            totals
                .into_iter()
                .map(|(k, v)| (k, clamp_to_i32(v)))
                .collect(),
        )
    }

    /// Raw score for a category; absent categories read as 0.
    #[must_use]
    pub fn get(&self, category: &str) -> i32 {
        self.0.get(category).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Per-category scores mapped onto the 0..=100 display scale.
    #[must_use]
    pub fn normalized(&self) -> BTreeMap<String, u8> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), normalize(*v)))
            .collect()
    }

    /// Mean of the normalized category scores, rounded; 0 for an empty vector.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn percentage_score(&self) -> u8 {
        if self.0.is_empty() {
            return 0;
        }
        let sum: u32 = self.0.values().map(|v| u32::from(normalize(*v))).sum();
        let mean = f64::from(sum) / self.0.len() as f64;
        mean.round().clamp(0.0, 100.0) as u8
    }
}

impl FromIterator<(String, i32)> for ScoreVector {
    fn from_iter<T: IntoIterator<Item = (String, i32)>>(iter: T) -> Self {
        let mut totals: BTreeMap<String, i64> = BTreeMap::new();
        for (k, v) in iter {
            *totals.entry(k).or_insert(0) += i64::from(v);
        }
        Self::from_totals(totals)
    }
}

fn clamp_to_i32(total: i64) -> i32 {
    i32::try_from(total).unwrap_or(if total < 0 { i32::MIN } else { i32::MAX })
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Fold answer records into a score vector.
///
/// Each record is resolved against `definition` and its category deltas are
/// summed exactly in `i64` and clamped into `i32` once at the end, so the
/// result does not depend on the order of `answers`.
///
/// # Errors
///
/// Returns `ScoringError::UnknownAnswer` if a record cannot be resolved.
///
/// # Examples
///
/// ```
/// # use persona_core::model::{AnswerRecord, AnswerId, AssessmentDraft, QuestionId};
/// # use persona_core::scoring::fold;
/// let definition: AssessmentDraft = serde_json::from_str(r#"{
///     "id": "mini", "name": "Mini",
///     "questions": [{"id": "q1", "prompt": "?", "answers": [
///         {"id": "a", "text": "A", "scores": {"openness": 3}}
///     ]}]
/// }"#).unwrap();
/// let definition = definition.validate().unwrap();
/// let answers = [AnswerRecord::new(QuestionId::new("q1"), AnswerId::new("a"))];
/// let scores = fold(&answers, &definition)?;
/// assert_eq!(scores.get("openness"), 3);
/// # Ok::<(), persona_core::scoring::ScoringError>(())
/// ```
pub fn fold(
    answers: &[AnswerRecord],
    definition: &AssessmentDefinition,
) -> Result<ScoreVector, ScoringError> {
    let mut totals: BTreeMap<String, i64> = BTreeMap::new();
    for record in answers {
        let answer = definition
            .answer(&record.question_id, &record.answer_id)
            .ok_or_else(|| ScoringError::UnknownAnswer {
                question: record.question_id.clone(),
                answer: record.answer_id.clone(),
            })?;
        for (category, delta) in answer.scores() {
            *totals.entry(category.clone()).or_insert(0) += i64::from(*delta);
        }
    }
    Ok(ScoreVector::from_totals(totals))
}

/// Map a raw score onto 0..=100 via `((raw + 5) / 10) * 100`, clamped.
///
/// ```
/// # use persona_core::scoring::normalize;
/// assert_eq!(normalize(0), 50);
/// assert_eq!(normalize(-9), 0);
/// assert_eq!(normalize(12), 100);
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn normalize(raw: i32) -> u8 {
    let span = f64::from(RAW_SCORE_MAX - RAW_SCORE_MIN);
    let scaled = (f64::from(raw) - f64::from(RAW_SCORE_MIN)) / span * 100.0;
    scaled.round().clamp(0.0, 100.0) as u8
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
