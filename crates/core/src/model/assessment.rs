use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use crate::model::ids::{AnswerId, AssessmentId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AssessmentError {
    #[error("assessment name cannot be empty")]
    EmptyName,

    #[error("assessment {0} has no questions")]
    NoQuestions(AssessmentId),

    #[error("duplicate question id: {0}")]
    DuplicateQuestion(QuestionId),

    #[error("question {0} has no answers")]
    NoAnswers(QuestionId),

    #[error("duplicate answer id {answer} in question {question}")]
    DuplicateAnswer {
        question: QuestionId,
        answer: AnswerId,
    },

    #[error("too many questions: {0}")]
    TooManyQuestions(usize),
}

//
// ─── DRAFTS ────────────────────────────────────────────────────────────────────
//

/// Unvalidated answer as it appears in content configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerDraft {
    pub id: AnswerId,
    pub text: String,
    #[serde(default)]
    pub scores: BTreeMap<String, i32>,
}

/// Unvalidated question as it appears in content configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub id: QuestionId,
    pub prompt: String,
    pub answers: Vec<AnswerDraft>,
}

/// Unvalidated assessment as it appears in content configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentDraft {
    pub id: AssessmentId,
    pub name: String,
    #[serde(default)]
    pub category_id: String,
    pub questions: Vec<QuestionDraft>,
}

impl AssessmentDraft {
    /// Validate the draft into a read-only definition.
    ///
    /// # Errors
    ///
    /// Returns `AssessmentError` if the name is blank, there are no questions,
    /// a question has no answers, or ids repeat.
    pub fn validate(self) -> Result<AssessmentDefinition, AssessmentError> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(AssessmentError::EmptyName);
        }
        if self.questions.is_empty() {
            return Err(AssessmentError::NoQuestions(self.id));
        }
        if u32::try_from(self.questions.len()).is_err() {
            return Err(AssessmentError::TooManyQuestions(self.questions.len()));
        }

        let mut seen_questions = HashSet::new();
        let mut questions = Vec::with_capacity(self.questions.len());
        for draft in self.questions {
            if !seen_questions.insert(draft.id.clone()) {
                return Err(AssessmentError::DuplicateQuestion(draft.id));
            }
            if draft.answers.is_empty() {
                return Err(AssessmentError::NoAnswers(draft.id));
            }

            let mut seen_answers = HashSet::new();
            let mut answers = Vec::with_capacity(draft.answers.len());
            for answer in draft.answers {
                if !seen_answers.insert(answer.id.clone()) {
                    return Err(AssessmentError::DuplicateAnswer {
                        question: draft.id,
                        answer: answer.id,
                    });
                }
                answers.push(Answer {
                    id: answer.id,
                    text: answer.text,
                    scores: answer.scores,
                });
            }

            questions.push(Question {
                id: draft.id,
                prompt: draft.prompt,
                answers,
            });
        }

        Ok(AssessmentDefinition {
            id: self.id,
            name,
            category_id: self.category_id,
            questions,
        })
    }
}

//
// ─── DEFINITION ────────────────────────────────────────────────────────────────
//

/// A selectable answer and the per-category score deltas it contributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    id: AnswerId,
    text: String,
    scores: BTreeMap<String, i32>,
}

impl Answer {
    #[must_use]
    pub fn id(&self) -> &AnswerId {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Category name to signed delta.
    #[must_use]
    pub fn scores(&self) -> &BTreeMap<String, i32> {
        &self.scores
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    prompt: String,
    answers: Vec<Answer>,
}

impl Question {
    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    #[must_use]
    pub fn answer(&self, id: &AnswerId) -> Option<&Answer> {
        self.answers.iter().find(|a| a.id() == id)
    }
}

/// Static, ordered assessment content. Never mutated at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentDefinition {
    id: AssessmentId,
    name: String,
    category_id: String,
    questions: Vec<Question>,
}

impl AssessmentDefinition {
    #[must_use]
    pub fn id(&self) -> &AssessmentId {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn category_id(&self) -> &str {
        &self.category_id
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Number of questions; validation guarantees this fits in `u32` and is non-zero.
    #[must_use]
    pub fn total_questions(&self) -> u32 {
        u32::try_from(self.questions.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn question_at(&self, index: u32) -> Option<&Question> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.questions.get(i))
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id() == id)
    }

    /// Resolve an answer by question and answer id.
    #[must_use]
    pub fn answer(&self, question: &QuestionId, answer: &AnswerId) -> Option<&Answer> {
        self.question(question).and_then(|q| q.answer(answer))
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(id: &str, scores: &[(&str, i32)]) -> AnswerDraft {
        AnswerDraft {
            id: AnswerId::new(id),
            text: id.to_uppercase(),
            scores: scores.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect(),
        }
    }

    fn question(id: &str, answers: Vec<AnswerDraft>) -> QuestionDraft {
        QuestionDraft {
            id: QuestionId::new(id),
            prompt: format!("Prompt {id}"),
            answers,
        }
    }

    fn draft(questions: Vec<QuestionDraft>) -> AssessmentDraft {
        AssessmentDraft {
            id: AssessmentId::new("big-five"),
            name: "Big Five".into(),
            category_id: "personality".into(),
            questions,
        }
    }

    #[test]
    fn validates_and_resolves_answers() {
        let def = draft(vec![
            question("q1", vec![answer("a", &[("openness", 3)])]),
            question("q2", vec![answer("a", &[]), answer("b", &[("neuroticism", -2)])]),
        ])
        .validate()
        .unwrap();

        assert_eq!(def.total_questions(), 2);
        assert_eq!(def.question_at(1).unwrap().id(), &QuestionId::new("q2"));
        assert!(def.question_at(2).is_none());
        let resolved = def
            .answer(&QuestionId::new("q2"), &AnswerId::new("b"))
            .unwrap();
        assert_eq!(resolved.scores().get("neuroticism"), Some(&-2));
        assert!(def.answer(&QuestionId::new("q1"), &AnswerId::new("b")).is_none());
    }

    #[test]
    fn rejects_empty_assessment() {
        let err = draft(Vec::new()).validate().unwrap_err();
        assert!(matches!(err, AssessmentError::NoQuestions(_)));
    }

    #[test]
    fn rejects_blank_name() {
        let mut d = draft(vec![question("q1", vec![answer("a", &[])])]);
        d.name = "  ".into();
        assert_eq!(d.validate().unwrap_err(), AssessmentError::EmptyName);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = draft(vec![
            question("q1", vec![answer("a", &[])]),
            question("q1", vec![answer("a", &[])]),
        ])
        .validate()
        .unwrap_err();
        assert_eq!(err, AssessmentError::DuplicateQuestion(QuestionId::new("q1")));

        let err = draft(vec![question("q1", vec![answer("a", &[]), answer("a", &[])])])
            .validate()
            .unwrap_err();
        assert!(matches!(err, AssessmentError::DuplicateAnswer { .. }));
    }

    #[test]
    fn rejects_question_without_answers() {
        let err = draft(vec![question("q1", Vec::new())]).validate().unwrap_err();
        assert_eq!(err, AssessmentError::NoAnswers(QuestionId::new("q1")));
    }

    #[test]
    fn deserializes_from_json() {
        let json = r#"{
            "id": "mini",
            "name": "Mini",
            "questions": [
                {"id": "q1", "prompt": "?", "answers": [{"id": "a", "text": "A", "scores": {"openness": 1}}]}
            ]
        }"#;
        let def = serde_json::from_str::<AssessmentDraft>(json)
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(def.id(), &AssessmentId::new("mini"));
        assert_eq!(def.category_id(), "");
    }
}
