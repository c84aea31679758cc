use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use persona_core::model::{
    AnswerId, AnswerRecord, AssessmentDefinition, AssessmentId, AssessmentResult, ProgressError,
    Question, QuestionId, SessionProgress, UserId,
};
use persona_core::time::elapsed_seconds;
use storage::repository::ResultId;

use crate::error::SessionError;

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Lifecycle of an assessment session. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    NotStarted,
    InProgress,
    Completed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::NotStarted => "not started",
            SessionState::InProgress => "in progress",
            SessionState::Completed => "completed",
        })
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// In-memory state machine for one (user, assessment) pair.
///
/// All mutation goes through `SessionLoopService`, which pairs every
/// transition with the matching store call. This type never talks to storage.
#[derive(Debug, Clone)]
pub struct AssessmentSession {
    user_id: UserId,
    definition: Arc<AssessmentDefinition>,
    state: SessionState,
    progress: Option<SessionProgress>,
    started_at: Option<DateTime<Utc>>,
    resumed: bool,
    skip_resume: bool,
    result: Option<AssessmentResult>,
    result_id: Option<ResultId>,
}

impl AssessmentSession {
    pub(crate) fn new(user_id: UserId, definition: Arc<AssessmentDefinition>) -> Self {
        Self {
            user_id,
            definition,
            state: SessionState::NotStarted,
            progress: None,
            started_at: None,
            resumed: false,
            skip_resume: false,
            result: None,
            result_id: None,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn assessment_id(&self) -> &AssessmentId {
        self.definition.id()
    }

    #[must_use]
    pub fn definition(&self) -> &AssessmentDefinition {
        &self.definition
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn progress(&self) -> Option<&SessionProgress> {
        self.progress.as_ref()
    }

    /// Derived from the in-memory progress; 0 before the session starts.
    #[must_use]
    pub fn progress_percentage(&self) -> f64 {
        self.progress
            .as_ref()
            .map_or(0.0, SessionProgress::progress_percentage)
    }

    #[must_use]
    pub fn current_question_index(&self) -> u32 {
        self.progress
            .as_ref()
            .map_or(0, SessionProgress::current_question_index)
    }

    /// 1-based label for display: always `current_question_index + 1`.
    #[must_use]
    pub fn current_question_label(&self) -> u32 {
        self.current_question_index().saturating_add(1)
    }

    /// The question awaiting an answer, if any.
    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        if self.state != SessionState::InProgress {
            return None;
        }
        self.definition.question_at(self.current_question_index())
    }

    /// True once every question has an answer and `finalize` may run.
    #[must_use]
    pub fn is_ready_to_finalize(&self) -> bool {
        self.state == SessionState::InProgress
            && self.progress.as_ref().is_some_and(SessionProgress::is_complete)
    }

    #[must_use]
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn result(&self) -> Option<&AssessmentResult> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn result_id(&self) -> Option<ResultId> {
        self.result_id
    }

    //
    // ─── TRANSITIONS ───────────────────────────────────────────────────────────
    //

    /// Whether `start` should consult the store. False right after a restart.
    pub(crate) fn wants_stored_progress(&self) -> bool {
        !self.skip_resume
    }

    /// `NotStarted -> InProgress`, resuming `stored` when it fits this assessment.
    ///
    /// Returns whether the session was resumed.
    pub(crate) fn begin(
        &mut self,
        stored: Option<SessionProgress>,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        self.require(SessionState::NotStarted, "start")?;

        let stored = stored.filter(|p| self.fits(p));

        let resumed = stored.is_some();
        let progress = match stored {
            Some(progress) => progress,
            None => SessionProgress::start(
                self.user_id,
                self.definition.id().clone(),
                self.definition.total_questions(),
                now,
            )?,
        };

        self.progress = Some(progress);
        self.started_at = Some(now);
        self.resumed = resumed;
        self.skip_resume = false;
        self.state = SessionState::InProgress;
        Ok(resumed)
    }

    /// Stored progress fits when it belongs to this user and assessment and
    /// every answer resolves against the question at its position.
    fn fits(&self, progress: &SessionProgress) -> bool {
        progress.user_id() == self.user_id
            && progress.assessment_id() == self.definition.id()
            && progress.total_questions() == self.definition.total_questions()
            && progress.answers().iter().enumerate().all(|(position, record)| {
                u32::try_from(position)
                    .ok()
                    .and_then(|index| self.definition.question_at(index))
                    .is_some_and(|question| {
                        question.id() == &record.question_id
                            && question.answer(&record.answer_id).is_some()
                    })
            })
    }

    /// Append an answer for the current question and advance the index.
    pub(crate) fn record_answer(
        &mut self,
        question_id: QuestionId,
        answer_id: AnswerId,
        now: DateTime<Utc>,
    ) -> Result<&SessionProgress, SessionError> {
        self.require(SessionState::InProgress, "submit an answer")?;
        let Some(progress) = self.progress.as_mut() else {
            return Err(SessionError::InvalidTransition {
                action: "submit an answer",
                state: self.state,
            });
        };

        let expected = self
            .definition
            .question_at(progress.current_question_index())
            .ok_or(ProgressError::Exhausted)?;
        if expected.id() != &question_id {
            return Err(SessionError::UnexpectedQuestion {
                expected: expected.id().clone(),
                got: question_id,
            });
        }
        if expected.answer(&answer_id).is_none() {
            return Err(SessionError::UnknownAnswer {
                question: question_id,
                answer: answer_id,
            });
        }

        progress.record_answer(AnswerRecord::new(question_id, answer_id), now)?;
        Ok(&*progress)
    }

    /// Score the answers into a result without changing state.
    pub(crate) fn build_result(&self, now: DateTime<Utc>) -> Result<AssessmentResult, SessionError> {
        self.require(SessionState::InProgress, "finalize")?;
        let Some(progress) = self.progress.as_ref() else {
            return Err(SessionError::InvalidTransition {
                action: "finalize",
                state: self.state,
            });
        };
        if !progress.is_complete() {
            return Err(SessionError::Incomplete {
                answered: progress.completed_count(),
                total: progress.total_questions(),
            });
        }

        let completion_time = if self.resumed {
            None
        } else {
            self.started_at.and_then(|start| elapsed_seconds(start, now))
        };

        Ok(AssessmentResult::from_answers(
            self.user_id,
            &self.definition,
            progress.answers().to_vec(),
            completion_time,
            now,
        )?)
    }

    /// `InProgress -> Completed` once the result is archived.
    pub(crate) fn complete(&mut self, result: AssessmentResult, result_id: ResultId) {
        self.progress = None;
        self.result = Some(result);
        self.result_id = Some(result_id);
        self.state = SessionState::Completed;
    }

    /// Back to `NotStarted` from any state; the next start ignores stored progress.
    pub(crate) fn reset(&mut self) {
        self.state = SessionState::NotStarted;
        self.progress = None;
        self.started_at = None;
        self.resumed = false;
        self.skip_resume = true;
        self.result = None;
        self.result_id = None;
    }

    fn require(&self, expected: SessionState, action: &'static str) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                action,
                state: self.state,
            })
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use persona_core::model::{AnswerDraft, AssessmentDraft, QuestionDraft};
    use persona_core::time::fixed_now;
    use std::collections::BTreeMap;

    fn definition() -> Arc<AssessmentDefinition> {
        let answer = |id: &str, scores: &[(&str, i32)]| AnswerDraft {
            id: AnswerId::new(id),
            text: id.to_uppercase(),
            scores: scores
                .iter()
                .map(|(k, v)| ((*k).to_owned(), *v))
                .collect::<BTreeMap<_, _>>(),
        };
        let draft = AssessmentDraft {
            id: AssessmentId::new("big-five"),
            name: "Big Five".into(),
            category_id: "personality".into(),
            questions: vec![
                QuestionDraft {
                    id: QuestionId::new("q1"),
                    prompt: "First".into(),
                    answers: vec![answer("a", &[("openness", 3)])],
                },
                QuestionDraft {
                    id: QuestionId::new("q2"),
                    prompt: "Second".into(),
                    answers: vec![answer("b", &[("openness", 1), ("conscientiousness", 4)])],
                },
            ],
        };
        Arc::new(draft.validate().unwrap())
    }

    fn started() -> AssessmentSession {
        let mut session = AssessmentSession::new(UserId::random(), definition());
        assert!(!session.begin(None, fixed_now()).unwrap());
        session
    }

    #[test]
    fn fresh_session_starts_at_zero() {
        let session = started();
        assert_eq!(session.state(), SessionState::InProgress);
        assert_eq!(session.current_question_index(), 0);
        assert_eq!(session.current_question_label(), 1);
        assert_eq!(session.progress_percentage(), 0.0);
        assert_eq!(session.current_question().unwrap().id().as_str(), "q1");
    }

    #[test]
    fn starting_twice_is_rejected() {
        let mut session = started();
        let err = session.begin(None, fixed_now()).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidTransition {
                action: "start",
                state: SessionState::InProgress
            }
        ));
    }

    #[test]
    fn submit_before_start_is_rejected() {
        let mut session = AssessmentSession::new(UserId::random(), definition());
        let err = session
            .record_answer(QuestionId::new("q1"), AnswerId::new("a"), fixed_now())
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }

    #[test]
    fn answers_must_follow_question_order() {
        let mut session = started();
        let err = session
            .record_answer(QuestionId::new("q2"), AnswerId::new("b"), fixed_now())
            .unwrap_err();
        assert!(matches!(err, SessionError::UnexpectedQuestion { .. }));

        let err = session
            .record_answer(QuestionId::new("q1"), AnswerId::new("b"), fixed_now())
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownAnswer { .. }));
        assert_eq!(session.current_question_index(), 0);
    }

    #[test]
    fn percentage_tracks_completed_answers() {
        let mut session = started();
        let observed_first = session
            .record_answer(QuestionId::new("q1"), AnswerId::new("a"), fixed_now())
            .unwrap()
            .progress_percentage();
        assert_eq!(observed_first, 50.0);
        assert!(!session.is_ready_to_finalize());

        session
            .record_answer(QuestionId::new("q2"), AnswerId::new("b"), fixed_now())
            .unwrap();
        assert_eq!(session.progress_percentage(), 100.0);
        assert!(session.is_ready_to_finalize());
        assert!(session.current_question().is_none());

        let err = session
            .record_answer(QuestionId::new("q2"), AnswerId::new("b"), fixed_now())
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Progress(ProgressError::Exhausted)
        ));
    }

    #[test]
    fn build_result_requires_every_answer() {
        let mut session = started();
        session
            .record_answer(QuestionId::new("q1"), AnswerId::new("a"), fixed_now())
            .unwrap();
        let err = session.build_result(fixed_now()).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Incomplete {
                answered: 1,
                total: 2
            }
        ));
        assert_eq!(session.state(), SessionState::InProgress);
    }

    #[test]
    fn fresh_sessions_measure_completion_time() {
        let mut session = started();
        session
            .record_answer(QuestionId::new("q1"), AnswerId::new("a"), fixed_now())
            .unwrap();
        session
            .record_answer(QuestionId::new("q2"), AnswerId::new("b"), fixed_now())
            .unwrap();

        let result = session
            .build_result(fixed_now() + Duration::seconds(95))
            .unwrap();
        assert_eq!(result.completion_time_seconds(), Some(95));
        assert_eq!(result.scores().get("openness"), 4);
        assert_eq!(result.scores().get("conscientiousness"), 4);
        assert_eq!(result.primary_profile(), Some("openness"));
    }

    #[test]
    fn resumed_sessions_keep_stored_index() {
        let user = UserId::random();
        let mut stored =
            SessionProgress::start(user, AssessmentId::new("big-five"), 2, fixed_now()).unwrap();
        stored
            .record_answer(
                AnswerRecord::new(QuestionId::new("q1"), AnswerId::new("a")),
                fixed_now(),
            )
            .unwrap();

        let mut session = AssessmentSession::new(user, definition());
        assert!(session.begin(Some(stored.clone()), fixed_now()).unwrap());
        assert_eq!(session.progress(), Some(&stored));
        assert_eq!(session.current_question_label(), stored.current_question_index() + 1);
        assert_eq!(session.current_question().unwrap().id().as_str(), "q2");

        session
            .record_answer(QuestionId::new("q2"), AnswerId::new("b"), fixed_now())
            .unwrap();
        let result = session.build_result(fixed_now()).unwrap();
        assert_eq!(result.completion_time_seconds(), None);
    }

    #[test]
    fn mismatched_stored_progress_starts_fresh() {
        let user = UserId::random();
        let stored =
            SessionProgress::start(user, AssessmentId::new("big-five"), 5, fixed_now()).unwrap();

        let mut session = AssessmentSession::new(user, definition());
        assert!(!session.begin(Some(stored), fixed_now()).unwrap());
        assert_eq!(session.progress().unwrap().total_questions(), 2);
    }

    #[test]
    fn stored_answers_that_no_longer_resolve_start_fresh() {
        let user = UserId::random();
        let stale = |question: &str, answer: &str| {
            SessionProgress::from_persisted(
                user,
                AssessmentId::new("big-five"),
                2,
                1,
                vec![QuestionId::new(question)],
                vec![AnswerRecord::new(QuestionId::new(question), AnswerId::new(answer))],
                fixed_now(),
            )
            .unwrap()
        };

        for stored in [stale("q1", "removed"), stale("q2", "b"), stale("gone", "a")] {
            let mut session = AssessmentSession::new(user, definition());
            assert!(!session.begin(Some(stored), fixed_now()).unwrap());
            assert_eq!(session.current_question_index(), 0);
            assert_eq!(session.progress_percentage(), 0.0);
            session
                .record_answer(QuestionId::new("q1"), AnswerId::new("a"), fixed_now())
                .unwrap();
        }
    }

    #[test]
    fn completed_is_terminal_until_reset() {
        let mut session = started();
        session
            .record_answer(QuestionId::new("q1"), AnswerId::new("a"), fixed_now())
            .unwrap();
        session
            .record_answer(QuestionId::new("q2"), AnswerId::new("b"), fixed_now())
            .unwrap();
        let result = session.build_result(fixed_now()).unwrap();
        session.complete(result, 1);

        assert_eq!(session.state(), SessionState::Completed);
        assert!(session.progress().is_none());
        assert!(matches!(
            session.build_result(fixed_now()),
            Err(SessionError::InvalidTransition {
                state: SessionState::Completed,
                ..
            })
        ));

        session.reset();
        assert_eq!(session.state(), SessionState::NotStarted);
        assert!(!session.wants_stored_progress());
        assert!(session.result().is_none());

        assert!(!session.begin(None, fixed_now()).unwrap());
        assert!(session.wants_stored_progress());
    }
}
