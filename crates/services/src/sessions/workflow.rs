use std::sync::Arc;

use persona_core::model::{AnswerId, AssessmentId, AssessmentResult, QuestionId, UserId};
use storage::repository::ResultId;
use tracing::{debug, info, warn};

use super::service::{AssessmentSession, SessionState};
use crate::Clock;
use crate::access::AccessGate;
use crate::analytics::{AnalyticsEvent, AnalyticsSink, TracingAnalytics};
use crate::catalog::AssessmentCatalog;
use crate::error::SessionError;
use crate::feedback::{FeedbackCue, FeedbackService};
use crate::progress_store::ProgressStore;
use crate::results::ResultArchive;

/// Outcome of starting (or resuming) a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartOutcome {
    pub resumed: bool,
    pub current_question_label: u32,
    pub progress_percentage: f64,
}

/// Outcome of a single answer submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubmitOutcome {
    pub progress_percentage: f64,
    pub current_question_label: u32,
    /// True when this was the last question and `finalize` may run.
    pub is_final: bool,
    /// Whether the store confirmed the progress write. The in-memory session
    /// advances either way.
    pub persisted: bool,
}

/// Outcome of a successful finalize.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeOutcome {
    pub result: AssessmentResult,
    pub result_id: ResultId,
    /// False if the stale progress row could not be deleted.
    pub progress_cleared: bool,
}

/// Orchestrates access, resume, answering, and finalization.
///
/// Store failures are absorbed by the adapters; only contract violations and
/// an unpersisted finalize surface as `SessionError`.
#[derive(Clone)]
pub struct SessionLoopService {
    clock: Clock,
    catalog: Arc<AssessmentCatalog>,
    gate: AccessGate,
    progress: ProgressStore,
    archive: ResultArchive,
    analytics: Arc<dyn AnalyticsSink>,
    feedback: Option<Arc<FeedbackService>>,
}

impl SessionLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<AssessmentCatalog>,
        gate: AccessGate,
        progress: ProgressStore,
        archive: ResultArchive,
    ) -> Self {
        Self {
            clock,
            catalog,
            gate,
            progress,
            archive,
            analytics: Arc::new(TracingAnalytics),
            feedback: None,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = analytics;
        self
    }

    #[must_use]
    pub fn with_feedback(mut self, feedback: Arc<FeedbackService>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    #[must_use]
    pub fn catalog(&self) -> &AssessmentCatalog {
        &self.catalog
    }

    /// Resolve the assessment and run the access gate.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownAssessment` if the id is not in the
    /// catalog and `SessionError::AccessDenied` if the gate refuses.
    pub async fn open(
        &self,
        identity: Option<UserId>,
        assessment_id: &AssessmentId,
    ) -> Result<AssessmentSession, SessionError> {
        let definition = self
            .catalog
            .get(assessment_id)
            .ok_or_else(|| SessionError::UnknownAssessment(assessment_id.clone()))?;

        if !self.gate.can_access(identity, assessment_id).await {
            return Err(SessionError::AccessDenied(assessment_id.clone()));
        }
        let user_id = identity.ok_or_else(|| SessionError::AccessDenied(assessment_id.clone()))?;

        Ok(AssessmentSession::new(user_id, definition))
    }

    /// Move a `NotStarted` session to `InProgress`, resuming stored progress
    /// when present.
    ///
    /// A load failure behaves as "never started".
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` unless the session is `NotStarted`.
    pub async fn start(&self, session: &mut AssessmentSession) -> Result<StartOutcome, SessionError> {
        if session.state() != SessionState::NotStarted {
            return Err(SessionError::InvalidTransition {
                action: "start",
                state: session.state(),
            });
        }

        let stored = if session.wants_stored_progress() {
            self.progress
                .load(session.user_id(), session.assessment_id())
                .await
        } else {
            None
        };

        let resumed = session.begin(stored, self.clock.now())?;
        info!(
            user_id = %session.user_id(),
            assessment_id = %session.assessment_id(),
            resumed,
            index = session.current_question_index(),
            "session started"
        );
        self.analytics.record(AnalyticsEvent::AssessmentStarted {
            user_id: session.user_id(),
            assessment_id: session.assessment_id().clone(),
            resumed,
        });

        Ok(StartOutcome {
            resumed,
            current_question_label: session.current_question_label(),
            progress_percentage: session.progress_percentage(),
        })
    }

    /// `open` followed by `start`.
    ///
    /// # Errors
    ///
    /// Returns the errors of `open` and `start`.
    pub async fn start_session(
        &self,
        identity: Option<UserId>,
        assessment_id: &AssessmentId,
    ) -> Result<(AssessmentSession, StartOutcome), SessionError> {
        let mut session = self.open(identity, assessment_id).await?;
        let outcome = self.start(&mut session).await?;
        Ok((session, outcome))
    }

    /// Record an answer for the current question and flush progress.
    ///
    /// A failed save does not roll back the in-memory session; it is reported
    /// through `SubmitOutcome::persisted`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the session is not `InProgress`, the question
    /// is not the current one, or the answer does not belong to it.
    pub async fn submit_answer(
        &self,
        session: &mut AssessmentSession,
        question_id: QuestionId,
        answer_id: AnswerId,
    ) -> Result<SubmitOutcome, SessionError> {
        let answered_index = session.current_question_index();
        let progress = session
            .record_answer(question_id, answer_id, self.clock.now())?
            .clone();

        let persisted = self.progress.save(&progress).await;
        if !persisted {
            warn!(
                user_id = %progress.user_id(),
                assessment_id = %progress.assessment_id(),
                index = progress.current_question_index(),
                "answer kept in memory only"
            );
        }

        self.analytics.record(AnalyticsEvent::AnswerSubmitted {
            user_id: progress.user_id(),
            assessment_id: progress.assessment_id().clone(),
            question_index: answered_index,
        });
        self.play(FeedbackCue::AnswerSelected);

        Ok(SubmitOutcome {
            progress_percentage: progress.progress_percentage(),
            current_question_label: progress.current_question_label(),
            is_final: progress.is_complete(),
            persisted,
        })
    }

    /// Score, archive, and clear progress for a fully answered session.
    ///
    /// On archive failure the session stays `InProgress` with its progress
    /// intact, so the call can be retried.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` unless the session is
    /// `InProgress`, `SessionError::Incomplete` if questions remain, and
    /// `SessionError::ResultNotPersisted` if the archive rejected the result.
    pub async fn finalize(
        &self,
        session: &mut AssessmentSession,
    ) -> Result<FinalizeOutcome, SessionError> {
        let result = session.build_result(self.clock.now())?;

        let Some(result_id) = self.archive.append(&result).await else {
            return Err(SessionError::ResultNotPersisted);
        };

        let progress_cleared = self
            .progress
            .delete(session.user_id(), session.assessment_id())
            .await;
        if !progress_cleared {
            warn!(
                user_id = %session.user_id(),
                assessment_id = %session.assessment_id(),
                result_id,
                "result archived but stale progress remains"
            );
        }

        info!(
            user_id = %session.user_id(),
            assessment_id = %session.assessment_id(),
            result_id,
            percentage_score = result.percentage_score(),
            "session completed"
        );
        self.analytics.record(AnalyticsEvent::AssessmentCompleted {
            user_id: session.user_id(),
            assessment_id: session.assessment_id().clone(),
            percentage_score: result.percentage_score(),
        });
        self.play(FeedbackCue::AssessmentCompleted);

        session.complete(result.clone(), result_id);
        Ok(FinalizeOutcome {
            result,
            result_id,
            progress_cleared,
        })
    }

    /// Discard progress and return the session to `NotStarted`. Valid from any state.
    ///
    /// Returns whether the stored progress was deleted. The session resets
    /// regardless, and its next `start` ignores whatever is still stored.
    pub async fn restart(&self, session: &mut AssessmentSession) -> bool {
        let deleted = self
            .progress
            .delete(session.user_id(), session.assessment_id())
            .await;
        session.reset();

        debug!(
            user_id = %session.user_id(),
            assessment_id = %session.assessment_id(),
            deleted,
            "session restarted"
        );
        self.analytics.record(AnalyticsEvent::AssessmentRestarted {
            user_id: session.user_id(),
            assessment_id: session.assessment_id().clone(),
        });
        deleted
    }

    /// Drop a session without cleanup. Stored progress stays resumable.
    pub fn abandon(&self, session: AssessmentSession) {
        debug!(
            user_id = %session.user_id(),
            assessment_id = %session.assessment_id(),
            state = %session.state(),
            index = session.current_question_index(),
            "session abandoned"
        );
    }

    fn play(&self, cue: FeedbackCue) {
        if let Some(feedback) = &self.feedback {
            feedback.play(cue);
        }
    }
}
