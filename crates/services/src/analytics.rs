use persona_core::model::{AssessmentId, UserId};
use tracing::info;

/// Telemetry emitted by the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsEvent {
    AssessmentStarted {
        user_id: UserId,
        assessment_id: AssessmentId,
        resumed: bool,
    },
    AnswerSubmitted {
        user_id: UserId,
        assessment_id: AssessmentId,
        question_index: u32,
    },
    AssessmentCompleted {
        user_id: UserId,
        assessment_id: AssessmentId,
        percentage_score: u8,
    },
    AssessmentRestarted {
        user_id: UserId,
        assessment_id: AssessmentId,
    },
}

impl AnalyticsEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            AnalyticsEvent::AssessmentStarted { .. } => "assessment_started",
            AnalyticsEvent::AnswerSubmitted { .. } => "answer_submitted",
            AnalyticsEvent::AssessmentCompleted { .. } => "assessment_completed",
            AnalyticsEvent::AssessmentRestarted { .. } => "assessment_restarted",
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        match self {
            AnalyticsEvent::AssessmentStarted { user_id, .. }
            | AnalyticsEvent::AnswerSubmitted { user_id, .. }
            | AnalyticsEvent::AssessmentCompleted { user_id, .. }
            | AnalyticsEvent::AssessmentRestarted { user_id, .. } => *user_id,
        }
    }

    #[must_use]
    pub fn assessment_id(&self) -> &AssessmentId {
        match self {
            AnalyticsEvent::AssessmentStarted { assessment_id, .. }
            | AnalyticsEvent::AnswerSubmitted { assessment_id, .. }
            | AnalyticsEvent::AssessmentCompleted { assessment_id, .. }
            | AnalyticsEvent::AssessmentRestarted { assessment_id, .. } => assessment_id,
        }
    }
}

/// Fire-and-forget output port for telemetry. Implementations must not block.
pub trait AnalyticsSink: Send + Sync {
    fn record(&self, event: AnalyticsEvent);
}

/// Emits every event as an `info` record on the `analytics` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn record(&self, event: AnalyticsEvent) {
        let name = event.name();
        let user_id = event.user_id();
        match &event {
            AnalyticsEvent::AssessmentStarted {
                assessment_id,
                resumed,
                ..
            } => info!(target: "analytics", event = name, %user_id, %assessment_id, resumed),
            AnalyticsEvent::AnswerSubmitted {
                assessment_id,
                question_index,
                ..
            } => info!(target: "analytics", event = name, %user_id, %assessment_id, question_index),
            AnalyticsEvent::AssessmentCompleted {
                assessment_id,
                percentage_score,
                ..
            } => info!(target: "analytics", event = name, %user_id, %assessment_id, percentage_score),
            AnalyticsEvent::AssessmentRestarted { assessment_id, .. } => {
                info!(target: "analytics", event = name, %user_id, %assessment_id);
            }
        }
    }
}
