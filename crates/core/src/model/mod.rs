mod assessment;
mod ids;
mod progress;
mod result;

pub use assessment::{
    Answer, AnswerDraft, AssessmentDefinition, AssessmentDraft, AssessmentError, Question,
    QuestionDraft,
};
pub use ids::{AnswerId, AssessmentId, ParseIdError, QuestionId, UserId};
pub use progress::{AnswerRecord, ProgressError, SessionProgress};
pub use result::{AssessmentResult, ResultError, UserStatistics};
