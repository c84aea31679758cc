mod service;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use service::{AssessmentSession, SessionState};
pub use workflow::{FinalizeOutcome, SessionLoopService, StartOutcome, SubmitOutcome};
