#![forbid(unsafe_code)]

pub mod access;
pub mod analytics;
pub mod app_services;
pub mod catalog;
pub mod error;
pub mod feedback;
pub mod progress_store;
pub mod results;
pub mod sessions;

pub use persona_core::Clock;
pub use sessions as session;

pub use access::AccessGate;
pub use analytics::{AnalyticsEvent, AnalyticsSink, TracingAnalytics};
pub use app_services::AppServices;
pub use catalog::AssessmentCatalog;
pub use error::{AppServicesError, CatalogError, SessionError};
pub use feedback::{FeedbackCue, FeedbackOutput, FeedbackService, LogFeedback};
pub use progress_store::ProgressStore;
pub use results::{CategoryScore, ResultArchive, ResultView};

pub use sessions::{
    AssessmentSession, FinalizeOutcome, SessionLoopService, SessionState, StartOutcome,
    SubmitOutcome,
};
