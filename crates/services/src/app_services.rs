use std::sync::Arc;

use persona_core::model::{AssessmentId, UserId};
use storage::repository::{AccessRepository, Storage};

use crate::Clock;
use crate::access::AccessGate;
use crate::analytics::AnalyticsSink;
use crate::catalog::AssessmentCatalog;
use crate::error::AppServicesError;
use crate::feedback::FeedbackService;
use crate::progress_store::ProgressStore;
use crate::results::ResultArchive;
use crate::sessions::SessionLoopService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    catalog: Arc<AssessmentCatalog>,
    gate: AccessGate,
    archive: ResultArchive,
    access: Arc<dyn AccessRepository>,
    session_loop: Arc<SessionLoopService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        catalog: AssessmentCatalog,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, catalog))
    }

    /// Build services backed by in-memory storage.
    #[must_use]
    pub fn in_memory(clock: Clock, catalog: AssessmentCatalog) -> Self {
        Self::from_storage(&Storage::in_memory(), clock, catalog)
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock, catalog: AssessmentCatalog) -> Self {
        let catalog = Arc::new(catalog);
        let gate = AccessGate::new(Arc::clone(&storage.access));
        let progress = ProgressStore::new(Arc::clone(&storage.progress));
        let archive = ResultArchive::new(
            Arc::clone(&storage.results),
            Arc::clone(&storage.statistics),
        );
        let session_loop = Arc::new(SessionLoopService::new(
            clock,
            Arc::clone(&catalog),
            gate.clone(),
            progress,
            archive.clone(),
        ));

        Self {
            catalog,
            gate,
            archive,
            access: Arc::clone(&storage.access),
            session_loop,
        }
    }

    /// Replace the session loop's analytics sink.
    #[must_use]
    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.session_loop = Arc::new((*self.session_loop).clone().with_analytics(analytics));
        self
    }

    /// Attach a feedback player to the session loop.
    #[must_use]
    pub fn with_feedback(mut self, feedback: Arc<FeedbackService>) -> Self {
        self.session_loop = Arc::new((*self.session_loop).clone().with_feedback(feedback));
        self
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<AssessmentCatalog> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    #[must_use]
    pub fn archive(&self) -> &ResultArchive {
        &self.archive
    }

    #[must_use]
    pub fn session_loop(&self) -> Arc<SessionLoopService> {
        Arc::clone(&self.session_loop)
    }

    /// Record an access decision for a user.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Storage` if the grant cannot be stored.
    pub async fn set_access(
        &self,
        user_id: UserId,
        assessment_id: &AssessmentId,
        granted: bool,
    ) -> Result<(), AppServicesError> {
        self.access
            .set_access(user_id, assessment_id, granted)
            .await?;
        Ok(())
    }
}
