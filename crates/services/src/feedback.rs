use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Feedback cues the session loop can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackCue {
    AnswerSelected,
    AssessmentCompleted,
}

/// Output device for feedback (sound, haptics, terminal bell).
pub trait FeedbackOutput: Send + Sync {
    fn play(&self, cue: FeedbackCue);
}

/// Output that only logs cues.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFeedback;

impl FeedbackOutput for LogFeedback {
    fn play(&self, cue: FeedbackCue) {
        debug!(?cue, "feedback cue");
    }
}

/// Explicitly owned feedback player.
///
/// Cues are dropped until `initialize` has been called and while the service
/// is disabled. `dispose` returns it to the uninitialized state.
pub struct FeedbackService {
    output: Arc<dyn FeedbackOutput>,
    initialized: AtomicBool,
    enabled: AtomicBool,
}

impl FeedbackService {
    /// New service, enabled but not yet initialized.
    #[must_use]
    pub fn new(output: Arc<dyn FeedbackOutput>) -> Self {
        Self {
            output,
            initialized: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn initialize(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    pub fn dispose(&self) {
        self.initialized.store(false, Ordering::SeqCst);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Play a cue. Returns whether it reached the output.
    pub fn play(&self, cue: FeedbackCue) -> bool {
        if !self.is_initialized() || !self.is_enabled() {
            return false;
        }
        self.output.play(cue);
        true
    }
}
