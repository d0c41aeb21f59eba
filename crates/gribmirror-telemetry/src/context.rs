//! Process-wide span carrying run identity.

use tracing::{Span, span::Entered};
use uuid::Uuid;

use crate::init::build_sha;

/// Guard that keeps the run-level span entered for the lifetime of the process.
pub struct GlobalContextGuard {
    run_id: Uuid,
    _guard: Entered<'static>,
}

impl GlobalContextGuard {
    /// Enter a span tagged with a fresh run identifier and the build SHA.
    #[must_use]
    pub fn new(mode: impl Into<String>) -> Self {
        let mode = mode.into();
        let run_id = Uuid::new_v4();
        let span: &'static Span = Box::leak(Box::new(tracing::info_span!(
            "run",
            mode = %mode,
            run_id = %run_id,
            build_sha = %build_sha()
        )));
        Self {
            run_id,
            _guard: span.enter(),
        }
    }

    /// Identifier shared by every log line of this run.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }
}
