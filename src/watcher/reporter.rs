//! Delivery of classified events to the listener.

use std::path::Path;
use std::sync::Arc;

use super::{ChangeKind, FailureKind, Listener};

/// Forwards events to the listener from the watch thread.
///
/// Calls are synchronous: each report returns only after the listener does.
/// A failure report closes the reporter and every later report is dropped.
pub struct EventReporter {
    listener: Arc<dyn Listener>,
    failed: bool,
}

impl EventReporter {
    pub fn new(listener: Arc<dyn Listener>) -> Self {
        Self {
            listener,
            failed: false,
        }
    }

    /// Whether a failure has already been delivered.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn report_change(&mut self, kind: ChangeKind, path: &Path) {
        if self.suppressed("change") {
            return;
        }
        crate::debug_event!("reporter", kind, "{}", path.display());
        self.listener.on_change(kind, path);
    }

    pub fn report_unknown(&mut self, path: &Path) {
        if self.suppressed("unknown") {
            return;
        }
        crate::debug_event!("reporter", "unknown", "{}", path.display());
        self.listener.on_unknown_event(path);
    }

    pub fn report_overflow(&mut self, path: Option<&Path>) {
        if self.suppressed("overflow") {
            return;
        }
        match path {
            Some(path) => tracing::warn!("[reporter] events lost under {}", path.display()),
            None => tracing::warn!("[reporter] events lost, all watched paths are stale"),
        }
        self.listener.on_overflow(path);
    }

    /// Deliver the terminal failure. Only the first call reaches the listener.
    pub fn report_failure(&mut self, kind: FailureKind, message: &str) {
        if self.suppressed("failure") {
            return;
        }
        self.failed = true;
        tracing::error!("[reporter] watch failed ({kind}): {message}");
        self.listener.on_failure(kind, message);
    }

    fn suppressed(&self, what: &str) -> bool {
        if self.failed {
            crate::debug_event!("reporter", "dropped after failure", "{what}");
        }
        self.failed
    }
}
