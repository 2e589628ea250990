//! Shared helpers for watch server integration tests.

#![allow(dead_code)]

use file_events::{ChangeKind, FailureKind, Listener};
use parking_lot::{Condvar, Mutex};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Change(ChangeKind, PathBuf),
    Unknown(PathBuf),
    Overflow(Option<PathBuf>),
    Failure(FailureKind, String),
}

/// Listener that stores every delivery and lets tests wait for one.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Recorded>>,
    arrived: Condvar,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    /// Wait until some recorded event satisfies `pred`.
    pub fn wait_for(&self, timeout: Duration, pred: impl Fn(&Recorded) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock();
        loop {
            if events.iter().any(&pred) {
                return true;
            }
            if self.arrived.wait_until(&mut events, deadline).timed_out() {
                return events.iter().any(&pred);
            }
        }
    }

    pub fn count(&self, pred: impl Fn(&Recorded) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    fn push(&self, event: Recorded) {
        self.events.lock().push(event);
        self.arrived.notify_all();
    }
}

impl Listener for RecordingListener {
    fn on_change(&self, kind: ChangeKind, path: &Path) {
        self.push(Recorded::Change(kind, path.to_path_buf()));
    }

    fn on_unknown_event(&self, path: &Path) {
        self.push(Recorded::Unknown(path.to_path_buf()));
    }

    fn on_overflow(&self, path: Option<&Path>) {
        self.push(Recorded::Overflow(path.map(Path::to_path_buf)));
    }

    fn on_failure(&self, kind: FailureKind, message: &str) {
        self.push(Recorded::Failure(kind, message.to_string()));
    }
}

/// Canonical form of a temp dir, matching the paths backends report.
pub fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap()
}
