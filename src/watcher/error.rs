//! Error types for the watch server.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Category of a watch failure crossing the listener boundary.
///
/// `ResourceExhausted` is kept apart from everything else so callers can react
/// to OS watch limits (e.g. raise `fs.inotify.max_user_watches`) without
/// matching on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The OS refused to allocate more watch resources.
    ResourceExhausted,
    /// Any other failure reported by the native backend.
    NativeWatchFailure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ResourceExhausted => f.write_str("resource exhausted"),
            FailureKind::NativeWatchFailure => f.write_str("native watch failure"),
        }
    }
}

/// A single path that could not be registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFailure {
    pub path: PathBuf,
    pub kind: FailureKind,
    pub reason: String,
}

impl PathFailure {
    pub fn new(path: impl Into<PathBuf>, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PathFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.path.display(), self.reason, self.kind)
    }
}

/// Errors from watch server operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to register {} path(s): {}", failures.len(), join_failures(failures))]
    Registration { failures: Vec<PathFailure> },

    #[error("Watch server is not running")]
    Closed,

    #[error("Operation is not allowed from the watch thread")]
    CalledFromWatchThread,

    #[error("Watch server did not terminate within {timeout_ms}ms")]
    TerminationTimeout { timeout_ms: u128 },

    #[error("Failed to spawn watch thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl WatchError {
    /// Per-path failures of a registration call, empty for other variants.
    pub fn path_failures(&self) -> &[PathFailure] {
        match self {
            WatchError::Registration { failures } => failures,
            _ => &[],
        }
    }
}

fn join_failures(failures: &[PathFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Map a notify error onto the boundary's failure categories.
///
/// Watch limits, instance limits (inotify instances count against the fd
/// table) and allocation failures are `ResourceExhausted`.
pub fn classify_notify_error(error: &notify::Error) -> FailureKind {
    match &error.kind {
        notify::ErrorKind::MaxFilesWatch => FailureKind::ResourceExhausted,
        notify::ErrorKind::Io(io)
            if io.kind() == std::io::ErrorKind::OutOfMemory || is_os_limit(io) =>
        {
            FailureKind::ResourceExhausted
        }
        _ => FailureKind::NativeWatchFailure,
    }
}

#[cfg(unix)]
fn is_os_limit(error: &std::io::Error) -> bool {
    matches!(
        error.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOSPC | libc::ENOMEM)
    )
}

#[cfg(not(unix))]
fn is_os_limit(_error: &std::io::Error) -> bool {
    false
}
