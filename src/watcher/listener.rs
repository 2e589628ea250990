//! Listener capability and change kinds delivered by the watch server.

use std::fmt;
use std::path::Path;

use super::FailureKind;

/// Classification of a filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A file or directory appeared.
    Created,
    /// A file or directory disappeared.
    Removed,
    /// Contents or metadata changed.
    Modified,
    /// A watched root is gone and is no longer watched.
    Invalidated,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Created => "created",
            ChangeKind::Removed => "removed",
            ChangeKind::Modified => "modified",
            ChangeKind::Invalidated => "invalidated",
        };
        f.write_str(name)
    }
}

/// Receiver of classified events.
///
/// Every method is called synchronously from the server's watch thread, in
/// the order the OS reported events. A method that blocks stalls the watch
/// loop; nothing is buffered on the listener's behalf.
///
/// The server holds the listener behind an `Arc`, so it may outlive the
/// server but never the other way around.
pub trait Listener: Send + Sync {
    /// A classified change to `path`.
    fn on_change(&self, kind: ChangeKind, path: &Path);

    /// A change to `path` the backend could not classify.
    fn on_unknown_event(&self, path: &Path);

    /// Events were lost. Treat `path` (or every watched path when `None`)
    /// as stale and rescan it.
    fn on_overflow(&self, path: Option<&Path>);

    /// The watch loop failed. No further events follow.
    fn on_failure(&self, kind: FailureKind, message: &str);
}
