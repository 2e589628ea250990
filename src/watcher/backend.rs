//! Backend variants and classification of raw notify events.
//!
//! The backend is chosen once when the server is built. The watch thread
//! creates the [`NativeWatcher`] and drops it on teardown.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::Sender;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};

/// Which notification mechanism backs a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// inotify, kqueue/FSEvents or ReadDirectoryChangesW, per platform.
    #[default]
    Native,
    /// Periodic directory scans.
    Poll,
}

/// Owned native watcher for one server.
pub(crate) enum NativeWatcher {
    Native(RecommendedWatcher),
    Poll(PollWatcher),
}

impl NativeWatcher {
    /// Create the backend, forwarding raw results into `events`.
    ///
    /// `events` is expected to be a zero-capacity channel: notify's delivery
    /// thread then waits for the watch loop to take each event.
    pub(crate) fn create(
        kind: BackendKind,
        poll_interval: Duration,
        events: Sender<notify::Result<Event>>,
    ) -> notify::Result<Self> {
        let handler = move |res: notify::Result<Event>| {
            // The watch loop is gone once the receiver drops
            let _ = events.send(res);
        };

        match kind {
            BackendKind::Native => Ok(NativeWatcher::Native(notify::recommended_watcher(
                handler,
            )?)),
            BackendKind::Poll => {
                let config = notify::Config::default().with_poll_interval(poll_interval);
                Ok(NativeWatcher::Poll(PollWatcher::new(handler, config)?))
            }
        }
    }

    pub(crate) fn watch(&mut self, path: &Path, recursive: bool) -> notify::Result<()> {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        match self {
            NativeWatcher::Native(w) => w.watch(path, mode),
            NativeWatcher::Poll(w) => w.watch(path, mode),
        }
    }

    pub(crate) fn unwatch(&mut self, path: &Path) -> notify::Result<()> {
        match self {
            NativeWatcher::Native(w) => w.unwatch(path),
            NativeWatcher::Poll(w) => w.unwatch(path),
        }
    }
}

/// What a raw notify event means for the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Classified {
    Change(super::ChangeKind, PathBuf),
    Unknown(PathBuf),
    Overflow(Option<PathBuf>),
}

/// Translate one notify event into zero or more listener events.
///
/// Invalidation of watched roots is decided by the caller, which knows the
/// registry: a `Removed` change on a registered root becomes `Invalidated`.
pub(crate) fn classify(event: Event) -> Vec<Classified> {
    use super::ChangeKind::*;

    if event.need_rescan() {
        if event.paths.is_empty() {
            return vec![Classified::Overflow(None)];
        }
        return event
            .paths
            .into_iter()
            .map(|p| Classified::Overflow(Some(p)))
            .collect();
    }

    let kind = match event.kind {
        EventKind::Access(_) => return Vec::new(),
        EventKind::Any | EventKind::Other => {
            if event.paths.is_empty() {
                crate::debug_event!("backend", "pathless event", "{:?}", event.kind);
            }
            return event.paths.into_iter().map(Classified::Unknown).collect();
        }
        EventKind::Create(_) => Created,
        EventKind::Remove(_) => Removed,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Removed,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Created,
        // inotify follows its From and To halves with a combined event
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => return Vec::new(),
        EventKind::Modify(_) => Modified,
    };

    event
        .paths
        .into_iter()
        .map(|p| Classified::Change(kind, p))
        .collect()
}
