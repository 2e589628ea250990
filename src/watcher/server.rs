//! Watch server: one dedicated thread delivering classified events for a
//! dynamic set of paths.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, select};
use notify::Event;
use parking_lot::{Mutex, RwLock};

use super::backend::{self, BackendKind, Classified, NativeWatcher};
use super::error::{FailureKind, PathFailure, WatchError, classify_notify_error};
use super::listener::{ChangeKind, Listener};
use super::path_registry::PathRegistry;
use super::reporter::EventReporter;
use super::termination::{ServerState, TerminationGate};
use crate::config::WatchConfig;

/// State shared between the controller side and the watch thread.
struct Shared {
    gate: TerminationGate,
    registry: RwLock<PathRegistry>,
    /// `None` before setup and after teardown.
    watcher: Mutex<Option<NativeWatcher>>,
    /// Roots invalidated by the watch thread whose native watch still needs
    /// releasing. Released by the next registration call.
    invalidated: Mutex<Vec<PathBuf>>,
}

impl Shared {
    fn release_invalidated(&self, watcher: &mut NativeWatcher) {
        // Not held across unwatch: the watch thread pushes here mid-event
        let stale = std::mem::take(&mut *self.invalidated.lock());
        for root in stale {
            if let Err(e) = watcher.unwatch(&root) {
                crate::debug_event!("server", "release", "{}: {e}", root.display());
            }
        }
    }
}

/// Marks the gate terminated however the watch thread exits, panics included.
struct TerminateOnExit(Arc<Shared>);

impl Drop for TerminateOnExit {
    fn drop(&mut self) {
        self.0.gate.mark_terminated();
    }
}

/// A running watch session.
///
/// Created through [`WatchServer::builder`]. The dedicated thread performs
/// backend setup and then waits for OS notifications, calling the listener
/// for each one. Registration, shutdown and termination waits are called
/// from any other thread.
///
/// Dropping the server requests a shutdown and joins the watch thread.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use file_events::{ChangeKind, FailureKind, Listener, WatchServer};
///
/// struct Print;
///
/// impl Listener for Print {
///     fn on_change(&self, kind: ChangeKind, path: &std::path::Path) {
///         println!("{kind} {}", path.display());
///     }
///     fn on_unknown_event(&self, _path: &std::path::Path) {}
///     fn on_overflow(&self, _path: Option<&std::path::Path>) {}
///     fn on_failure(&self, kind: FailureKind, message: &str) {
///         eprintln!("{kind}: {message}");
///     }
/// }
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let server = WatchServer::builder(Arc::new(Print)).start()?;
/// server.register_paths(["/tmp/project"])?;
/// // ...
/// server.shutdown();
/// assert!(server.await_termination(Duration::from_secs(5)));
/// # Ok(())
/// # }
/// ```
pub struct WatchServer {
    shared: Arc<Shared>,
    stop_tx: Sender<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
    backend: BackendKind,
    recursive: bool,
}

impl WatchServer {
    /// Create a builder for a server reporting to `listener`.
    pub fn builder(listener: Arc<dyn Listener>) -> WatchServerBuilder {
        WatchServerBuilder::new(listener)
    }

    pub fn state(&self) -> ServerState {
        self.shared.gate.state()
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Snapshot of the currently watched roots.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.shared.registry.read().snapshot()
    }

    /// Start watching `paths`.
    ///
    /// Best effort: every path is attempted in order and successful ones stay
    /// registered. Failures are collected into [`WatchError::Registration`].
    /// Paths must be absolute and not already watched.
    pub fn register_paths<I, P>(&self, paths: I) -> Result<(), WatchError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.ensure_controller_thread()?;

        let mut slot = self.shared.watcher.lock();
        let watcher = match slot.as_mut() {
            Some(watcher) if !self.shared.gate.is_stop_requested() => watcher,
            _ => return Err(WatchError::Closed),
        };
        self.shared.release_invalidated(watcher);

        let mut failures = Vec::new();
        for path in paths {
            let path = path.into();

            if !path.is_absolute() {
                failures.push(PathFailure::new(
                    path,
                    FailureKind::NativeWatchFailure,
                    "path is not absolute",
                ));
                continue;
            }

            if self.shared.registry.read().contains(&path) {
                failures.push(PathFailure::new(
                    path,
                    FailureKind::NativeWatchFailure,
                    "already watching path",
                ));
                continue;
            }

            if let Err(e) = std::fs::metadata(&path) {
                failures.push(PathFailure::new(
                    path,
                    FailureKind::NativeWatchFailure,
                    e.to_string(),
                ));
                continue;
            }

            match watcher.watch(&path, self.recursive) {
                Ok(()) => {
                    crate::debug_event!("server", "watching", "{}", path.display());
                    self.shared.registry.write().add(path);
                }
                Err(e) => {
                    let kind = classify_notify_error(&e);
                    failures.push(PathFailure::new(path, kind, e.to_string()));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            for failure in &failures {
                tracing::warn!("[server] cannot watch {failure}");
            }
            Err(WatchError::Registration { failures })
        }
    }

    /// Stop watching `paths`.
    ///
    /// Paths that are not watched are skipped. Returns `Ok(false)` when the
    /// backend failed to release at least one watch; such paths are still
    /// dropped from the registry.
    pub fn unregister_paths<I, P>(&self, paths: I) -> Result<bool, WatchError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.ensure_controller_thread()?;

        let mut slot = self.shared.watcher.lock();
        let watcher = match slot.as_mut() {
            Some(watcher) if !self.shared.gate.is_stop_requested() => watcher,
            _ => return Err(WatchError::Closed),
        };
        self.shared.release_invalidated(watcher);

        let mut success = true;
        for path in paths {
            let path = path.into();

            if !self.shared.registry.write().remove(&path) {
                crate::debug_event!("server", "not watched", "{}", path.display());
                continue;
            }

            match watcher.unwatch(&path) {
                Ok(()) => crate::debug_event!("server", "unwatched", "{}", path.display()),
                Err(e) => {
                    tracing::warn!("[server] failed to unwatch {}: {e}", path.display());
                    success = false;
                }
            }
        }

        Ok(success)
    }

    /// Ask the watch thread to stop. Returns immediately; repeated calls are
    /// no-ops.
    pub fn shutdown(&self) {
        if self.shared.gate.request_stop() {
            crate::log_event!("server", "shutdown requested");
        }
        // Wakes the loop; a full slot means a wake-up is already pending
        let _ = self.stop_tx.try_send(());
    }

    /// Wait up to `timeout` for the watch thread to terminate.
    ///
    /// A zero timeout only checks the current state. Any number of threads
    /// may wait at once.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        self.shared.gate.await_termination(timeout)
    }

    /// Shut down, wait up to `timeout` for termination, then join the thread.
    pub fn close(&self, timeout: Duration) -> Result<(), WatchError> {
        self.ensure_controller_thread()?;

        let mut thread = self.thread.lock();
        if thread.is_none() {
            return Err(WatchError::Closed);
        }

        self.shutdown();
        if !self.await_termination(timeout) {
            return Err(WatchError::TerminationTimeout {
                timeout_ms: timeout.as_millis(),
            });
        }

        if let Some(handle) = thread.take() {
            join_watch_thread(handle);
        }
        Ok(())
    }

    fn ensure_controller_thread(&self) -> Result<(), WatchError> {
        // The backend may be waiting to hand this very thread an event
        if thread::current().id() == self.thread_id {
            return Err(WatchError::CalledFromWatchThread);
        }
        Ok(())
    }
}

impl Drop for WatchServer {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.thread.get_mut().take() {
            if thread::current().id() == self.thread_id {
                // Dropped from a listener callback; the thread exits on its own
                return;
            }
            join_watch_thread(handle);
        }
    }
}

fn join_watch_thread(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        tracing::error!("[server] watch thread panicked");
    }
}

/// Builder for constructing a [`WatchServer`].
pub struct WatchServerBuilder {
    listener: Arc<dyn Listener>,
    backend: BackendKind,
    poll_interval: Duration,
    recursive: bool,
    thread_name: String,
}

impl WatchServerBuilder {
    /// Create a new builder with defaults.
    pub fn new(listener: Arc<dyn Listener>) -> Self {
        let defaults = WatchConfig::default();
        Self {
            listener,
            backend: defaults.backend,
            poll_interval: Duration::from_millis(defaults.poll_interval_ms),
            recursive: defaults.recursive,
            thread_name: "file-events-watcher".to_string(),
        }
    }

    /// Apply the `[watch]` section of the settings.
    pub fn with_config(mut self, config: &WatchConfig) -> Self {
        self.backend = config.backend;
        self.poll_interval = Duration::from_millis(config.poll_interval_ms);
        self.recursive = config.recursive;
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Scan interval of the poll backend.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Watch whole subtrees instead of direct children only.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Spawn the watch thread and wait for its setup to finish.
    ///
    /// Setup failures do not surface here: the listener receives them via
    /// `on_failure` and the returned server is already terminated.
    pub fn start(self) -> Result<WatchServer, WatchError> {
        let shared = Arc::new(Shared {
            gate: TerminationGate::new(),
            registry: RwLock::new(PathRegistry::new()),
            watcher: Mutex::new(None),
            invalidated: Mutex::new(Vec::new()),
        });

        let (stop_tx, stop_rx) = bounded(1);
        let (ready_tx, ready_rx) = bounded(1);

        let setup = ThreadSetup {
            shared: Arc::clone(&shared),
            listener: self.listener,
            backend: self.backend,
            poll_interval: self.poll_interval,
            recursive: self.recursive,
            stop_rx,
            ready_tx,
        };

        let handle = thread::Builder::new()
            .name(self.thread_name)
            .spawn(move || run_watch_thread(setup))?;
        let thread_id = handle.thread().id();

        // Disconnects instead if setup panicked
        let _ = ready_rx.recv();

        Ok(WatchServer {
            shared,
            stop_tx,
            thread: Mutex::new(Some(handle)),
            thread_id,
            backend: self.backend,
            recursive: self.recursive,
        })
    }
}

struct ThreadSetup {
    shared: Arc<Shared>,
    listener: Arc<dyn Listener>,
    backend: BackendKind,
    poll_interval: Duration,
    recursive: bool,
    stop_rx: Receiver<()>,
    ready_tx: Sender<()>,
}

fn run_watch_thread(setup: ThreadSetup) {
    let ThreadSetup {
        shared,
        listener,
        backend,
        poll_interval,
        recursive,
        stop_rx,
        ready_tx,
    } = setup;

    let _terminate = TerminateOnExit(Arc::clone(&shared));
    let mut reporter = EventReporter::new(listener);

    // Zero capacity: the backend waits for the loop to take each event
    let (event_tx, event_rx) = bounded(0);

    match NativeWatcher::create(backend, poll_interval, event_tx) {
        Ok(watcher) => *shared.watcher.lock() = Some(watcher),
        Err(e) => {
            let kind = classify_notify_error(&e);
            reporter.report_failure(kind, &format!("Failed to initialize watcher: {e}"));
            shared.gate.mark_terminated();
            let _ = ready_tx.send(());
            return;
        }
    }

    if !shared.gate.mark_running() {
        teardown(&shared, event_rx);
        shared.gate.mark_terminated();
        let _ = ready_tx.send(());
        return;
    }
    let _ = ready_tx.send(());

    crate::log_event!("server", "started", "{backend:?} backend");

    let mut watch_loop = WatchLoop {
        shared: &shared,
        reporter,
        recursive,
    };
    watch_loop.run(&event_rx, &stop_rx);

    teardown(&shared, event_rx);
    crate::log_event!("server", "terminated");
}

/// Release the backend and clear the registry.
fn teardown(shared: &Shared, event_rx: Receiver<notify::Result<Event>>) {
    // Unblocks a backend thread waiting to hand over an event, which in turn
    // lets any registration call holding the watcher lock finish
    drop(event_rx);

    let watcher = shared.watcher.lock().take();
    let released = shared.registry.write().drain();
    shared.invalidated.lock().clear();
    drop(watcher);

    crate::debug_event!("server", "released", "{} path(s)", released.len());
}

struct WatchLoop<'a> {
    shared: &'a Shared,
    reporter: EventReporter,
    recursive: bool,
}

impl WatchLoop<'_> {
    fn run(&mut self, events: &Receiver<notify::Result<Event>>, stop: &Receiver<()>) {
        loop {
            if self.shared.gate.is_stop_requested() {
                break;
            }

            select! {
                recv(stop) -> _ => break,
                recv(events) -> res => match res {
                    Ok(Ok(event)) => self.handle_event(event),
                    Ok(Err(error)) => self.handle_error(error),
                    Err(_) => self.reporter.report_failure(
                        FailureKind::NativeWatchFailure,
                        "backend event channel closed",
                    ),
                },
            }

            if self.reporter.has_failed() {
                break;
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        for classified in backend::classify(event) {
            // Nothing more is produced once the server leaves Running
            if self.shared.gate.is_stop_requested() {
                crate::debug_event!("server", "dropped after stop", "{classified:?}");
                return;
            }
            match classified {
                Classified::Change(ChangeKind::Removed, path) if self.is_root(&path) => {
                    self.invalidate(path);
                }
                Classified::Change(kind, path) => self.reporter.report_change(kind, &path),
                Classified::Unknown(path) => self.reporter.report_unknown(&path),
                Classified::Overflow(path) => self.reporter.report_overflow(path.as_deref()),
            }
        }
    }

    fn handle_error(&mut self, error: notify::Error) {
        if is_not_found(&error) {
            // A vanished root invalidates it; anything else already went away
            for path in error.paths {
                if self.is_root(&path) {
                    self.invalidate(path);
                } else {
                    crate::debug_event!("server", "gone", "{}", path.display());
                }
            }
            return;
        }

        let unrelated = !error.paths.is_empty() && {
            let registry = self.shared.registry.read();
            error
                .paths
                .iter()
                .all(|p| registry.owning_root(p, self.recursive).is_none())
        };
        if unrelated {
            crate::debug_event!("server", "stale backend error", "{error}");
            return;
        }

        let kind = classify_notify_error(&error);
        self.reporter.report_failure(kind, &error.to_string());
    }

    fn is_root(&self, path: &std::path::Path) -> bool {
        self.shared.registry.read().contains(path)
    }

    fn invalidate(&mut self, root: PathBuf) {
        if self.shared.registry.write().remove(&root) {
            self.shared.invalidated.lock().push(root.clone());
            self.reporter.report_change(ChangeKind::Invalidated, &root);
        }
    }
}

fn is_not_found(error: &notify::Error) -> bool {
    match &error.kind {
        notify::ErrorKind::PathNotFound | notify::ErrorKind::WatchNotFound => true,
        notify::ErrorKind::Io(io) => io.kind() == std::io::ErrorKind::NotFound,
        _ => false,
    }
}
