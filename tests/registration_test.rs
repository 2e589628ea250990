//! Path registration tests for the watch server

mod common;

use common::{RecordingListener, canonical};
use file_events::{BackendKind, FailureKind, WatchError, WatchServer};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn start() -> WatchServer {
    WatchServer::builder(Arc::new(RecordingListener::new()))
        .start()
        .unwrap()
}

fn make_dirs(root: &std::path::Path, prefix: &str, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let dir = root.join(format!("{prefix}-{i}"));
            fs::create_dir(&dir).unwrap();
            dir
        })
        .collect()
}

#[test]
fn test_register_and_unregister() {
    let temp_dir = TempDir::new().unwrap();
    let dirs = make_dirs(&canonical(temp_dir.path()), "dir", 3);
    let server = start();

    server.register_paths(dirs.clone()).unwrap();
    assert_eq!(server.watched_paths(), dirs);

    assert!(server.unregister_paths([dirs[1].clone()]).unwrap());
    assert_eq!(server.watched_paths(), vec![dirs[0].clone(), dirs[2].clone()]);
}

#[test]
fn test_unregister_unknown_path_is_noop() {
    let temp_dir = TempDir::new().unwrap();
    let dirs = make_dirs(&canonical(temp_dir.path()), "dir", 1);
    let server = start();
    server.register_paths(dirs.clone()).unwrap();

    let never_registered = canonical(temp_dir.path()).join("never");
    assert!(server.unregister_paths([never_registered]).unwrap());
    assert_eq!(server.watched_paths(), dirs);
}

#[test]
fn test_registration_is_best_effort() {
    let temp_dir = TempDir::new().unwrap();
    let root = canonical(temp_dir.path());
    let dirs = make_dirs(&root, "dir", 2);
    let missing = root.join("missing");
    let server = start();

    let err = server
        .register_paths([
            dirs[0].clone(),
            PathBuf::from("relative/path"),
            missing.clone(),
            dirs[1].clone(),
        ])
        .unwrap_err();

    let failures = err.path_failures();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].path, PathBuf::from("relative/path"));
    assert!(failures[0].reason.contains("not absolute"));
    assert_eq!(failures[1].path, missing);
    assert_eq!(failures[1].kind, FailureKind::NativeWatchFailure);

    // Valid paths around the failures are still watched
    assert_eq!(server.watched_paths(), dirs);
}

#[test]
fn test_duplicate_registration_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let dirs = make_dirs(&canonical(temp_dir.path()), "dir", 1);
    let server = start();

    server.register_paths(dirs.clone()).unwrap();
    let err = server.register_paths(dirs.clone()).unwrap_err();

    assert!(matches!(err, WatchError::Registration { .. }));
    assert!(err.path_failures()[0].reason.contains("already watching"));
    assert_eq!(server.watched_paths(), dirs);

    // Duplicates inside a single call are caught too
    let fresh = make_dirs(&canonical(temp_dir.path()), "fresh", 1);
    let err = server
        .register_paths([fresh[0].clone(), fresh[0].clone()])
        .unwrap_err();
    assert_eq!(err.path_failures().len(), 1);
    assert_eq!(server.watched_paths().len(), 2);
}

#[test]
fn test_concurrent_registration_is_serializable() {
    let temp_dir = TempDir::new().unwrap();
    let root = canonical(temp_dir.path());

    let per_thread: Vec<Vec<PathBuf>> = (0..4)
        .map(|t| make_dirs(&root, &format!("t{t}"), 6))
        .collect();

    let server = start();

    std::thread::scope(|scope| {
        for dirs in &per_thread {
            let server = &server;
            scope.spawn(move || {
                for dir in dirs {
                    server.register_paths([dir.clone()]).unwrap();
                }
                // Drop every other path again
                let removed: Vec<PathBuf> = dirs.iter().step_by(2).cloned().collect();
                assert!(server.unregister_paths(removed).unwrap());
            });
        }
    });

    let expected: BTreeSet<PathBuf> = per_thread
        .iter()
        .flat_map(|dirs| dirs.iter().skip(1).step_by(2).cloned())
        .collect();
    let actual: BTreeSet<PathBuf> = server.watched_paths().into_iter().collect();
    assert_eq!(actual, expected);

    server.close(Duration::from_secs(5)).unwrap();
}

#[test]
fn test_poll_backend_registration() {
    let temp_dir = TempDir::new().unwrap();
    let root = canonical(temp_dir.path());
    let dirs = make_dirs(&root, "dir", 2);

    let server = WatchServer::builder(Arc::new(RecordingListener::new()))
        .backend(BackendKind::Poll)
        .poll_interval(Duration::from_millis(50))
        .recursive(true)
        .start()
        .unwrap();
    assert!(server.is_recursive());

    server.register_paths(dirs.clone()).unwrap();
    assert_eq!(server.watched_paths(), dirs);

    // Missing paths fail up front instead of surfacing later as backend errors
    let err = server.register_paths([root.join("missing")]).unwrap_err();
    assert_eq!(err.path_failures().len(), 1);

    assert!(server.unregister_paths(dirs).unwrap());
    assert!(server.watched_paths().is_empty());
}
