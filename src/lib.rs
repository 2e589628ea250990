//! Watch a dynamic set of filesystem paths and receive classified change
//! events until explicitly stopped.
//!
//! A [`WatchServer`] owns one dedicated thread that sets up the notification
//! backend and then blocks waiting for OS events, forwarding each one to a
//! [`Listener`]. Paths are added and removed from other threads while the
//! server runs; [`WatchServer::shutdown`] and
//! [`WatchServer::await_termination`] stop it.

pub mod config;
pub mod logging;
pub mod watcher;

pub use config::{LoggingConfig, Settings, WatchConfig};
pub use watcher::{
    BackendKind, ChangeKind, FailureKind, Listener, PathFailure, ServerState, WatchError,
    WatchServer, WatchServerBuilder,
};

/// Version of this crate.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
