//! Watch server for a dynamic set of filesystem paths.
//!
//! # Architecture
//!
//! ```text
//! controller threads                 watch thread
//!   register_paths  ---+             NativeWatcher (notify)
//!   unregister_paths --+-> watcher       | rendezvous channel
//!   shutdown --------- stop channel -> WatchLoop
//!   await_termination <- TerminationGate  |
//!                                      EventReporter -> Listener
//! ```
//!
//! Registration and the watch loop share a `PathRegistry`. Events are
//! delivered synchronously; a slow listener slows the backend down instead
//! of filling a queue.

mod backend;
mod error;
mod listener;
mod path_registry;
mod reporter;
mod server;
mod termination;

pub use backend::BackendKind;
pub use error::{FailureKind, PathFailure, WatchError};
pub use listener::{ChangeKind, Listener};
pub use path_registry::PathRegistry;
pub use reporter::EventReporter;
pub use server::{WatchServer, WatchServerBuilder};
pub use termination::{ServerState, TerminationGate};
