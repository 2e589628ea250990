//! Lifecycle state shared between the watch thread and its controllers.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Lifecycle of a watch server.
///
/// `Created -> Running -> StopRequested -> Terminated`. A stop may also be
/// requested before setup finished, and any state may jump straight to
/// `Terminated` when setup or the watch loop fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServerState {
    Created,
    Running,
    StopRequested,
    Terminated,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Created => "created",
            ServerState::Running => "running",
            ServerState::StopRequested => "stop requested",
            ServerState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Guarded lifecycle state plus a condition variable for termination waits.
///
/// No method holds the lock while waiting on anything but the condition
/// variable, so `mark_terminated` never blocks behind `await_termination`.
#[derive(Debug)]
pub struct TerminationGate {
    state: Mutex<ServerState>,
    terminated: Condvar,
}

impl Default for TerminationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminationGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServerState::Created),
            terminated: Condvar::new(),
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    /// Move `Created -> Running`. Returns `false` if a stop was already
    /// requested, in which case the caller must not enter its loop.
    pub fn mark_running(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            ServerState::Created => {
                *state = ServerState::Running;
                true
            }
            ServerState::Running => true,
            ServerState::StopRequested | ServerState::Terminated => false,
        }
    }

    /// Request a stop. Returns `true` only for the call that made the
    /// transition; later calls are no-ops.
    pub fn request_stop(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            ServerState::Created | ServerState::Running => {
                *state = ServerState::StopRequested;
                true
            }
            ServerState::StopRequested | ServerState::Terminated => false,
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.state.lock() >= ServerState::StopRequested
    }

    /// Enter the absorbing `Terminated` state and release every waiter.
    /// Returns `true` only for the first call.
    pub fn mark_terminated(&self) -> bool {
        let mut state = self.state.lock();
        if *state == ServerState::Terminated {
            return false;
        }
        *state = ServerState::Terminated;
        drop(state);
        self.terminated.notify_all();
        true
    }

    /// Wait up to `timeout` for termination.
    ///
    /// A zero timeout checks the state without blocking.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if *state == ServerState::Terminated {
            return true;
        }
        if timeout.is_zero() {
            return false;
        }

        let Some(deadline) = Instant::now().checked_add(timeout) else {
            // Effectively unbounded
            while *state != ServerState::Terminated {
                self.terminated.wait(&mut state);
            }
            return true;
        };

        while *state != ServerState::Terminated {
            if self.terminated.wait_until(&mut state, deadline).timed_out() {
                return *state == ServerState::Terminated;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lifecycle_transitions() {
        let gate = TerminationGate::new();
        assert_eq!(gate.state(), ServerState::Created);

        assert!(gate.mark_running());
        assert_eq!(gate.state(), ServerState::Running);

        assert!(gate.request_stop());
        assert!(gate.is_stop_requested());
        assert_eq!(gate.state(), ServerState::StopRequested);

        assert!(gate.mark_terminated());
        assert_eq!(gate.state(), ServerState::Terminated);
    }

    #[test]
    fn test_request_stop_is_idempotent() {
        let gate = TerminationGate::new();
        gate.mark_running();

        assert!(gate.request_stop());
        assert!(!gate.request_stop());
        assert_eq!(gate.state(), ServerState::StopRequested);
    }

    #[test]
    fn test_mark_terminated_once() {
        let gate = TerminationGate::new();
        assert!(gate.mark_terminated());
        assert!(!gate.mark_terminated());

        // Terminated is absorbing
        assert!(!gate.request_stop());
        assert!(!gate.mark_running());
        assert_eq!(gate.state(), ServerState::Terminated);
    }

    #[test]
    fn test_stop_before_running_blocks_loop_entry() {
        let gate = TerminationGate::new();
        assert!(gate.request_stop());
        assert!(!gate.mark_running());
    }

    #[test]
    fn test_zero_timeout_does_not_block() {
        let gate = TerminationGate::new();
        let started = Instant::now();
        assert!(!gate.await_termination(Duration::ZERO));
        assert!(started.elapsed() < Duration::from_millis(50));

        gate.mark_terminated();
        assert!(gate.await_termination(Duration::ZERO));
    }

    #[test]
    fn test_timeout_elapses_without_termination() {
        let gate = TerminationGate::new();
        let started = Instant::now();
        assert!(!gate.await_termination(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_all_waiters_released() {
        let gate = Arc::new(TerminationGate::new());

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                thread::spawn(move || gate.await_termination(Duration::from_secs(5)))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        gate.mark_terminated();

        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }
    }

    #[test]
    fn test_huge_timeout_still_returns() {
        let gate = Arc::new(TerminationGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.await_termination(Duration::MAX))
        };

        thread::sleep(Duration::from_millis(20));
        gate.mark_terminated();
        assert!(waiter.join().unwrap());
    }
}
