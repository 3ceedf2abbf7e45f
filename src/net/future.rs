//! Login completion barrier
//!
//! A one-shot barrier resolved on the session transition out of the
//! handshake. Waiters block on a condvar; registered listeners are drained
//! exactly once, and only when the login actually succeeded. Closing the
//! connection resolves the barrier too (releasing waiters) without running
//! the listeners.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

type Listener = Box<dyn FnOnce() + Send>;

struct FutureState {
    completed: bool,
    success: bool,
    listeners: Vec<Listener>,
}

/// One-shot barrier signalled when a bot's login attempt resolves
pub struct LoginFuture {
    state: Mutex<FutureState>,
    signal: Condvar,
}

impl LoginFuture {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FutureState {
                completed: false,
                success: false,
                listeners: Vec::new(),
            }),
            signal: Condvar::new(),
        }
    }

    /// Whether the login resolved successfully
    pub fn is_logged_in(&self) -> bool {
        let state = self.state.lock();
        state.completed && state.success
    }

    /// Whether the attempt resolved at all, successfully or not
    pub fn is_complete(&self) -> bool {
        self.state.lock().completed
    }

    /// Block until the attempt resolves
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock();
        while !state.completed {
            self.signal.wait(&mut state);
        }
        state.success
    }

    /// Block until the attempt resolves or the timeout passes.
    ///
    /// Returns the login status at the moment of return; a timeout does not
    /// cancel the underlying attempt.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.completed {
            if self.signal.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.completed && state.success
    }

    /// Register a callback to run once, when (and only if) the login
    /// succeeds. Registering after a successful resolution runs it now.
    pub fn on_login(&self, listener: impl FnOnce() + Send + 'static) {
        let run_now = {
            let mut state = self.state.lock();
            if state.completed {
                state.success
            } else {
                state.listeners.push(Box::new(listener));
                return;
            }
        };
        if run_now {
            listener();
        }
    }

    /// Resolve the barrier. Later calls are ignored.
    pub(crate) fn complete(&self, success: bool) {
        let listeners = {
            let mut state = self.state.lock();
            if state.completed {
                return;
            }
            state.completed = true;
            state.success = success;
            if success {
                std::mem::take(&mut state.listeners)
            } else {
                state.listeners.clear();
                Vec::new()
            }
        };

        self.signal.notify_all();
        for listener in listeners {
            listener();
        }
    }
}

impl Default for LoginFuture {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LoginFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LoginFuture")
            .field("completed", &state.completed)
            .field("success", &state.success)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}
