//! A tiny set-once, wait-any-number-of-times signal, used for the supervisor-exit handshake
//! between [`crate::consumer::Consumer::shutdown`] and the supervisor loop.

use parking_lot::{Condvar, Mutex};

pub struct OneShotEvent {
    fired: Mutex<bool>,
    condvar: Condvar,
}

impl OneShotEvent {
    pub fn new() -> Self {
        Self {
            fired: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Marks the event as fired and wakes every current and future waiter. Idempotent.
    pub fn signal(&self) {
        let mut fired = self.fired.lock();
        *fired = true;
        self.condvar.notify_all();
    }

    /// Blocks until [`OneShotEvent::signal`] has been called at least once. Returns immediately
    /// if it already has been.
    pub fn wait(&self) {
        let mut fired = self.fired.lock();
        while !*fired {
            self.condvar.wait(&mut fired);
        }
    }

    pub fn is_set(&self) -> bool {
        *self.fired.lock()
    }
}

impl Default for OneShotEvent {
    fn default() -> Self {
        Self::new()
    }
}
