use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Stop flag for the watch loop whose waits end as soon as it is raised.
pub struct ShutdownSignal {
    shutdown: AtomicBool,
    condvar: Condvar,
    mutex: Mutex<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            shutdown: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
        }
    }

    /// Raise the flag and wake every waiter
    pub fn trigger(&self) {
        let _guard = self.mutex.lock();
        self.shutdown.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Sleep up to `duration`. Returns `true` if woken by a shutdown.
    pub fn wait(&self, duration: Duration) -> bool {
        let mut guard = self.mutex.lock();
        if self.is_shutdown() {
            return true;
        }
        let result = self
            .condvar
            .wait_while_for(&mut guard, |_| !self.is_shutdown(), duration);
        !result.timed_out() || self.is_shutdown()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
