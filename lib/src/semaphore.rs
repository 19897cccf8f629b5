//! Admission control: a counting semaphore bounding the number of
//! concurrently active sessions.

use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// Cloneable counting semaphore. [`acquire`](Semaphore::acquire) blocks
/// while no permit is available and returns an RAII guard; dropping the
/// guard releases the permit and wakes one waiter. No fairness guarantee.
#[derive(Clone)]
pub struct Semaphore {
    inner: Arc<Inner>,
}

struct Inner {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Semaphore {
        Semaphore {
            inner: Arc::new(Inner {
                permits: Mutex::new(permits),
                available: Condvar::new(),
            }),
        }
    }

    pub fn acquire(&self) -> SemaphoreGuard {
        let mut permits = self
            .inner
            .permits
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while *permits == 0 {
            permits = self
                .inner
                .available
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= 1;
        SemaphoreGuard {
            inner: self.inner.clone(),
        }
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        *self
            .inner
            .permits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct SemaphoreGuard {
    inner: Arc<Inner>,
}

impl Drop for SemaphoreGuard {
    fn drop(&mut self) {
        let mut permits = self
            .inner
            .permits
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *permits += 1;
        self.inner.available.notify_one();
    }
}
