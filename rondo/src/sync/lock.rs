use crate::Result;
use crate::sync::{Permit, Semaphore};
use std::fmt;

/// A mutual exclusion lock for tasks, granted in FIFO order.
///
/// Unlike a `RefCell`, holding the lock across suspension points is the whole
/// point: other tasks trying to acquire it wait until the guard is dropped.
pub struct Lock {
    sem: Semaphore,
}

impl Lock {
    pub fn new() -> Lock {
        Lock {
            sem: Semaphore::new(1),
        }
    }

    /// Waits until the lock is free and takes it.
    pub async fn acquire(&self) -> Result<LockGuard<'_>> {
        let permit = self.sem.acquire().await?;
        Ok(LockGuard { _permit: permit })
    }

    pub fn try_acquire(&self) -> Option<LockGuard<'_>> {
        self.sem
            .try_acquire()
            .map(|permit| LockGuard { _permit: permit })
    }

    pub fn locked(&self) -> bool {
        self.sem.available_permits() == 0
    }
}

impl Default for Lock {
    fn default() -> Self {
        Lock::new()
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("locked", &self.locked())
            .finish()
    }
}

/// Releases the [`Lock`] on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    _permit: Permit<'a>,
}

impl fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").finish_non_exhaustive()
    }
}
