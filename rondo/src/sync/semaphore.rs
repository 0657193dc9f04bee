use crate::context;
use crate::sync::waitlist::{WaitState, Waiter, Waitlist};
use crate::{Error, Result};
use std::cell::Cell;
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// A counting semaphore with strict FIFO admission.
///
/// A released permit goes straight to the longest waiting party, so a task
/// arriving later never overtakes one that is already queued.
///
/// # Examples
///
/// ```
/// use rondo::sync::Semaphore;
/// use rondo::time::sleep;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// # #[rondo::main(start_paused = true)]
/// # async fn main() -> rondo::Result<()> {
/// let sem = Rc::new(Semaphore::new(2));
///
/// let workers: Vec<_> = (0..4)
///     .map(|_| {
///         let sem = sem.clone();
///         rondo::spawn(async move {
///             let _permit = sem.acquire().await?;
///             sleep(Duration::from_secs(1)).await
///         })
///     })
///     .collect();
///
/// for worker in workers {
///     worker.await?;
/// }
/// assert_eq!(sem.available_permits(), 2);
/// # Ok(())
/// # }
/// ```
pub struct Semaphore {
    permits: Cell<usize>,
    waiters: Waitlist,
}

impl Semaphore {
    pub fn new(permits: usize) -> Semaphore {
        Semaphore {
            permits: Cell::new(permits),
            waiters: Waitlist::default(),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.get()
    }

    /// Whether `acquire` would suspend right now.
    pub fn locked(&self) -> bool {
        self.permits.get() == 0 || !self.waiters.is_empty()
    }

    /// Waits for a permit.
    pub fn acquire(&self) -> Acquire<'_> {
        Acquire {
            sem: self,
            waiter: None,
        }
    }

    /// Takes a permit if one is available and nobody is queued for it.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        if self.locked() {
            return None;
        }

        self.permits.set(self.permits.get() - 1);
        Some(Permit { sem: self })
    }

    /// Adds `n` permits, handing them to queued parties first.
    pub fn add_permits(&self, n: usize) {
        self.release(n);
    }

    fn release(&self, mut n: usize) {
        while n > 0 && self.waiters.notify_one(1) {
            n -= 1;
        }

        self.permits.set(self.permits.get() + n);
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("permits", &self.permits.get())
            .field("waiters", &self.waiters.len())
            .finish()
    }
}

/// A held permit, returned to the semaphore on drop.
#[must_use = "the permit is released as soon as it is dropped"]
pub struct Permit<'a> {
    sem: &'a Semaphore,
}

impl Permit<'_> {
    /// Consumes the permit without giving it back. The semaphore capacity
    /// shrinks by one.
    pub fn forget(self) {
        std::mem::forget(self);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.sem.release(1);
    }
}

impl fmt::Debug for Permit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit").finish_non_exhaustive()
    }
}

/// Future returned by [`Semaphore::acquire`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Acquire<'a> {
    sem: &'a Semaphore,
    waiter: Option<Rc<Waiter>>,
}

impl<'a> Acquire<'a> {
    /// Leaves the queue. A permit granted in the meantime moves on to the
    /// next party.
    fn withdraw(&mut self) {
        let Some(waiter) = self.waiter.take() else {
            return;
        };

        match waiter.state() {
            WaitState::Waiting => {
                self.sem.waiters.remove(&waiter);
            }
            WaitState::Notified(_) => self.sem.release(1),
            WaitState::Broken => {}
        }
    }
}

impl<'a> Future for Acquire<'a> {
    type Output = Result<Permit<'a>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if context::take_cancellation() {
            this.withdraw();
            return Poll::Ready(Err(Error::Cancelled));
        }

        let sem = this.sem;

        let Some(waiter) = &this.waiter else {
            if let Some(permit) = sem.try_acquire() {
                return Poll::Ready(Ok(permit));
            }

            this.waiter = Some(sem.waiters.push(cx.waker()));
            return Poll::Pending;
        };

        match waiter.state() {
            WaitState::Waiting => {
                waiter.register(cx.waker());
                Poll::Pending
            }
            WaitState::Notified(_) => {
                this.waiter = None;
                Poll::Ready(Ok(Permit { sem }))
            }
            WaitState::Broken => {
                this.waiter = None;
                Poll::Ready(Err(Error::InvalidState("semaphore waiter broken")))
            }
        }
    }
}

impl Drop for Acquire<'_> {
    fn drop(&mut self) {
        self.withdraw();
    }
}
