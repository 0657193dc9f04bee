use crate::context;
use crate::sync::waitlist::{WaitState, Waiter, Waitlist};
use crate::{Error, Result};
use std::cell::Cell;
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// A flag tasks can wait on.
///
/// [`set`](Event::set) releases every waiting task at once. While the flag is
/// set, waiting completes without suspending.
#[derive(Default)]
pub struct Event {
    flag: Cell<bool>,
    waiters: Waitlist,
}

impl Event {
    pub fn new() -> Event {
        Event::default()
    }

    pub fn is_set(&self) -> bool {
        self.flag.get()
    }

    /// Sets the flag and releases every waiter.
    pub fn set(&self) {
        if !self.flag.replace(true) {
            self.waiters.notify_all();
        }
    }

    /// Resets the flag. Waiters already released by `set` are not affected.
    pub fn clear(&self) {
        self.flag.set(false);
    }

    /// Waits until the flag is set.
    pub fn wait(&self) -> EventWait<'_> {
        EventWait {
            event: self,
            waiter: None,
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("set", &self.flag.get())
            .field("waiters", &self.waiters.len())
            .finish()
    }
}

/// Future returned by [`Event::wait`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct EventWait<'a> {
    event: &'a Event,
    waiter: Option<Rc<Waiter>>,
}

impl EventWait<'_> {
    fn withdraw(&mut self) {
        if let Some(waiter) = self.waiter.take() {
            self.event.waiters.remove(&waiter);
        }
    }
}

impl Future for EventWait<'_> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if context::take_cancellation() {
            this.withdraw();
            return Poll::Ready(Err(Error::Cancelled));
        }

        let Some(waiter) = &this.waiter else {
            if this.event.is_set() {
                return Poll::Ready(Ok(()));
            }

            this.waiter = Some(this.event.waiters.push(cx.waker()));
            return Poll::Pending;
        };

        match waiter.state() {
            WaitState::Waiting => {
                waiter.register(cx.waker());
                Poll::Pending
            }
            WaitState::Notified(_) | WaitState::Broken => {
                this.waiter = None;
                Poll::Ready(Ok(()))
            }
        }
    }
}

impl Drop for EventWait<'_> {
    fn drop(&mut self) {
        self.withdraw();
    }
}
