use crate::context;
use crate::sync::waitlist::{WaitState, Waiter, Waitlist};
use crate::{Error, Result};
use std::cell::Cell;
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Lets a fixed number of tasks wait for each other.
///
/// Once `parties` tasks are waiting, all of them are released and the barrier
/// starts a new generation. Tasks arriving after the release count towards the
/// next one.
///
/// # Examples
///
/// ```
/// use rondo::sync::Barrier;
/// use std::rc::Rc;
///
/// # #[rondo::main]
/// # async fn main() -> rondo::Result<()> {
/// let barrier = Rc::new(Barrier::new(3));
///
/// let parties: Vec<_> = (0..3)
///     .map(|_| {
///         let barrier = barrier.clone();
///         rondo::spawn(async move { barrier.wait().await })
///     })
///     .collect();
///
/// let mut leaders = 0;
/// for party in parties {
///     if party.await?.is_leader() {
///         leaders += 1;
///     }
/// }
/// assert_eq!(leaders, 1);
/// # Ok(())
/// # }
/// ```
pub struct Barrier {
    parties: usize,

    /// Parties waiting in the current generation.
    arrived: Cell<usize>,

    broken: Cell<bool>,

    waiters: Waitlist,
}

impl Barrier {
    /// # Panics
    ///
    /// Panics if `parties` is 0.
    #[track_caller]
    pub fn new(parties: usize) -> Barrier {
        assert!(parties > 0, "barrier needs at least one party");

        Barrier {
            parties,
            arrived: Cell::new(0),
            broken: Cell::new(false),
            waiters: Waitlist::default(),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Number of parties waiting in the current generation.
    pub fn n_waiting(&self) -> usize {
        self.arrived.get()
    }

    pub fn is_broken(&self) -> bool {
        self.broken.get()
    }

    /// Waits until `parties` tasks called `wait`.
    ///
    /// Fails with [`Error::BrokenBarrier`] if the barrier is aborted or reset
    /// while waiting, or if it was already aborted.
    pub fn wait(&self) -> BarrierWait<'_> {
        BarrierWait {
            barrier: self,
            waiter: None,
        }
    }

    /// Breaks the barrier. Current and future waits fail until
    /// [`reset`](Barrier::reset).
    pub fn abort(&self) {
        self.broken.set(true);
        self.arrived.set(0);
        self.waiters.break_all();
    }

    /// Fails the current waiters and returns to an empty, usable state.
    pub fn reset(&self) {
        self.arrived.set(0);
        self.waiters.break_all();
        self.broken.set(false);
    }
}

impl fmt::Debug for Barrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Barrier")
            .field("parties", &self.parties)
            .field("n_waiting", &self.n_waiting())
            .field("broken", &self.is_broken())
            .finish()
    }
}

/// Outcome of [`Barrier::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    index: usize,
    parties: usize,
}

impl BarrierWaitResult {
    /// Position of the party in its generation, `0..parties`.
    pub fn index(&self) -> usize {
        self.index
    }

    /// True for exactly one party per generation: the one that tripped the
    /// barrier.
    pub fn is_leader(&self) -> bool {
        self.index + 1 == self.parties
    }
}

/// Future returned by [`Barrier::wait`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct BarrierWait<'a> {
    barrier: &'a Barrier,
    waiter: Option<Rc<Waiter>>,
}

impl BarrierWait<'_> {
    fn result(&self, index: usize) -> BarrierWaitResult {
        BarrierWaitResult {
            index,
            parties: self.barrier.parties,
        }
    }

    /// Takes back an arrival that did not trip the barrier yet.
    fn withdraw(&mut self) {
        let Some(waiter) = self.waiter.take() else {
            return;
        };

        if waiter.state() == WaitState::Waiting && self.barrier.waiters.remove(&waiter) {
            let barrier = self.barrier;
            barrier.arrived.set(barrier.arrived.get() - 1);
        }
    }
}

impl Future for BarrierWait<'_> {
    type Output = Result<BarrierWaitResult>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let barrier = this.barrier;

        if context::take_cancellation() {
            this.withdraw();
            return Poll::Ready(Err(Error::Cancelled));
        }

        let Some(waiter) = &this.waiter else {
            if barrier.is_broken() {
                return Poll::Ready(Err(Error::BrokenBarrier));
            }

            let arrived = barrier.arrived.get() + 1;
            if arrived < barrier.parties {
                barrier.arrived.set(arrived);
                this.waiter = Some(barrier.waiters.push(cx.waker()));
                return Poll::Pending;
            }

            // Last one in trips the barrier and leads the generation.
            barrier.arrived.set(0);
            barrier.waiters.notify_all();
            return Poll::Ready(Ok(this.result(barrier.parties - 1)));
        };

        match waiter.state() {
            WaitState::Waiting => {
                waiter.register(cx.waker());
                Poll::Pending
            }
            WaitState::Notified(index) => {
                this.waiter = None;
                Poll::Ready(Ok(this.result(index)))
            }
            WaitState::Broken => {
                this.waiter = None;
                Poll::Ready(Err(Error::BrokenBarrier))
            }
        }
    }
}

impl Drop for BarrierWait<'_> {
    fn drop(&mut self) {
        self.withdraw();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as rondo;
    use crate::task::JoinHandle;
    use crate::time::{self, sleep};
    use anyhow::Result;
    use std::time::Duration;

    fn spawn_party(barrier: &Rc<Barrier>) -> JoinHandle<BarrierWaitResult> {
        let barrier = barrier.clone();
        rondo::spawn(async move { barrier.wait().await })
    }

    #[rondo::test(start_paused = true)]
    async fn test_extra_arrival_waits_for_next_generation() -> Result<()> {
        let barrier = Rc::new(Barrier::new(3));
        let first: Vec<_> = (0..4).map(|_| spawn_party(&barrier)).collect();

        sleep(Duration::from_secs(1)).await?;
        let done = first.iter().filter(|h| h.is_finished()).count();
        assert_eq!(done, 3);
        assert_eq!(barrier.n_waiting(), 1);

        let late: Vec<_> = (0..2).map(|_| spawn_party(&barrier)).collect();

        let mut leaders = 0;
        for handle in first.into_iter().chain(late) {
            let out = handle.await?;
            assert!(out.index() < 3);
            leaders += usize::from(out.is_leader());
        }

        assert_eq!(leaders, 2);
        assert_eq!(barrier.n_waiting(), 0);
        Ok(())
    }

    #[rondo::test]
    async fn test_generation_indexes_follow_arrival() -> Result<()> {
        let barrier = Rc::new(Barrier::new(3));
        let parties: Vec<_> = (0..3).map(|_| spawn_party(&barrier)).collect();

        let mut indexes = Vec::new();
        for party in parties {
            indexes.push(party.await?.index());
        }

        assert_eq!(indexes, vec![0, 1, 2]);
        Ok(())
    }

    #[rondo::test(start_paused = true)]
    async fn test_cancelled_party_withdraws() -> Result<()> {
        let barrier = Rc::new(Barrier::new(2));

        let quitter = spawn_party(&barrier);
        time::yield_now().await?;
        assert_eq!(barrier.n_waiting(), 1);

        quitter.cancel();
        assert_eq!(quitter.await, Err(Error::Cancelled));
        assert_eq!(barrier.n_waiting(), 0);

        // Two fresh parties are needed to trip it.
        let first = spawn_party(&barrier);
        sleep(Duration::from_secs(1)).await?;
        assert!(!first.is_finished());

        let second = spawn_party(&barrier);
        first.await?;
        second.await?;
        Ok(())
    }

    #[rondo::test]
    async fn test_abort_breaks_current_and_future_waits() -> Result<()> {
        let barrier = Rc::new(Barrier::new(3));

        let waiting = spawn_party(&barrier);
        time::yield_now().await?;

        barrier.abort();
        assert!(barrier.is_broken());
        assert_eq!(waiting.await, Err(Error::BrokenBarrier));
        assert_eq!(barrier.wait().await, Err(Error::BrokenBarrier));
        Ok(())
    }

    #[rondo::test]
    async fn test_reset_fails_waiters_and_stays_usable() -> Result<()> {
        let barrier = Rc::new(Barrier::new(2));

        let waiting = spawn_party(&barrier);
        time::yield_now().await?;

        barrier.reset();
        assert!(!barrier.is_broken());
        assert_eq!(waiting.await, Err(Error::BrokenBarrier));

        let a = spawn_party(&barrier);
        let b = spawn_party(&barrier);
        assert!(a.await?.index() < 2);
        assert!(b.await?.index() < 2);
        Ok(())
    }
}
