use crate::context;
use crate::time::timer::Expire;
use crate::{Error, Result};
use std::cell::{Cell, RefCell};
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

/// Waits until `duration` has elapsed.
///
/// Always suspends at least once, even for a zero duration. Fails with
/// [`Error::Cancelled`] if the task is cancelled while sleeping. A duration
/// too large to represent as an [`Instant`] never elapses.
///
/// # Examples
///
/// ```
/// use rondo::time::{self, sleep};
/// use std::time::Duration;
///
/// # #[rondo::main(start_paused = true)]
/// # async fn main() -> rondo::Result<()> {
/// let start = time::now();
/// sleep(Duration::from_millis(100)).await?;
/// assert_eq!(time::now() - start, Duration::from_millis(100));
/// # Ok(())
/// # }
/// ```
///
/// # Panics
///
/// Panics if called outside of a rondo runtime.
#[track_caller]
pub fn sleep(duration: Duration) -> Sleep {
    let deadline = context::with_scheduler(|s| s.clock.now()).checked_add(duration);
    Sleep::new(deadline)
}

/// Waits until `deadline` is reached.
pub fn sleep_until(deadline: Instant) -> Sleep {
    Sleep::new(Some(deadline))
}

#[derive(Default)]
struct SleepSlot {
    waker: RefCell<Option<Waker>>,

    /// Sequence of the live heap entry.
    armed: Cell<Option<u64>>,

    fired: Cell<bool>,
}

impl Expire for SleepSlot {
    fn expire(&self, seq: u64) {
        if self.armed.get() != Some(seq) {
            return;
        }

        self.armed.set(None);
        self.fired.set(true);

        if let Some(waker) = self.waker.borrow_mut().take() {
            waker.wake();
        }
    }
}

/// Future returned by [`sleep`] and [`sleep_until`].
///
/// Dropping it leaves an inert entry in the timer heap.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Sleep {
    /// `None` never fires.
    deadline: Option<Instant>,
    slot: Option<Rc<SleepSlot>>,
}

impl Sleep {
    fn new(deadline: Option<Instant>) -> Sleep {
        Sleep {
            deadline,
            slot: None,
        }
    }

    /// `None` when the deadline overflowed, the sleep then lasts until
    /// cancelled.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_elapsed(&self) -> bool {
        self.slot.as_ref().is_some_and(|slot| slot.fired.get())
    }

    fn register(&mut self, waker: &Waker) {
        let slot = Rc::new(SleepSlot::default());
        *slot.waker.borrow_mut() = Some(waker.clone());

        if let Some(deadline) = self.deadline {
            let target: Weak<SleepSlot> = Rc::downgrade(&slot);
            let seq = context::with_scheduler(|s| s.timers.borrow_mut().insert(deadline, target));
            slot.armed.set(Some(seq));
        }

        self.slot = Some(slot);
    }
}

impl Future for Sleep {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if context::take_cancellation() {
            // Disarm so the timer does not wake a task that moved on.
            this.slot = None;
            return Poll::Ready(Err(Error::Cancelled));
        }

        match &this.slot {
            None => {
                this.register(cx.waker());
                Poll::Pending
            }
            Some(slot) if slot.fired.get() => Poll::Ready(Ok(())),
            Some(slot) => {
                let mut waker = slot.waker.borrow_mut();
                if !waker.as_ref().is_some_and(|w| w.will_wake(cx.waker())) {
                    *waker = Some(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl std::fmt::Debug for Sleep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sleep")
            .field("deadline", &self.deadline)
            .field("elapsed", &self.is_elapsed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as rondo;
    use crate::time;
    use anyhow::Result;
    use rstest::rstest;

    #[rstest]
    #[case::zero(0)]
    #[case::short(10)]
    #[case::long(5_000)]
    #[rondo::test(start_paused = true)]
    async fn test_sleep_elapses_exactly(#[case] millis: u64) -> Result<()> {
        let start = time::now();
        sleep(Duration::from_millis(millis)).await?;
        assert_eq!(time::now() - start, Duration::from_millis(millis));
        Ok(())
    }

    #[rondo::test(start_paused = true)]
    async fn test_past_deadline_still_suspends() -> Result<()> {
        let flag = Rc::new(Cell::new(false));
        let setter = flag.clone();

        let handle = rondo::spawn(async move {
            setter.set(true);
            Ok(())
        });

        // The spawned task only runs once the root suspends.
        sleep_until(time::now() - Duration::from_secs(1)).await?;
        assert!(flag.get());

        handle.await?;
        Ok(())
    }

    #[rondo::test(start_paused = true)]
    async fn test_cancelled_sleep_fails() -> Result<()> {
        let handle = rondo::spawn(async {
            sleep(Duration::from_secs(60)).await?;
            Ok("woke up")
        });

        sleep(Duration::from_secs(1)).await?;
        assert!(handle.cancel());

        let start = time::now();
        assert_eq!(handle.await, Err(Error::Cancelled));
        assert_eq!(time::now(), start);
        Ok(())
    }

    #[rondo::test(start_paused = true)]
    async fn test_concurrent_sleeps_wake_in_deadline_order() -> Result<()> {
        let order = Rc::new(RefCell::new(Vec::new()));

        let handles: Vec<_> = [3u64, 1, 2]
            .into_iter()
            .map(|secs| {
                let order = order.clone();
                rondo::spawn(async move {
                    sleep(Duration::from_secs(secs)).await?;
                    order.borrow_mut().push(secs);
                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            handle.await?;
        }

        assert_eq!(*order.borrow(), vec![1, 2, 3]);
        Ok(())
    }

    #[rondo::test(start_paused = true)]
    async fn test_unrepresentable_duration_sleeps_until_cancelled() -> Result<()> {
        let forever = sleep(Duration::MAX);
        assert_eq!(forever.deadline(), None);

        let handle = rondo::spawn(async {
            sleep(Duration::MAX).await?;
            Ok("woke up")
        });

        sleep(Duration::from_secs(3600)).await?;
        assert!(!handle.is_finished());

        assert!(handle.cancel());
        assert_eq!(handle.await, Err(Error::Cancelled));
        Ok(())
    }
}
