use crate::context;
use crate::task::JoinHandle;
use crate::{Error, Result};
use std::pin::Pin;
use std::task::{Context, Poll};

enum Slot<T> {
    Pending(JoinHandle<T>),
    Done(Result<T>),
    Taken,
}

/// Drives a set of join handles to completion.
struct Slots<T> {
    slots: Vec<Slot<T>>,

    /// The gathering task was cancelled and forwarded it to the children.
    cancelled: bool,
}

impl<T> Slots<T> {
    fn new(handles: impl IntoIterator<Item = JoinHandle<T>>) -> Self {
        Self {
            slots: handles.into_iter().map(Slot::Pending).collect(),
            cancelled: false,
        }
    }

    fn observe_cancellation(&mut self) {
        if !context::take_cancellation() {
            return;
        }

        self.cancelled = true;
        for slot in &self.slots {
            if let Slot::Pending(handle) = slot {
                handle.cancel();
            }
        }
    }

    /// Polls every pending child once. Returns the index of the first failure
    /// observed during this pass, if any, and whether all children settled.
    fn poll_children(&mut self, cx: &mut Context<'_>) -> (Option<usize>, bool) {
        let mut first_failure = None;
        let mut all_done = true;

        for (idx, slot) in self.slots.iter_mut().enumerate() {
            let Slot::Pending(handle) = slot else {
                continue;
            };

            match handle.poll_outcome(cx) {
                Poll::Ready(outcome) => {
                    if outcome.is_err() && first_failure.is_none() {
                        first_failure = Some(idx);
                    }
                    *slot = Slot::Done(outcome);
                }
                Poll::Pending => all_done = false,
            }
        }

        (first_failure, all_done)
    }

    fn take(&mut self, idx: usize) -> Result<T> {
        match std::mem::replace(&mut self.slots[idx], Slot::Taken) {
            Slot::Done(outcome) => outcome,
            _ => Err(Error::InvalidState("gather slot taken before completion")),
        }
    }

    fn take_all(&mut self) -> Vec<Result<T>> {
        (0..self.slots.len()).map(|idx| self.take(idx)).collect()
    }
}

/// Waits for every task and collects each outcome in submission order,
/// failures included.
///
/// If the gathering task is cancelled, every child still running is cancelled
/// too and the gather fails with [`Error::Cancelled`] once they all settled.
///
/// # Examples
///
/// ```
/// use rondo::task::gather;
/// use rondo::Error;
///
/// # #[rondo::main]
/// # async fn main() -> rondo::Result<()> {
/// let handles = vec![
///     rondo::spawn(async { Ok(1) }),
///     rondo::spawn(async { Err(Error::failed("nope")) }),
///     rondo::spawn(async { Ok(3) }),
/// ];
///
/// let outcomes = gather(handles).await?;
/// assert_eq!(outcomes[0], Ok(1));
/// assert!(outcomes[1].is_err());
/// assert_eq!(outcomes[2], Ok(3));
/// # Ok(())
/// # }
/// ```
pub fn gather<T>(handles: impl IntoIterator<Item = JoinHandle<T>>) -> Gather<T> {
    Gather {
        inner: Slots::new(handles),
    }
}

/// Waits for every task and returns their values in submission order.
///
/// Fails as soon as one task fails, with that task's failure. Remaining tasks
/// keep running detached.
pub fn try_gather<T>(handles: impl IntoIterator<Item = JoinHandle<T>>) -> TryGather<T> {
    TryGather {
        inner: Slots::new(handles),
    }
}

/// Future returned by [`gather`].
pub struct Gather<T> {
    inner: Slots<T>,
}

// Outcomes are never pinned.
impl<T> Unpin for Gather<T> {}

impl<T> Future for Gather<T> {
    type Output = Result<Vec<Result<T>>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut self.get_mut().inner;
        this.observe_cancellation();

        let (_, all_done) = this.poll_children(cx);
        if !all_done {
            return Poll::Pending;
        }

        if this.cancelled {
            return Poll::Ready(Err(Error::Cancelled));
        }

        Poll::Ready(Ok(this.take_all()))
    }
}

/// Future returned by [`try_gather`].
pub struct TryGather<T> {
    inner: Slots<T>,
}

impl<T> Unpin for TryGather<T> {}

impl<T> Future for TryGather<T> {
    type Output = Result<Vec<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut self.get_mut().inner;
        this.observe_cancellation();

        let (first_failure, all_done) = this.poll_children(cx);

        if let (false, Some(idx)) = (this.cancelled, first_failure) {
            if let Err(err) = this.take(idx) {
                return Poll::Ready(Err(err));
            }
        }

        if !all_done {
            return Poll::Pending;
        }

        if this.cancelled {
            return Poll::Ready(Err(Error::Cancelled));
        }

        Poll::Ready(this.take_all().into_iter().collect())
    }
}
