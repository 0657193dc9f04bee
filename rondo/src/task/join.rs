use crate::context;
use crate::task::task::Output;
use crate::task::{CancelHandle, Header, Id, State};
use crate::{Error, Result};
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// An owned permission to join on a task (await its termination).
///
/// This can be thought of as the equivalent of [`std::thread::JoinHandle`]
/// for a rondo task rather than a thread. The task associated with this
/// `JoinHandle` is scheduled as soon as it is spawned, and starts running at
/// the next suspension point of the spawner, even if the handle is never
/// awaited.
///
/// A `JoinHandle` *detaches* the associated task when it is dropped. The task
/// keeps running and its outcome is lost. A detached task that fails is
/// reported when the runtime shuts down.
///
/// # Awaiting
///
/// Awaiting the handle yields the outcome of the task:
///
/// - `Ok(value)` if the task completed successfully,
/// - `Err(Error::Cancelled)` if the task ended cancelled,
/// - any other `Err` if the task failed or panicked.
///
/// If the awaiting task is itself cancelled while waiting, the cancel request
/// is forwarded to the joined task and the awaiter keeps waiting for its
/// outcome. Use [`shield`] to stop that propagation.
///
/// Only one party can await a `JoinHandle`. Convert it with
/// [`JoinHandle::into_shared`] when several parties need the outcome.
///
/// # Examples
///
/// ```
/// use rondo::task::JoinHandle;
///
/// # #[rondo::main]
/// # async fn main() -> rondo::Result<()> {
/// let join_handle: JoinHandle<i32> = rondo::spawn(async { Ok(5 + 3) });
///
/// assert_eq!(join_handle.await?, 8);
/// # Ok(())
/// # }
/// ```
///
/// A panic inside the task is captured and surfaces as a failure:
///
/// ```
/// use rondo::Error;
///
/// # #[rondo::main]
/// # async fn main() {
/// let handle = rondo::spawn(async {
///     if true {
///         panic!("boom");
///     }
///     Ok(())
/// });
///
/// let err = handle.await.unwrap_err();
/// assert!(matches!(err, Error::TaskFailed(_)));
/// # }
/// ```
///
/// [`shield`]: crate::task::shield
pub struct JoinHandle<T> {
    header: Rc<Header>,
    output: Output<T>,
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(header: Rc<Header>, output: Output<T>) -> JoinHandle<T> {
        JoinHandle { header, output }
    }

    /// Requests cancellation of the associated task.
    ///
    /// The task observes the request at its next suspension point. Returns
    /// `false` if the task already finished, in which case this is a no-op.
    ///
    /// ```
    /// use rondo::time::sleep;
    /// use rondo::Error;
    /// use std::time::Duration;
    ///
    /// # #[rondo::main(start_paused = true)]
    /// # async fn main() {
    /// let handle = rondo::spawn(async {
    ///     sleep(Duration::from_secs(10)).await?;
    ///     Ok(())
    /// });
    ///
    /// assert!(handle.cancel());
    /// assert_eq!(handle.await, Err(Error::Cancelled));
    /// # }
    /// ```
    pub fn cancel(&self) -> bool {
        self.header.request_cancel()
    }

    /// Checks if the task associated with this `JoinHandle` has finished.
    pub fn is_finished(&self) -> bool {
        self.header.is_done()
    }

    pub fn state(&self) -> State {
        self.header.state()
    }

    pub fn id(&self) -> Id {
        self.header.id
    }

    pub fn name(&self) -> Option<&str> {
        self.header.name.as_deref()
    }

    /// Returns a new `CancelHandle` that can be used to remotely cancel this
    /// task.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(self.header.clone())
    }

    /// Turns this handle into one that can be cloned and awaited by any number
    /// of parties. Each of them observes the same outcome.
    pub fn into_shared(self) -> SharedHandle<T>
    where
        T: Clone,
    {
        SharedHandle {
            header: self.header,
            output: self.output,
        }
    }

    /// Waits for completion without observing cancellation of the awaiter.
    pub(crate) fn poll_outcome(&mut self, cx: &mut Context<'_>) -> Poll<Result<T>> {
        if !self.header.is_done() {
            self.header.add_join_waker(cx.waker());
            return Poll::Pending;
        }

        self.header.mark_observed();
        match self.output.borrow_mut().take() {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Ready(Err(Error::InvalidState(
                "JoinHandle polled after completion",
            ))),
        }
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        // A task already done cannot take the request over, the awaiter
        // observes it itself. The outcome stays with the task.
        if context::take_cancellation() && !this.header.request_cancel() {
            return Poll::Ready(Err(Error::Cancelled));
        }

        this.poll_outcome(cx)
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("JoinHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

/// A cloneable join handle. Every clone can be awaited and observes the same
/// outcome, the task result is retrieved idempotently.
///
/// Created by [`JoinHandle::into_shared`].
pub struct SharedHandle<T> {
    header: Rc<Header>,
    output: Output<T>,
}

impl<T: Clone> SharedHandle<T> {
    pub fn cancel(&self) -> bool {
        self.header.request_cancel()
    }

    pub fn is_finished(&self) -> bool {
        self.header.is_done()
    }

    pub fn state(&self) -> State {
        self.header.state()
    }

    pub fn id(&self) -> Id {
        self.header.id
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(self.header.clone())
    }

    pub(crate) fn poll_outcome(&self, cx: &mut Context<'_>) -> Poll<Result<T>> {
        if !self.header.is_done() {
            self.header.add_join_waker(cx.waker());
            return Poll::Pending;
        }

        self.header.mark_observed();
        match self.output.borrow().as_ref() {
            Some(outcome) => Poll::Ready(outcome.clone()),
            None => Poll::Ready(Err(Error::InvalidState("task finished without an outcome"))),
        }
    }
}

impl<T: Clone> Future for SharedHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if context::take_cancellation() && !self.header.request_cancel() {
            return Poll::Ready(Err(Error::Cancelled));
        }

        self.poll_outcome(cx)
    }
}

impl<T> Clone for SharedHandle<T> {
    fn clone(&self) -> Self {
        SharedHandle {
            header: self.header.clone(),
            output: self.output.clone(),
        }
    }
}

impl<T: Clone> From<JoinHandle<T>> for SharedHandle<T> {
    fn from(handle: JoinHandle<T>) -> Self {
        handle.into_shared()
    }
}

impl<T> fmt::Debug for SharedHandle<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("SharedHandle")
            .field("id", &self.header.id)
            .field("state", &self.header.state())
            .finish()
    }
}
