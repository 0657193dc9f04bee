use crate::context;
use crate::runtime::Shared;
use crate::{Error, Result};
use futures::channel::oneshot;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Completion of a job handed to a [`ThreadPool`](super::ThreadPool) or a
/// [`ProcessPool`](super::ProcessPool).
///
/// Awaiting it suspends the task until the worker is done. Cancelling the
/// awaiting task fails the wait with [`Error::Cancelled`] right away, the
/// worker keeps running the job in the background and its result is dropped.
pub struct BlockingHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> BlockingHandle<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T>>) -> BlockingHandle<T> {
        BlockingHandle { rx }
    }

    /// A handle that completes with `err` without running anything.
    pub(crate) fn failed(err: Error) -> BlockingHandle<T> {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        BlockingHandle { rx }
    }
}

impl<T> Future for BlockingHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if context::take_cancellation() {
            self.rx.close();
            return Poll::Ready(Err(Error::Cancelled));
        }

        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(out)) => Poll::Ready(out),
            Poll::Ready(Err(oneshot::Canceled)) => {
                Poll::Ready(Err(Error::executor("worker dropped the job")))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for BlockingHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingHandle").finish_non_exhaustive()
    }
}

/// Accounts for a job in flight on the runtime that submitted it. The paused
/// clock does not skip ahead while such a guard is alive.
pub(crate) struct JobGuard {
    shared: Option<Arc<Shared>>,
}

impl JobGuard {
    pub(crate) fn new() -> JobGuard {
        let shared = context::try_scheduler().map(|s| s.shared.clone());
        if let Some(shared) = &shared {
            shared.job_started();
        }

        JobGuard { shared }
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.job_finished();
        }
    }
}
