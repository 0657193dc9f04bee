use crate::context;
use crate::task::SharedHandle;
use crate::{Error, Result};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Protects a task from cancellation coming through this view.
///
/// Cancelling the returned [`Shielded`] view, or cancelling a task that is
/// awaiting it, only fails that wait with [`Error::Cancelled`]. The underlying
/// task never receives a cancellation signal and runs to its own completion.
///
/// # Examples
///
/// ```
/// use rondo::task::shield;
/// use rondo::time::sleep;
/// use rondo::Error;
/// use std::time::Duration;
///
/// # #[rondo::main(start_paused = true)]
/// # async fn main() -> rondo::Result<()> {
/// let real = rondo::spawn(async {
///     sleep(Duration::from_secs(2)).await?;
///     Ok("done")
/// })
/// .into_shared();
///
/// let shielded = shield(real.clone());
/// assert!(shielded.cancel());
///
/// assert_eq!(shielded.await, Err(Error::Cancelled));
/// assert_eq!(real.await?, "done");
/// # Ok(())
/// # }
/// ```
pub fn shield<T, H>(handle: H) -> Shielded<T>
where
    T: Clone,
    H: Into<SharedHandle<T>>,
{
    Shielded {
        inner: handle.into(),
        view: Rc::new(View::default()),
    }
}

#[derive(Default)]
struct View {
    cancelled: Cell<bool>,
    wakers: RefCell<Vec<Waker>>,
}

impl View {
    fn cancel(&self) {
        self.cancelled.set(true);
        let wakers = std::mem::take(&mut *self.wakers.borrow_mut());
        wakers.into_iter().for_each(Waker::wake);
    }

    fn register(&self, waker: &Waker) {
        let mut wakers = self.wakers.borrow_mut();
        if !wakers.iter().any(|w| w.will_wake(waker)) {
            wakers.push(waker.clone());
        }
    }
}

/// A cancellable view over a task that does not forward cancellation.
///
/// Clones share the same view: cancelling one clone fails every pending wait
/// on all of them.
pub struct Shielded<T> {
    inner: SharedHandle<T>,
    view: Rc<View>,
}

impl<T: Clone> Shielded<T> {
    /// Cancels the view. Returns `false` if the view was already cancelled or
    /// the underlying task already finished.
    pub fn cancel(&self) -> bool {
        if self.view.cancelled.get() || self.inner.is_finished() {
            return false;
        }

        self.view.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.view.cancelled.get()
    }

    /// The task behind the view.
    pub fn inner(&self) -> &SharedHandle<T> {
        &self.inner
    }
}

impl<T: Clone> Future for Shielded<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if context::take_cancellation() {
            self.view.cancel();
        }

        if self.view.cancelled.get() {
            return Poll::Ready(Err(Error::Cancelled));
        }

        match self.inner.poll_outcome(cx) {
            Poll::Ready(outcome) => Poll::Ready(outcome),
            Poll::Pending => {
                self.view.register(cx.waker());
                Poll::Pending
            }
        }
    }
}

impl<T> Clone for Shielded<T> {
    fn clone(&self) -> Self {
        Shielded {
            inner: self.inner.clone(),
            view: self.view.clone(),
        }
    }
}

impl<T> fmt::Debug for Shielded<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Shielded")
            .field("inner", &self.inner)
            .field("cancelled", &self.view.cancelled.get())
            .finish()
    }
}
