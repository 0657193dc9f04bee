use crate::task::{Header, Id, State};
use std::fmt;
use std::rc::Rc;

/// An owned permission to cancel a spawned task, without awaiting its
/// completion.
///
/// Unlike a [`JoinHandle`], a `CancelHandle` does *not* represent the
/// permission to await the task's completion, only to request its
/// cancellation. Dropping a `CancelHandle` does *not* cancel the task.
///
/// [`JoinHandle`]: crate::task::JoinHandle
#[derive(Clone)]
pub struct CancelHandle {
    header: Rc<Header>,
}

impl CancelHandle {
    pub(crate) fn new(header: Rc<Header>) -> Self {
        Self { header }
    }

    /// Requests cancellation of the associated task.
    ///
    /// The request is observed at the next suspension point of the task,
    /// which can still intercept it. Returns `false` if the task already
    /// finished.
    pub fn cancel(&self) -> bool {
        self.header.request_cancel()
    }

    /// Checks if the task has finished.
    ///
    /// This can return `false` even if `cancel` has been called, the task
    /// only finishes once it observed the request.
    pub fn is_finished(&self) -> bool {
        self.header.is_done()
    }

    pub fn state(&self) -> State {
        self.header.state()
    }

    pub fn id(&self) -> Id {
        self.header.id
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("CancelHandle")
            .field("id", &self.id())
            .finish()
    }
}
