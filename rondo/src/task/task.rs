use crate::context;
use crate::task::{Header, JoinHandle, State};
use crate::{Error, Result};
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Slot where a finished task parks its outcome until an awaiter claims it.
pub(crate) type Output<T> = Rc<RefCell<Option<Result<T>>>>;

/// Type-erased view of a task, as stored by the scheduler registry.
pub(crate) trait Runnable {
    fn header(&self) -> &Rc<Header>;

    /// Gives the task one turn. Returns the final state if the task completed
    /// during this turn.
    fn run(&self) -> Option<State>;

    /// Drops the computation without polling it again, completing the task as
    /// cancelled.
    fn shutdown(&self);
}

pub(crate) struct TaskCell<T> {
    header: Rc<Header>,

    future: RefCell<Option<Pin<Box<dyn Future<Output = Result<T>>>>>>,

    output: Output<T>,
}

/// Allocates a task around `future`. The caller is responsible for handing
/// the returned `Runnable` to the scheduler.
pub(crate) fn new_task<F, T>(future: F, header: Rc<Header>) -> (Rc<dyn Runnable>, JoinHandle<T>)
where
    F: Future<Output = Result<T>> + 'static,
    T: 'static,
{
    let output: Output<T> = Rc::new(RefCell::new(None));

    let cell = Rc::new(TaskCell {
        header: header.clone(),
        future: RefCell::new(Some(Box::pin(future))),
        output: output.clone(),
    });

    (cell, JoinHandle::new(header, output))
}

impl<T> TaskCell<T> {
    fn complete(&self, out: Result<T>) -> State {
        let state = match &out {
            Ok(_) => State::Success,
            Err(Error::Cancelled) => State::Cancelled,
            Err(err) => {
                self.header.set_failure(err.clone());
                State::Failed
            }
        };

        *self.output.borrow_mut() = Some(out);
        self.header.set_state(state);

        // Release everything the computation held (permits, guards, handles)
        // before anyone observes completion.
        let future = self.future.borrow_mut().take();
        drop(future);

        self.header.wake_joiners();
        state
    }
}

impl<T> Runnable for TaskCell<T> {
    fn header(&self) -> &Rc<Header> {
        &self.header
    }

    fn run(&self) -> Option<State> {
        let header = &self.header;
        header.clear_notified();

        if header.is_done() {
            return None;
        }

        // Cancelled before it ever ran: the body never executes.
        let first_turn = !header.mark_started();
        if first_turn && header.take_cancel() {
            return Some(self.complete(Err(Error::Cancelled)));
        }

        header.set_state(State::Running);

        let polled = {
            let _guard = context::enter_task(header.clone());
            let mut slot = self.future.borrow_mut();
            let fut = slot.as_mut()?;
            let mut cx = Context::from_waker(&header.waker);

            panic::catch_unwind(AssertUnwindSafe(|| fut.as_mut().poll(&mut cx)))
        };

        match polled {
            Ok(Poll::Pending) => {
                header.set_state(State::Suspended);
                None
            }
            Ok(Poll::Ready(out)) => Some(self.complete(out)),
            Err(payload) => {
                let err = Error::TaskFailed(Error::panic_message(&*payload));
                Some(self.complete(Err(err)))
            }
        }
    }

    fn shutdown(&self) {
        if !self.header.is_done() {
            self.complete(Err(Error::Cancelled));
        }
    }
}
