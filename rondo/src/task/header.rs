use crate::Error;
use crate::contextvars::Snapshot;
use crate::task::{Id, State};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::task::Waker;

/// Type-erased part of a task, shared between the scheduler, the join handles
/// and the thread-local context while the task is being polled.
///
/// Everything here lives on the runtime thread, so plain `Cell`s are enough.
/// The only cross-thread piece is the `waker`, which routes notifications back
/// into the run loop.
pub(crate) struct Header {
    pub(crate) id: Id,

    pub(crate) name: Option<String>,

    state: Cell<State>,

    /// Set once the task got its first turn.
    started: Cell<bool>,

    /// A cancel request that has not been observed by a suspension point yet.
    cancel_pending: Cell<bool>,

    /// Number of outstanding cancel requests, decremented by `uncancel`.
    cancelling: Cell<u32>,

    /// Already sitting in the ready queue.
    notified: Cell<bool>,

    /// Someone retrieved the outcome of the task.
    observed: Cell<bool>,

    /// Copy of the failure kept around for teardown reporting.
    failure: RefCell<Option<Error>>,

    /// Parties waiting on completion.
    join_wakers: RefCell<Vec<Waker>>,

    /// Context variables, branched from the spawner.
    pub(crate) vars: RefCell<Snapshot>,

    pub(crate) waker: Waker,
}

impl Header {
    pub(crate) fn new(id: Id, name: Option<String>, vars: Snapshot, waker: Waker) -> Header {
        Header {
            id,
            name,
            state: Cell::new(State::Created),
            started: Cell::new(false),
            cancel_pending: Cell::new(false),
            cancelling: Cell::new(0),
            notified: Cell::new(false),
            observed: Cell::new(false),
            failure: RefCell::new(None),
            join_wakers: RefCell::new(Vec::new()),
            vars: RefCell::new(vars),
            waker,
        }
    }

    pub(crate) fn state(&self) -> State {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: State) {
        self.state.set(state);
    }

    pub(crate) fn is_done(&self) -> bool {
        self.state().is_done()
    }

    pub(crate) fn mark_started(&self) -> bool {
        self.started.replace(true)
    }

    /// Claims a slot in the ready queue. Returns false if the task is already
    /// queued or finished.
    pub(crate) fn try_notify(&self) -> bool {
        if self.is_done() || self.notified.get() {
            return false;
        }

        self.notified.set(true);
        self.set_state(State::Scheduled);
        true
    }

    pub(crate) fn clear_notified(&self) {
        self.notified.set(false);
    }

    /// Records a cancel request and wakes the task so that its current
    /// suspension point can observe it. No-op on finished tasks.
    pub(crate) fn request_cancel(&self) -> bool {
        if self.is_done() {
            return false;
        }

        self.cancelling.set(self.cancelling.get() + 1);
        self.cancel_pending.set(true);

        if self.state() != State::Running {
            self.waker.wake_by_ref();
        }

        true
    }

    /// Consumes a pending cancel request.
    pub(crate) fn take_cancel(&self) -> bool {
        self.cancel_pending.replace(false)
    }

    pub(crate) fn cancelling(&self) -> u32 {
        self.cancelling.get()
    }

    /// Withdraws one cancel request. Once no request is outstanding, an
    /// unobserved pending signal is dropped as well.
    pub(crate) fn uncancel(&self) -> u32 {
        let remaining = self.cancelling.get().saturating_sub(1);
        self.cancelling.set(remaining);

        if remaining == 0 {
            self.cancel_pending.set(false);
        }

        remaining
    }

    pub(crate) fn add_join_waker(&self, waker: &Waker) {
        let mut wakers = self.join_wakers.borrow_mut();
        if !wakers.iter().any(|w| w.will_wake(waker)) {
            wakers.push(waker.clone());
        }
    }

    pub(crate) fn wake_joiners(&self) {
        let wakers = std::mem::take(&mut *self.join_wakers.borrow_mut());
        wakers.into_iter().for_each(Waker::wake);
    }

    pub(crate) fn set_failure(&self, err: Error) {
        *self.failure.borrow_mut() = Some(err);
    }

    pub(crate) fn failure(&self) -> Option<Error> {
        self.failure.borrow().clone()
    }

    pub(crate) fn mark_observed(&self) {
        self.observed.set(true);
    }

    pub(crate) fn is_observed(&self) -> bool {
        self.observed.get()
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("cancelling", &self.cancelling())
            .finish_non_exhaustive()
    }
}
