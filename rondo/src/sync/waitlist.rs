use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::task::Waker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitState {
    Waiting,

    /// Released by the primitive, with a primitive-specific value.
    Notified(usize),

    /// The primitive was torn down while waiting.
    Broken,
}

/// A party suspended on a primitive.
#[derive(Debug)]
pub(crate) struct Waiter {
    state: Cell<WaitState>,
    waker: RefCell<Waker>,
}

impl Waiter {
    pub(crate) fn state(&self) -> WaitState {
        self.state.get()
    }

    pub(crate) fn register(&self, waker: &Waker) {
        let mut current = self.waker.borrow_mut();
        if !current.will_wake(waker) {
            *current = waker.clone();
        }
    }

    fn release(&self, state: WaitState) {
        self.state.set(state);
        self.waker.borrow().wake_by_ref();
    }
}

/// FIFO queue of waiters. Releasing a waiter removes it from the queue and
/// hands it its outcome directly, so a woken party never competes with late
/// arrivals.
#[derive(Debug, Default)]
pub(crate) struct Waitlist {
    queue: RefCell<VecDeque<Rc<Waiter>>>,
}

impl Waitlist {
    pub(crate) fn push(&self, waker: &Waker) -> Rc<Waiter> {
        let waiter = Rc::new(Waiter {
            state: Cell::new(WaitState::Waiting),
            waker: RefCell::new(waker.clone()),
        });

        self.queue.borrow_mut().push_back(waiter.clone());
        waiter
    }

    /// Withdraws a waiter that was not released yet.
    pub(crate) fn remove(&self, waiter: &Rc<Waiter>) -> bool {
        let mut queue = self.queue.borrow_mut();
        match queue.iter().position(|w| Rc::ptr_eq(w, waiter)) {
            Some(idx) => {
                queue.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Releases the longest waiting party.
    pub(crate) fn notify_one(&self, value: usize) -> bool {
        let waiter = self.queue.borrow_mut().pop_front();
        match waiter {
            Some(waiter) => {
                waiter.release(WaitState::Notified(value));
                true
            }
            None => false,
        }
    }

    /// Releases every party, each with its position in the queue.
    pub(crate) fn notify_all(&self) -> usize {
        let waiters = std::mem::take(&mut *self.queue.borrow_mut());
        let count = waiters.len();

        for (idx, waiter) in waiters.into_iter().enumerate() {
            waiter.release(WaitState::Notified(idx));
        }

        count
    }

    pub(crate) fn break_all(&self) -> usize {
        let waiters = std::mem::take(&mut *self.queue.borrow_mut());
        let count = waiters.len();

        for waiter in waiters {
            waiter.release(WaitState::Broken);
        }

        count
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}
