use crate::task::Id;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What the run loop should do once it holds the inbox lock and found it empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Park {
    /// Return immediately, something else made progress possible.
    Skip,

    /// Block until notified, or until the optional timeout elapses.
    Wait(Option<Duration>),
}

/// The only state of a runtime that is reachable from other threads.
///
/// Wakers push task ids into the inbox and signal the condvar. Executor jobs
/// bump `in_flight` so that the paused clock does not skip ahead while a
/// worker is still busy.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    inbox: Mutex<VecDeque<Id>>,

    condvar: Condvar,

    in_flight: AtomicUsize,
}

impl Shared {
    pub(crate) fn notify(&self, id: Id) {
        self.inbox.lock().push_back(id);
        self.condvar.notify_one();
    }

    /// Moves every pending notification into `out`, preserving arrival order.
    pub(crate) fn drain_into(&self, out: &mut VecDeque<Id>) {
        let mut inbox = self.inbox.lock();
        out.extend(inbox.drain(..));
    }

    pub(crate) fn job_started(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn job_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);

        // Take the lock so that a parker which just read `in_flight` is
        // already waiting when we signal.
        let _inbox = self.inbox.lock();
        self.condvar.notify_one();
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Parks the run loop thread until a notification arrives.
    ///
    /// `decide` runs with the inbox lock held and receives the number of
    /// in-flight executor jobs.
    pub(crate) fn park<F>(&self, decide: F)
    where
        F: FnOnce(usize) -> Park,
    {
        let mut inbox = self.inbox.lock();
        if !inbox.is_empty() {
            return;
        }

        match decide(self.in_flight()) {
            Park::Skip => {}
            Park::Wait(Some(timeout)) => {
                self.condvar.wait_for(&mut inbox, timeout);
            }
            Park::Wait(None) => {
                self.condvar.wait(&mut inbox);
            }
        }
    }
}
