//! Synchronization primitives for tasks of the same runtime.
//!
//! None of these are thread-safe: they coordinate tasks interleaving on the
//! run loop thread. Every wait is a suspension point, served in arrival order,
//! and fails with [`Error::Cancelled`](crate::Error::Cancelled) if the waiting
//! task is cancelled. A cancelled or dropped wait leaves the queue, and a
//! grant it already received moves on to the next waiter.

mod barrier;
pub use barrier::{Barrier, BarrierWait, BarrierWaitResult};

mod event;
pub use event::{Event, EventWait};

mod lock;
pub use lock::{Lock, LockGuard};

mod semaphore;
pub use semaphore::{Acquire, Permit, Semaphore};

pub(crate) mod waitlist;
