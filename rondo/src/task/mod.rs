//! Task handles, identities and combinators.
//!
//! A task is a `'static` future returning [`Result<T>`](crate::Result), spawned
//! with [`spawn`](crate::spawn) or [`spawn_builder`](crate::spawn_builder). The
//! outcome of the computation decides the final [`State`]:
//!
//! - `Ok(_)` ends in [`State::Success`],
//! - `Err(Error::Cancelled)` ends in [`State::Cancelled`],
//! - any other `Err`, or a panic, ends in [`State::Failed`].
//!
//! Cancellation is cooperative. [`JoinHandle::cancel`] records a request and
//! the task observes it as an `Err(Error::Cancelled)` returned by its next
//! suspension point. The task can propagate it with `?` or swallow it and keep
//! going.
//!
//! [`Error::Cancelled`]: crate::Error::Cancelled
use crate::context;

mod cancel;
pub use self::cancel::CancelHandle;

mod gather;
pub use self::gather::{Gather, TryGather, gather, try_gather};

pub(crate) mod header;
pub(crate) use self::header::Header;

pub mod id;
pub use self::id::{Id, id, try_id};

mod join;
pub use self::join::{JoinHandle, SharedHandle};

mod shield;
pub use self::shield::{Shielded, shield};

mod state;
pub use self::state::State;

pub(crate) mod task;
pub(crate) use self::task::{Runnable, new_task};

mod waker;
pub(crate) use self::waker::task_waker;

/// Number of cancel requests outstanding on the current task.
///
/// Returns 0 outside of the runtime.
pub fn cancelling() -> u32 {
    context::current_task().map_or(0, |header| header.cancelling())
}

/// Withdraws one cancel request from the current task and returns how many
/// remain.
///
/// Call this after swallowing a cancellation when the task wants a later
/// [`timeout`](crate::time::timeout) to tell its own expiry apart from an
/// external cancel. Returns 0 outside of the runtime.
pub fn uncancel() -> u32 {
    context::current_task().map_or(0, |header| header.uncancel())
}
