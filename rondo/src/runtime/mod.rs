//! The runtime: configuration, the run loop and task spawning.
//!
//! A [`Runtime`] owns one single-threaded scheduler. Build it with
//! [`Builder::new_local`], then drive work with [`Runtime::block_on`]. The
//! loop runs ready tasks in FIFO order, fires expired timers and parks the
//! thread when nothing is ready. Wakers and executor threads reach it through
//! a small mutex-guarded inbox, the only state shared across threads.

// Public API
pub mod runtime;
pub use runtime::{Builder, OnUnobservedFailure, Runtime};

mod spawn;
pub use spawn::{SpawnBuilder, block_on, spawn, spawn_blocking, spawn_builder, to_thread};

// Exports
pub(crate) mod local;

mod registry;
pub(crate) use registry::OwnedTasks;

mod shared;
pub(crate) use shared::{Park, Shared};

mod ticker;
use ticker::{Ticker, TickerData, TickerEvents};
