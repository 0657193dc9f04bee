//! Offloading blocking work to OS threads and child processes.
//!
//! Jobs run outside of the run loop. Their outcome comes back as a
//! [`BlockingHandle`], awaited like any other suspension point.
mod handle;
pub use handle::BlockingHandle;

mod process_pool;
pub use process_pool::ProcessPool;

mod thread_pool;
pub use thread_pool::ThreadPool;
