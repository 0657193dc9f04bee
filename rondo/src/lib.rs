//! A single-threaded cooperative task runtime with structured cancellation.
//!
//! Tasks are futures returning [`Result<T>`]. They interleave on one thread,
//! in FIFO order, and only switch at explicit suspension points: timers,
//! primitives, joins and executor results. Cancellation is cooperative: a
//! cancelled task sees [`Error::Cancelled`] at its next suspension point and
//! decides whether to propagate it.
//!
//! ```
//! use rondo::time::sleep;
//! use std::time::Duration;
//!
//! #[rondo::main(start_paused = true)]
//! async fn main() -> rondo::Result<()> {
//!     let start = rondo::time::now();
//!
//!     let slow = rondo::spawn(async {
//!         sleep(Duration::from_secs(2)).await?;
//!         Ok("slow")
//!     });
//!     sleep(Duration::from_secs(1)).await?;
//!
//!     assert_eq!(slow.await?, "slow");
//!     assert_eq!(rondo::time::now() - start, Duration::from_secs(2));
//!     Ok(())
//! }
//! ```

#[doc(inline)]
pub use rondo_macros::main;

#[doc(inline)]
pub use rondo_macros::test;

mod context;

pub mod contextvars;

mod error;
pub use error::{Error, Result};

pub mod executor;

pub mod query;

pub mod runtime;
pub use runtime::{block_on, spawn, spawn_blocking, spawn_builder, to_thread};

pub mod sync;

pub mod task;

pub mod time;

mod utils;
