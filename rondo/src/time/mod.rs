//! Timers: sleeping, yielding and timeouts.
//!
//! Every future in this module is a suspension point, and fails with
//! [`Error::Cancelled`](crate::Error::Cancelled) when the waiting task is
//! cancelled.
//!
//! Time is read from the runtime clock. With
//! [`Builder::start_paused`](crate::runtime::Builder::start_paused) the clock
//! only advances when every task is waiting, straight to the next deadline.
use crate::context;

pub use std::time::{Duration, Instant};

pub(crate) mod clock;
pub(crate) use clock::Clock;

mod sleep;
pub use sleep::{Sleep, sleep, sleep_until};

mod timeout;
pub use timeout::{Timeout, TimeoutScope, timeout, timeout_at, wait_for};

pub(crate) mod timer;
pub(crate) use timer::TimerHeap;

mod yield_now;
pub use yield_now::{YieldNow, yield_now};

/// Current time as seen by the runtime clock, or the system monotonic clock
/// outside of a runtime.
pub fn now() -> Instant {
    context::try_scheduler().map_or_else(Instant::now, |s| s.clock.now())
}
