use std::cell::Cell;
use std::time::Instant;

/// Source of time for a runtime.
///
/// The paused clock only moves when the run loop is idle, straight to the next
/// timer deadline. Timing assertions in tests become exact.
#[derive(Debug)]
pub(crate) enum Clock {
    Real,
    Paused(Cell<Instant>),
}

impl Clock {
    pub(crate) fn new(start_paused: bool) -> Clock {
        if start_paused {
            Clock::Paused(Cell::new(Instant::now()))
        } else {
            Clock::Real
        }
    }

    pub(crate) fn now(&self) -> Instant {
        match self {
            Clock::Real => Instant::now(),
            Clock::Paused(now) => now.get(),
        }
    }

    pub(crate) fn is_paused(&self) -> bool {
        matches!(self, Clock::Paused(_))
    }

    /// Moves a paused clock forward to `deadline`. Never goes backwards, no-op
    /// on the real clock.
    pub(crate) fn advance_to(&self, deadline: Instant) {
        if let Clock::Paused(now) = self {
            if deadline > now.get() {
                now.set(deadline);
            }
        }
    }
}
