use std::fmt;

/// Lifecycle of a task.
///
/// ```text
/// Created -> Scheduled -> Running -> { Suspended <-> Scheduled -> Running }
///                                  -> Success | Failed | Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Registered with the runtime but not yet given a turn.
    Created,

    /// Sitting in the ready queue.
    Scheduled,

    /// Being polled.
    Running,

    /// Waiting on a timer, a primitive, another task or an executor job.
    Suspended,

    /// Completed with a value.
    Success,

    /// Completed with a captured failure.
    Failed,

    /// Completed because a cancellation signal propagated out of it.
    Cancelled,
}

impl State {
    pub fn is_done(&self) -> bool {
        matches!(self, State::Success | State::Failed | State::Cancelled)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Created => "created",
            State::Scheduled => "scheduled",
            State::Running => "running",
            State::Suspended => "suspended",
            State::Success => "done-success",
            State::Failed => "done-failed",
            State::Cancelled => "done-cancelled",
        };
        f.write_str(s)
    }
}
