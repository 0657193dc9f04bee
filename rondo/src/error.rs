use std::any::Any;
use std::fmt;
use std::io;

/// Outcome failures reported by the runtime, its tasks and its primitives.
///
/// Errors are `Clone` because a task outcome can be replayed to every party
/// awaiting a [`SharedHandle`](crate::task::SharedHandle).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Cooperative cancellation observed at a suspension point.
    #[error("task was cancelled")]
    Cancelled,

    /// The deadline of a timeout elapsed before the wrapped computation
    /// completed.
    #[error("deadline elapsed before completion")]
    TimedOut,

    /// Unhandled failure raised by a task, including panics.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// A worker thread or worker process raised, crashed or returned garbage.
    #[error("executor job failed: {0}")]
    ExecutorFailed(String),

    /// The barrier was aborted or reset while the party was waiting.
    #[error("barrier is broken")]
    BrokenBarrier,

    /// An operation was attempted in a state that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Builds a [`Error::TaskFailed`] from anything printable.
    pub fn failed(msg: impl fmt::Display) -> Self {
        Error::TaskFailed(msg.to_string())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::TimedOut)
    }

    pub(crate) fn executor(msg: impl fmt::Display) -> Self {
        Error::ExecutorFailed(msg.to_string())
    }

    /// Converts a payload caught by `catch_unwind` into a readable message.
    pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
        if let Some(msg) = payload.downcast_ref::<&'static str>() {
            format!("panicked: {msg}")
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            format!("panicked: {msg}")
        } else {
            "panicked with a non-string payload".to_string()
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::TaskFailed(format!("{err:#}"))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::TaskFailed(err.to_string())
    }
}

/// Result type used by tasks and runtime primitives.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Error: Send, Sync, Clone, std::error::Error);

    #[test]
    fn test_anyhow_context_is_kept() {
        let err: Error = anyhow!("disk full").context("writing journal").into();
        assert_eq!(err, Error::TaskFailed("writing journal: disk full".into()));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(Error::panic_message(&*payload), "panicked: boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(Error::panic_message(&*payload), "panicked: kaboom");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(
            Error::panic_message(&*payload),
            "panicked with a non-string payload"
        );
    }
}
