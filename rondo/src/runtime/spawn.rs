//! Provides functions and types for spawning new tasks onto the runtime.
//!
//! Tasks can be spawned using the simple [`spawn()`] function for default
//! behavior, or configured using the [`SpawnBuilder`] for more control.
//! Blocking callables go through [`spawn_blocking()`] instead.
use crate::Result;
use crate::context;
use crate::contextvars::Snapshot;
use crate::executor::BlockingHandle;
use crate::task::JoinHandle;

/// Spawns a new task with default options.
///
/// The task starts at the caller's next suspension point and runs on a copy
/// of the caller's context variables. This is a convenience function for
/// [`spawn_builder()`].
///
/// # Panics
///
/// Panics if no runtime is active on the current thread.
///
/// # Examples
///
/// ```
/// # #[rondo::main]
/// # async fn main() -> rondo::Result<()> {
/// let handle = rondo::spawn(async { Ok("hello") });
/// assert_eq!(handle.await?, "hello");
/// # Ok(())
/// # }
/// ```
#[track_caller]
pub fn spawn<F, T>(future: F) -> JoinHandle<T>
where
    F: Future<Output = Result<T>> + 'static,
    T: 'static,
{
    context::with_scheduler(|s| s.spawn(future, None, None))
}

/// Creates a new [`SpawnBuilder`] for configuring and spawning a task.
///
/// # Example
///
/// ```
/// use rondo::contextvars::{self, ContextVar};
///
/// static REQUEST: ContextVar<u32> = ContextVar::new("request");
///
/// # #[rondo::main]
/// # async fn main() -> rondo::Result<()> {
/// let _token = REQUEST.set(7);
/// let snapshot = contextvars::copy_context();
///
/// let handle = rondo::spawn_builder()
///     .name("worker")
///     .with_context(snapshot)
///     .spawn(async { Ok(REQUEST.get()) });
///
/// assert_eq!(handle.name(), Some("worker"));
/// assert_eq!(handle.await?, Some(7));
/// # Ok(())
/// # }
/// ```
pub fn spawn_builder() -> SpawnBuilder {
    SpawnBuilder::default()
}

/// Drives `future` to completion on the runtime of the current thread.
///
/// # Panics
///
/// Panics if no runtime was built on this thread, or when called from inside
/// the runtime.
#[track_caller]
pub fn block_on<F: Future>(future: F) -> F::Output {
    // Cloned out of the context so that tasks can reach it while we drive them.
    let scheduler = context::with_scheduler(|s| s.clone());
    scheduler.block_on(future)
}

/// Runs a blocking callable on the runtime's default thread pool.
///
/// The run loop keeps going while `f` runs. The pool is created on first use
/// and sized by
/// [`Builder::blocking_threads`](crate::runtime::Builder::blocking_threads).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// # #[rondo::main]
/// # async fn main() -> rondo::Result<()> {
/// let out = rondo::spawn_blocking(|| {
///     std::thread::sleep(Duration::from_millis(10));
///     "done"
/// })
/// .await?;
/// assert_eq!(out, "done");
/// # Ok(())
/// # }
/// ```
#[track_caller]
pub fn spawn_blocking<F, T>(f: F) -> BlockingHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    context::with_scheduler(|s| s.spawn_blocking(f))
}

/// Same as [`spawn_blocking`].
#[track_caller]
pub fn to_thread<F, T>(f: F) -> BlockingHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f)
}

/// A builder for configuring and spawning a new task.
///
/// Created by calling [`spawn_builder()`].
#[derive(Debug, Default)]
pub struct SpawnBuilder {
    name: Option<String>,

    context: Option<Snapshot>,
}

impl SpawnBuilder {
    /// Sets a human readable name, reported by
    /// [`JoinHandle::name`] and in log events.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Starts the task from `snapshot` instead of the caller's context.
    pub fn with_context(mut self, snapshot: Snapshot) -> Self {
        self.context = Some(snapshot);
        self
    }

    /// Spawns the task with the configured options.
    #[track_caller]
    pub fn spawn<F, T>(self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = Result<T>> + 'static,
        T: 'static,
    {
        context::with_scheduler(|s| s.spawn(future, self.name, self.context))
    }
}
