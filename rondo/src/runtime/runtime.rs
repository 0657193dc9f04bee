use crate::context;
use crate::runtime::local;
use crate::task::{Id, JoinHandle};
use crate::{Error, Result};
use anyhow::anyhow;
use std::cell::Cell;
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Ticks between two forced timer checks while the ready queue stays busy.
#[cfg(not(test))]
const TIMER_INTERVAL: u32 = 61;

#[cfg(test)]
const TIMER_INTERVAL: u32 = 8; // make tests tick faster

/// Grace period given to cancelled tasks when the runtime shuts down.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound of the default blocking pool.
const MAX_BLOCKING_THREADS: usize = 32;

#[derive(Clone)]
pub(crate) struct ThreadNameFn(pub(crate) Arc<dyn Fn() -> String + Send + Sync + 'static>);

impl ThreadNameFn {
    /// Yields `{prefix}-{n}` with monotonically increasing n.
    pub(crate) fn numbered(prefix: &'static str) -> ThreadNameFn {
        let count = Arc::new(AtomicUsize::new(0));

        ThreadNameFn(Arc::new(move || {
            let id = count.fetch_add(1, Ordering::Relaxed);
            format!("{prefix}-{id}")
        }))
    }
}

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

/// What to do at shutdown with failed tasks whose outcome nobody retrieved.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnUnobservedFailure {
    /// Report each of them with an `error` event.
    #[default]
    Log,

    /// Stay silent. They are still listed by [`Runtime::unobserved_failures`].
    Ignore,
}

#[derive(Debug)]
pub struct Builder {
    /// Name fn used for threads of the default blocking pool.
    thread_name: ThreadNameFn,

    /// Stack size used for threads of the default blocking pool.
    thread_stack_size: Option<usize>,

    /// Size of the default blocking pool. Defaults to `min(32, cpus + 4)`.
    blocking_threads: Option<usize>,

    /// Fire expired timers every N ticks, even if tasks are ready.
    timer_interval: u32,

    start_paused: bool,

    shutdown_timeout: Duration,

    on_unobserved_failure: OnUnobservedFailure,
}

impl Builder {
    /// Builder for a runtime driving every task on the calling thread.
    pub fn new_local() -> Builder {
        Builder {
            thread_name: ThreadNameFn::numbered("rondo-blocking"),
            thread_stack_size: None,
            blocking_threads: None,
            timer_interval: TIMER_INTERVAL,
            start_paused: false,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
            on_unobserved_failure: OnUnobservedFailure::default(),
        }
    }

    /// Sets name of threads spawned by the default blocking pool.
    ///
    /// The default name is "rondo-blocking-{id}", where id is monotonically
    /// increasing.
    pub fn thread_name(mut self, val: impl Into<String>) -> Self {
        let val = val.into();
        self.thread_name = ThreadNameFn(Arc::new(move || val.clone()));
        self
    }

    /// Like [`Builder::thread_name`], with a fresh name per thread.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = ThreadNameFn(Arc::new(f));
        self
    }

    /// Sets the stack size (in bytes) for blocking pool threads.
    ///
    /// Platforms with a larger minimum stack round it up.
    #[track_caller]
    pub fn thread_stack_size(mut self, val: usize) -> Self {
        assert!(
            val.is_power_of_two(),
            "thread_stack_size must be a power of two"
        );
        self.thread_stack_size = Some(val);
        self
    }

    /// Number of threads of the pool behind [`spawn_blocking`]. The pool is
    /// created on first use.
    ///
    /// [`spawn_blocking`]: crate::spawn_blocking
    #[track_caller]
    pub fn blocking_threads(mut self, val: usize) -> Self {
        assert!(val > 0, "blocking_threads must be greater than 0");
        self.blocking_threads = Some(val);
        self
    }

    /// Sets the number of scheduler ticks after which expired timers are fired
    /// even though tasks are still ready to run.
    ///
    /// A scheduler "tick" corresponds to one task turn. Timers are always
    /// checked when the ready queue runs empty.
    #[track_caller]
    pub fn timer_interval(mut self, val: u32) -> Self {
        assert!(val > 0, "timer_interval must be greater than 0");
        self.timer_interval = val;
        self
    }

    /// Starts the runtime with a paused clock.
    ///
    /// Time only moves when the loop has nothing to run and no blocking job is
    /// in flight. It then jumps straight to the next timer deadline, so sleeps
    /// complete instantly and elapsed times are exact.
    pub fn start_paused(mut self, val: bool) -> Self {
        self.start_paused = val;
        self
    }

    /// How long cancelled tasks may keep running at shutdown before they are
    /// dropped. Measured on the wall clock.
    pub fn shutdown_timeout(mut self, val: Duration) -> Self {
        self.shutdown_timeout = val;
        self
    }

    pub fn on_unobserved_failure(mut self, val: OnUnobservedFailure) -> Self {
        self.on_unobserved_failure = val;
        self
    }

    /// Creates the configured `Runtime`.
    ///
    /// The returned `Runtime` instance is ready to spawn tasks. Fails if a
    /// runtime is already active on this thread.
    pub fn try_build(self) -> anyhow::Result<Runtime> {
        IS_RUNTIME_ACTIVE.with(|is_active| -> anyhow::Result<()> {
            if is_active.get() {
                Err(anyhow!(
                    "Cannot create a new Runtime: a runtime is already active on this thread."
                ))
            } else {
                Ok(())
            }
        })?;

        let cfg = RuntimeConfig::try_from(self)?;
        let scheduler = local::Scheduler::new(cfg).into_handle();

        context::init_local_context(scheduler.clone())?;
        IS_RUNTIME_ACTIVE.with(|is_active| is_active.set(true));

        Ok(Runtime { scheduler })
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new_local()
    }
}

// At most one runtime per thread.
thread_local! {
    static IS_RUNTIME_ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// A single-threaded runtime.
///
/// Spawning does not start anything by itself: tasks make progress while the
/// thread is inside [`block_on`](Runtime::block_on). Tasks still pending when
/// `block_on` returns are resumed by the next call.
///
/// Dropping the runtime shuts it down, see [`Runtime::shutdown`].
#[derive(Debug)]
pub struct Runtime {
    scheduler: local::Handle,
}

impl Runtime {
    /// Runs `future` to completion, driving every spawned task meanwhile.
    ///
    /// # Panics
    ///
    /// Panics when called from inside the runtime.
    #[track_caller]
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.scheduler.block_on(future)
    }

    /// Spawns `future` as a new task, see [`crate::spawn`].
    pub fn spawn<F, T>(&self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = Result<T>> + 'static,
        T: 'static,
    {
        self.scheduler.spawn(future, None, None)
    }

    /// Failed tasks whose outcome was never retrieved by an awaiter, so far.
    pub fn unobserved_failures(&self) -> Vec<(Id, Error)> {
        self.scheduler.tasks.unobserved_failures()
    }

    /// Shuts the runtime down.
    ///
    /// 1. Every live task is cancelled.
    /// 2. The loop keeps running until they all finish, or until the
    ///    `shutdown_timeout` elapses.
    /// 3. Tasks still alive are dropped without being polled again.
    /// 4. Unobserved failures are reported.
    pub fn shutdown(self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&self) {
        if !self.scheduler.shutdown() {
            return;
        }

        context::clear_local_context();
        IS_RUNTIME_ACTIVE.with(|is_active| is_active.set(false));
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

// Test-only helpers
#[cfg(test)]
impl Runtime {
    pub(crate) fn scheduler(&self) -> local::Handle {
        self.scheduler.clone()
    }
}

// Export runtime builder as a RuntimeConfig object to be consumed by the
// scheduler.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) thread_name: ThreadNameFn,
    pub(crate) thread_stack_size: Option<usize>,
    pub(crate) blocking_threads: usize,
    pub(crate) timer_interval: u32,
    pub(crate) start_paused: bool,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) on_unobserved_failure: OnUnobservedFailure,
}

impl TryFrom<Builder> for RuntimeConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> std::result::Result<Self, Self::Error> {
        let blocking_threads = match builder.blocking_threads {
            Some(n) => n,
            None => default_blocking_threads()?,
        };

        Ok(RuntimeConfig {
            thread_name: builder.thread_name,
            thread_stack_size: builder.thread_stack_size,
            blocking_threads,
            timer_interval: builder.timer_interval,
            start_paused: builder.start_paused,
            shutdown_timeout: builder.shutdown_timeout,
            on_unobserved_failure: builder.on_unobserved_failure,
        })
    }
}

fn default_blocking_threads() -> anyhow::Result<usize> {
    let cpus = thread::available_parallelism()?.get();
    Ok(MAX_BLOCKING_THREADS.min(cpus + 4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    // The config is built on the caller thread, pool threads get a clone of
    // the name fn.
    assert_impl_all!(RuntimeConfig: Send, Sync, Clone);
    assert_impl_all!(ThreadNameFn: Send, Sync);
    assert_not_impl_any!(Runtime: Send, Sync);

    #[test]
    fn test_defaults() -> anyhow::Result<()> {
        let cfg = RuntimeConfig::try_from(Builder::new_local())?;

        assert!(cfg.blocking_threads >= 5);
        assert!(cfg.blocking_threads <= MAX_BLOCKING_THREADS);
        assert_eq!(cfg.timer_interval, 8);
        assert!(!cfg.start_paused);
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(cfg.on_unobserved_failure, OnUnobservedFailure::Log);
        Ok(())
    }

    #[test]
    fn test_numbered_thread_names() {
        let names = ThreadNameFn::numbered("worker");
        assert_eq!((names.0)(), "worker-0");
        assert_eq!((names.0)(), "worker-1");

        let fixed = Builder::new_local().thread_name("fixed").thread_name;
        assert_eq!((fixed.0)(), "fixed");
        assert_eq!((fixed.0)(), "fixed");
    }

    #[test]
    #[should_panic(expected = "blocking_threads must be greater than 0")]
    fn test_zero_blocking_threads_rejected() {
        let _ = Builder::new_local().blocking_threads(0);
    }

    #[test]
    fn test_one_runtime_per_thread() -> anyhow::Result<()> {
        let runtime = Builder::new_local().try_build()?;
        assert!(Builder::new_local().try_build().is_err());

        runtime.shutdown();
        let _again = Builder::new_local().try_build()?;
        Ok(())
    }
}
