use crate::context;
use crate::contextvars::Snapshot;
use crate::executor::{BlockingHandle, ThreadPool};
use crate::runtime::local::worker::Worker;
use crate::runtime::runtime::{OnUnobservedFailure, RuntimeConfig};
use crate::runtime::{OwnedTasks, Shared};
use crate::task::{Header, Id, JoinHandle, State, new_task, task_waker};
use crate::time::Clock;
use crate::time::TimerHeap;
use crate::time::timer::Expired;
use crate::utils::ScopeGuard;
use crate::{Error, Result};
use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::pin::pin;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, trace, warn};

pub struct Scheduler {
    pub(crate) cfg: RuntimeConfig,

    pub(crate) clock: Clock,

    pub(crate) timers: RefCell<TimerHeap>,

    /// Cross-thread inbox, the only part reachable from wakers.
    pub(crate) shared: Arc<Shared>,

    pub(crate) tasks: OwnedTasks,

    pub(crate) worker: Worker,

    /// Pool behind `spawn_blocking`, created on first use.
    blocking: OnceCell<ThreadPool>,

    in_block_on: Cell<bool>,
}

impl Scheduler {
    pub(crate) fn new(cfg: RuntimeConfig) -> Self {
        Self {
            clock: Clock::new(cfg.start_paused),
            timers: RefCell::new(TimerHeap::new()),
            shared: Arc::new(Shared::default()),
            tasks: OwnedTasks::new(),
            worker: Worker::new(&cfg),
            blocking: OnceCell::new(),
            in_block_on: Cell::new(false),
            cfg,
        }
    }

    pub(crate) fn into_handle(self) -> Handle {
        Handle(Rc::new(self))
    }

    /// Gives one turn to task `id`, if it is still registered.
    pub(crate) fn run_task(&self, id: Id) {
        let Some(task) = self.tasks.get(id) else {
            return;
        };

        if let Some(state) = task.run() {
            self.finish(task.header(), state);
        }
    }

    fn finish(&self, header: &Rc<Header>, state: State) {
        self.tasks.remove(header.id);

        match header.failure() {
            Some(err) if state == State::Failed => {
                debug!(task.id = %header.id, task.name = ?header.name, %state, error = %err, "task finished");
                self.tasks.record_failure(header.clone());
            }
            _ => debug!(task.id = %header.id, task.name = ?header.name, %state, "task finished"),
        }
    }

    /// Fires every expired timer. Returns how many of them woke something.
    pub(crate) fn fire_timers(&self) -> usize {
        let now = self.clock.now();

        // Released before firing: expiring may arm new timers.
        let expired = self.timers.borrow_mut().pop_expired(now);
        let fired = expired.into_iter().map(Expired::fire).filter(|f| *f).count();

        if fired > 0 {
            trace!(fired, "fired expired timers");
        }

        fired
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("clock", &self.clock)
            .field("tasks", &self.tasks.len())
            .field("timers", &self.timers.borrow().len())
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct Handle(Rc<Scheduler>);

impl Handle {
    #[track_caller]
    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        assert!(
            !self.in_block_on.replace(true),
            "Cannot block_on from within the runtime: the thread is already driving tasks."
        );
        let _reset = ScopeGuard::new(|| self.in_block_on.set(false));

        // The root runs on a copy of the thread's context, its writes stay
        // inside this call.
        let root = Rc::new(Header::new(
            Id::ROOT,
            None,
            context::vars_snapshot(),
            task_waker(Id::ROOT, &self.shared),
        ));

        self.worker.block_on(self, &root, pin!(future))
    }

    pub(crate) fn spawn<F, T>(
        &self,
        future: F,
        name: Option<String>,
        vars: Option<Snapshot>,
    ) -> JoinHandle<T>
    where
        F: Future<Output = Result<T>> + 'static,
        T: 'static,
    {
        let id = Id::next();
        let vars = vars.unwrap_or_else(context::vars_snapshot);
        let header = Rc::new(Header::new(id, name, vars, task_waker(id, &self.shared)));

        let (task, join_handle) = new_task(future, header.clone());

        if self.tasks.insert(task) {
            debug!(task.id = %id, task.name = ?header.name, "spawned task");
            self.worker.schedule(&header);
        }

        join_handle
    }

    pub(crate) fn spawn_blocking<F, T>(&self, f: F) -> BlockingHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let pool = match self.blocking.get() {
            Some(pool) => pool,
            None => {
                let cfg = &self.cfg;
                match ThreadPool::with_config(
                    cfg.blocking_threads,
                    &cfg.thread_name,
                    cfg.thread_stack_size,
                ) {
                    Ok(pool) => self.blocking.get_or_init(|| pool),
                    Err(err) => {
                        return BlockingHandle::failed(Error::executor(format!("{err:#}")));
                    }
                }
            }
        };

        pool.submit(f)
    }

    /// Cancels every live task and drives them to completion. Returns false
    /// if the runtime was already shut down.
    pub(crate) fn shutdown(&self) -> bool {
        if !self.tasks.close() {
            return false;
        }

        let live = self.tasks.live_headers();
        debug!(tasks = live.len(), "shutting down runtime");

        for header in &live {
            header.request_cancel();
        }
        drop(live);

        // Polling again while unwinding would only pile up panics.
        if !self.tasks.is_empty() && !thread::panicking() {
            self.worker.drain(self, self.cfg.shutdown_timeout);
        }

        for task in self.tasks.drain_all() {
            let header = task.header();
            warn!(task.id = %header.id, task.name = ?header.name, state = %header.state(), "dropping task still alive at shutdown");
            task.shutdown();
        }

        if self.cfg.on_unobserved_failure == OnUnobservedFailure::Log {
            for (id, err) in self.tasks.unobserved_failures() {
                error!(task.id = %id, error = %err, "task failure was never retrieved");
            }
        }

        debug!("runtime shut down");
        true
    }
}

impl Deref for Handle {
    type Target = Scheduler;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
