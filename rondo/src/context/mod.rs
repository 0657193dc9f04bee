use crate::contextvars::Snapshot;
use crate::runtime::local;
use crate::task::{Header, Id};
use anyhow::{Result, anyhow};
use std::cell::RefCell;
use std::rc::Rc;
use std::thread_local;

/// Per-thread view of the runtime.
///
/// - `scheduler` is set for the lifetime of a `Runtime`.
/// - `current` is the task being polled right now (the root future included).
/// - `ambient` holds context variables written outside of any task.
struct RootContext {
    scheduler: RefCell<Option<local::Handle>>,

    current: RefCell<Option<Rc<Header>>>,

    ambient: RefCell<Snapshot>,
}

thread_local! {
    static CONTEXT: RootContext = RootContext {
        scheduler: RefCell::new(None),
        current: RefCell::new(None),
        ambient: RefCell::new(Snapshot::default()),
    };
}

pub(crate) fn init_local_context(scheduler: local::Handle) -> Result<()> {
    CONTEXT.with(|ctx| {
        let mut slot = ctx.scheduler.borrow_mut();
        if slot.is_some() {
            return Err(anyhow!("thread-local context already initialized"));
        }

        *slot = Some(scheduler);
        Ok(())
    })
}

pub(crate) fn clear_local_context() {
    // The handle is moved out first so that dropping it cannot re-enter the
    // context while it is borrowed.
    let handle = CONTEXT.with(|ctx| ctx.scheduler.borrow_mut().take());
    drop(handle);
}

pub(crate) fn try_scheduler() -> Option<local::Handle> {
    CONTEXT
        .try_with(|ctx| ctx.scheduler.borrow().clone())
        .ok()
        .flatten()
}

#[track_caller]
pub(crate) fn with_scheduler<F, R>(f: F) -> R
where
    F: FnOnce(&local::Handle) -> R,
{
    let scheduler =
        try_scheduler().expect("must be called from the context of a rondo runtime");
    f(&scheduler)
}

pub(crate) fn current_task() -> Option<Rc<Header>> {
    CONTEXT
        .try_with(|ctx| ctx.current.borrow().clone())
        .ok()
        .flatten()
}

pub(crate) fn current_task_id() -> Option<Id> {
    CONTEXT
        .try_with(|ctx| ctx.current.borrow().as_ref().map(|h| h.id))
        .ok()
        .flatten()
}

/// Consumes a pending cancel request of the current task. Every suspension
/// point calls this before doing anything else.
pub(crate) fn take_cancellation() -> bool {
    CONTEXT
        .try_with(|ctx| {
            ctx.current
                .borrow()
                .as_ref()
                .is_some_and(|header| header.take_cancel())
        })
        .unwrap_or(false)
}

/// Runs `f` against the context variables of the current task, or against
/// the thread's ambient variables outside of a task.
pub(crate) fn with_vars<F, R>(f: F) -> R
where
    F: FnOnce(&mut Snapshot) -> R,
{
    CONTEXT.with(|ctx| match ctx.current.borrow().as_ref() {
        Some(header) => f(&mut header.vars.borrow_mut()),
        None => f(&mut ctx.ambient.borrow_mut()),
    })
}

/// Cheap copy of the active context variables.
pub(crate) fn vars_snapshot() -> Snapshot {
    with_vars(|vars| vars.clone())
}

/// Marks `header` as the running task until the guard is dropped.
#[must_use]
pub(crate) struct TaskGuard {
    prev: Option<Rc<Header>>,
}

pub(crate) fn enter_task(header: Rc<Header>) -> TaskGuard {
    let prev = CONTEXT.with(|ctx| ctx.current.borrow_mut().replace(header));
    TaskGuard { prev }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        let _ = CONTEXT.try_with(|ctx| *ctx.current.borrow_mut() = prev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Builder;
    use crate::task::task_waker;
    use std::sync::Arc;
    use std::thread;

    fn dummy_header() -> Rc<Header> {
        let shared = Arc::new(crate::runtime::Shared::default());
        let id = Id::next();
        Rc::new(Header::new(
            id,
            None,
            Snapshot::default(),
            task_waker(id, &shared),
        ))
    }

    #[test]
    fn test_context_is_thread_local() -> Result<()> {
        let _runtime = Builder::new_local().try_build()?;
        assert!(try_scheduler().is_some());

        let other = thread::spawn(try_scheduler_is_none);
        assert!(other.join().map_err(|_| anyhow!("thread panicked"))?);

        Ok(())
    }

    fn try_scheduler_is_none() -> bool {
        try_scheduler().is_none()
    }

    #[test]
    fn test_task_guard_restores_previous() {
        let outer = dummy_header();
        let inner = dummy_header();

        assert!(current_task_id().is_none());
        {
            let _outer = enter_task(outer.clone());
            assert_eq!(current_task_id(), Some(outer.id));
            {
                let _inner = enter_task(inner.clone());
                assert_eq!(current_task_id(), Some(inner.id));
            }
            assert_eq!(current_task_id(), Some(outer.id));
        }
        assert!(current_task_id().is_none());
    }

    #[test]
    fn test_take_cancellation_consumes_request() {
        let header = dummy_header();
        let _guard = enter_task(header.clone());

        assert!(!take_cancellation());
        assert!(header.request_cancel());
        assert!(take_cancellation());
        assert!(!take_cancellation());
        assert_eq!(header.cancelling(), 1);
    }
}
