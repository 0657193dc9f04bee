use crate::Error;
use crate::task::{Header, Id, Runnable};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

// A collection of all tasks owned by the runtime. Each task is split into:
//
// 1. JoinHandle   :: owned by the awaiter of the task, claim to the result
// 2. Id in queue  :: what the ready queue and the wakers carry around
// 3. Runnable     :: owned by the runtime <--- this is what we store here
//
// The registry keeps the computation alive until it completes, whether or not
// a JoinHandle still exists. Wakers only carry ids, a stale id simply misses
// the lookup.
pub(crate) struct OwnedTasks {
    tasks: RefCell<HashMap<Id, Rc<dyn Runnable>>>,

    /// Headers of tasks that ended in `Failed`. Whether someone retrieved the
    /// outcome is only known at teardown.
    failed: RefCell<Vec<Rc<Header>>>,

    // Close the OwnedTasks when we are shutting down. This is to prevent adding
    // new tasks and guarantee shutdown is only called once.
    closed: Cell<bool>,
}

impl OwnedTasks {
    pub(crate) fn new() -> Self {
        Self {
            tasks: RefCell::new(HashMap::new()),
            failed: RefCell::new(Vec::new()),
            closed: Cell::new(false),
        }
    }

    /// Registers `task`. A closed registry completes it as cancelled instead
    /// and returns false.
    pub(crate) fn insert(&self, task: Rc<dyn Runnable>) -> bool {
        if self.closed.get() {
            task.shutdown();
            return false;
        }

        let id = task.header().id;
        self.tasks.borrow_mut().insert(id, task);
        true
    }

    pub(crate) fn get(&self, id: Id) -> Option<Rc<dyn Runnable>> {
        self.tasks.borrow().get(&id).cloned()
    }

    pub(crate) fn remove(&self, id: Id) -> Option<Rc<dyn Runnable>> {
        self.tasks.borrow_mut().remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Returns false if the registry was already closed.
    pub(crate) fn close(&self) -> bool {
        !self.closed.replace(true)
    }

    /// Headers of every registered task, in id order.
    pub(crate) fn live_headers(&self) -> Vec<Rc<Header>> {
        let mut headers: Vec<_> = self
            .tasks
            .borrow()
            .values()
            .map(|task| task.header().clone())
            .collect();

        headers.sort_by_key(|header| header.id);
        headers
    }

    /// Empties the registry. The caller decides what happens to the tasks.
    pub(crate) fn drain_all(&self) -> Vec<Rc<dyn Runnable>> {
        let mut tasks: Vec<_> = self.tasks.borrow_mut().drain().map(|(_, t)| t).collect();
        tasks.sort_by_key(|task| task.header().id);
        tasks
    }

    pub(crate) fn record_failure(&self, header: Rc<Header>) {
        self.failed.borrow_mut().push(header);
    }

    /// Failures that no awaiter retrieved so far.
    pub(crate) fn unobserved_failures(&self) -> Vec<(Id, Error)> {
        self.failed
            .borrow()
            .iter()
            .filter(|header| !header.is_observed())
            .filter_map(|header| header.failure().map(|err| (header.id, err)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contextvars::Snapshot;
    use crate::runtime::Shared;
    use crate::task::{State, new_task, task_waker};
    use std::sync::Arc;

    fn header(shared: &Arc<Shared>) -> Rc<Header> {
        let id = Id::next();
        Rc::new(Header::new(
            id,
            None,
            Snapshot::default(),
            task_waker(id, shared),
        ))
    }

    #[test]
    fn test_insert_get_remove() {
        let shared = Arc::new(Shared::default());
        let tasks = OwnedTasks::new();

        let h = header(&shared);
        let (task, _join) = new_task(async { Ok(()) }, h.clone());

        assert!(tasks.insert(task));
        assert_eq!(tasks.len(), 1);
        assert!(tasks.get(h.id).is_some());
        assert!(tasks.remove(h.id).is_some());
        assert!(tasks.get(h.id).is_none());
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_closed_registry_cancels_new_tasks() {
        let shared = Arc::new(Shared::default());
        let tasks = OwnedTasks::new();

        assert!(tasks.close());
        assert!(!tasks.close());

        let h = header(&shared);
        let (task, join) = new_task(async { Ok(1) }, h.clone());

        assert!(!tasks.insert(task));
        assert!(tasks.is_empty());
        assert_eq!(join.state(), State::Cancelled);
    }

    #[test]
    fn test_unobserved_failures() {
        let shared = Arc::new(Shared::default());
        let tasks = OwnedTasks::new();

        let seen = header(&shared);
        seen.set_failure(Error::failed("seen"));
        seen.mark_observed();

        let lost = header(&shared);
        lost.set_failure(Error::failed("lost"));

        tasks.record_failure(seen);
        tasks.record_failure(lost.clone());

        assert_eq!(
            tasks.unobserved_failures(),
            vec![(lost.id, Error::failed("lost"))]
        );
    }
}
