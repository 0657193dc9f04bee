use crate::runtime::Shared;
use crate::task::Id;
use std::sync::Arc;
use std::task::{Wake, Waker};

/// Waker handed to every task. Waking only records the task id in the
/// runtime inbox, the run loop looks the task up and queues it on its next
/// iteration. This is also what executor threads use to hand results back.
#[derive(Debug)]
struct TaskWaker {
    id: Id,
    shared: Arc<Shared>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.shared.notify(self.id);
    }
}

pub(crate) fn task_waker(id: Id, shared: &Arc<Shared>) -> Waker {
    Waker::from(Arc::new(TaskWaker {
        id,
        shared: shared.clone(),
    }))
}
