use crate::context;
use std::sync::atomic::{AtomicU64, Ordering};
use std::{fmt, num::NonZeroU64};

/// An opaque ID that uniquely identifies a task relative to all other tasks
/// created in this process.
///
/// # Notes
///
/// - Task IDs are never re-used.
/// - The ID of the running task can be obtained from inside the task via
///   [`task::id()`](crate::task::id()) and from outside the task via
///   [`JoinHandle::id()`](crate::task::JoinHandle::id()).
/// - The root future driven by `block_on` always reports [`Id::ROOT`].
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Id(pub(crate) NonZeroU64);

const ROOT_ID_VAL: u64 = 1;

impl Id {
    /// Identity of the root future passed to `block_on`.
    pub const ROOT: Id = Id(NonZeroU64::new(ROOT_ID_VAL).unwrap());

    pub(crate) fn next() -> Self {
        // Reserve ID == 1 for the root future.
        static COUNTER: AtomicU64 = AtomicU64::new(ROOT_ID_VAL + 1);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);

        let Some(id) = NonZeroU64::new(id) else {
            Self::exhausted();
        };

        Self(id)
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique task ID: bitspace exhausted")
    }

    pub fn is_root(&self) -> bool {
        *self == Id::ROOT
    }

    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Returns the [`Id`] of the currently running task.
///
/// # Panics
///
/// This function panics if called from outside the runtime. For a version of
/// this function that doesn't panic, see [`try_id()`].
#[track_caller]
pub fn id() -> Id {
    context::current_task_id().expect("Can't get a task id when not inside a task")
}

/// Returns the [`Id`] of the currently running task, or `None` if called
/// outside of a task.
pub fn try_id() -> Option<Id> {
    context::current_task_id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as rondo;
    use crate::runtime::Builder;
    use anyhow::Result;
    use std::collections::HashSet;

    #[test]
    fn test_new_task_id_unique() {
        let n = 13;
        let all_ids: HashSet<Id> = (0..n).map(|_| Id::next()).collect();

        assert_eq!(all_ids.len(), n);
        assert!(!all_ids.contains(&Id::ROOT));
    }

    #[test]
    fn test_id_outside_runtime_is_none() {
        assert!(try_id().is_none());
    }

    #[test]
    fn test_root_and_spawned_ids() -> Result<()> {
        let runtime = Builder::new_local().try_build()?;

        runtime.block_on(async {
            assert_eq!(id(), Id::ROOT);

            let handle = rondo::spawn(async { Ok(id()) });
            let expected = handle.id();

            assert_eq!(handle.await?, expected);
            assert!(!expected.is_root());
            Ok(())
        })
    }
}
