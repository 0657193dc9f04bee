//! Context variables: ambient values inherited by spawned tasks.
//!
//! Every task owns a [`Snapshot`] of all context variables. Spawning a task
//! branches the spawner's snapshot, which is a reference-count bump. Writes
//! go to the writer's own copy (copy-on-write), so they are never visible to
//! the parent or to siblings branched from the same parent.
//!
//! ```
//! use rondo::contextvars::ContextVar;
//!
//! static REQUEST_ID: ContextVar<u64> = ContextVar::with_default("request_id", 0);
//!
//! # #[rondo::main]
//! # async fn main() -> rondo::Result<()> {
//! REQUEST_ID.set(7);
//!
//! let child = rondo::spawn(async {
//!     let inherited = REQUEST_ID.get();
//!     REQUEST_ID.set(8);
//!     Ok(inherited)
//! });
//!
//! assert_eq!(child.await?, Some(7));
//! assert_eq!(REQUEST_ID.get(), Some(7));
//! # Ok(())
//! # }
//! ```
use crate::context;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

type Value = Rc<dyn Any>;

/// An immutable mapping of context variables to values.
///
/// Cloning is cheap, mutation copies the mapping only if it is shared.
#[derive(Clone, Default)]
pub struct Snapshot {
    values: Rc<HashMap<u64, Value>>,
}

impl Snapshot {
    /// Reads `var` as seen from this snapshot, falling back to its default.
    pub fn get<T: Clone + 'static>(&self, var: &ContextVar<T>) -> Option<T> {
        self.lookup(var.id())
            .and_then(|value| value.downcast_ref::<T>().cloned())
            .or_else(|| var.default.clone())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Runs `f` with this snapshot as the active context of the caller, and
    /// returns the snapshot as left by `f` along with its result.
    ///
    /// The caller's own context is restored afterwards.
    pub fn run<F, R>(self, f: F) -> (R, Snapshot)
    where
        F: FnOnce() -> R,
    {
        let saved = context::with_vars(|vars| std::mem::replace(vars, self));
        let out = f();
        let after = context::with_vars(|vars| std::mem::replace(vars, saved));
        (out, after)
    }

    fn lookup(&self, id: u64) -> Option<&Value> {
        self.values.get(&id)
    }

    fn insert(&mut self, id: u64, value: Option<Value>) -> Option<Value> {
        let values = Rc::make_mut(&mut self.values);
        match value {
            Some(value) => values.insert(id, value),
            None => values.remove(&id),
        }
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("len", &self.values.len())
            .finish()
    }
}

/// Captures the context variables of the caller.
pub fn copy_context() -> Snapshot {
    context::vars_snapshot()
}

/// A variable whose value depends on the task reading it.
///
/// Designed to be declared as a `static`.
pub struct ContextVar<T> {
    name: &'static str,
    default: Option<T>,
    id: OnceLock<u64>,
}

impl<T: Clone + 'static> ContextVar<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            default: None,
            id: OnceLock::new(),
        }
    }

    pub const fn with_default(name: &'static str, default: T) -> Self {
        Self {
            name,
            default: Some(default),
            id: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The value in the current context, else the default, else `None`.
    pub fn get(&self) -> Option<T> {
        context::with_vars(|vars| vars.get(self))
    }

    /// Sets the value in the current context. The returned token restores the
    /// previous value through [`ContextVar::reset`].
    pub fn set(&self, value: T) -> Token<T> {
        let id = self.id();
        let prev = context::with_vars(|vars| vars.insert(id, Some(Rc::new(value))));

        Token {
            id,
            prev,
            _p: PhantomData,
        }
    }

    /// Restores the value the variable had before the `set` that produced
    /// `token`.
    pub fn reset(&self, token: Token<T>) {
        debug_assert_eq!(token.id, self.id(), "token belongs to another variable");
        context::with_vars(|vars| vars.insert(token.id, token.prev));
    }

    fn id(&self) -> u64 {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        *self
            .id
            .get_or_init(|| NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl<T> fmt::Debug for ContextVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextVar")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Restores a variable to its previous value, see [`ContextVar::set`].
pub struct Token<T> {
    id: u64,
    prev: Option<Value>,
    _p: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("had_value", &self.prev.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as rondo;
    use crate::runtime::Builder;
    use crate::time::sleep;
    use anyhow::Result;
    use std::time::Duration;

    static DELAY: ContextVar<u64> = ContextVar::with_default("delay", 1);
    static LABEL: ContextVar<String> = ContextVar::new("label");

    #[test]
    fn test_default_and_unset() {
        assert_eq!(DELAY.get(), Some(1));
        assert_eq!(LABEL.get(), None);
        assert_eq!(LABEL.name(), "label");
    }

    #[test]
    fn test_set_and_reset() {
        let token = LABEL.set("first".into());
        assert_eq!(LABEL.get().as_deref(), Some("first"));

        let inner = LABEL.set("second".into());
        assert_eq!(LABEL.get().as_deref(), Some("second"));

        LABEL.reset(inner);
        assert_eq!(LABEL.get().as_deref(), Some("first"));

        LABEL.reset(token);
        assert_eq!(LABEL.get(), None);
    }

    #[test]
    fn test_snapshot_run_is_isolated() {
        let _token = DELAY.set(5);
        let snapshot = copy_context();

        let (seen, after) = snapshot.clone().run(|| {
            let seen = DELAY.get();
            let _ = DELAY.set(9);
            seen
        });

        assert_eq!(seen, Some(5));
        assert_eq!(after.get(&DELAY), Some(9));
        assert_eq!(snapshot.get(&DELAY), Some(5));
        assert_eq!(DELAY.get(), Some(5));
    }

    #[rondo::test(start_paused = true)]
    async fn test_children_inherit_but_do_not_leak() -> Result<()> {
        let _token = LABEL.set("main".into());
        DELAY.set(2);

        let mut handles = Vec::new();
        for i in 0..3u64 {
            handles.push(rondo::spawn(async move {
                let inherited = (LABEL.get(), DELAY.get());

                // Siblings run interleaved, each writes its own copy.
                DELAY.set(10 + i);
                sleep(Duration::from_secs(1)).await?;

                assert_eq!(DELAY.get(), Some(10 + i));
                Ok(inherited)
            }));
        }

        for handle in handles {
            assert_eq!(handle.await?, (Some("main".to_string()), Some(2)));
        }

        assert_eq!(DELAY.get(), Some(2));
        assert_eq!(LABEL.get().as_deref(), Some("main"));
        Ok(())
    }

    #[test]
    fn test_root_writes_do_not_leak_to_thread() -> Result<()> {
        let runtime = Builder::new_local().try_build()?;

        runtime.block_on(async {
            LABEL.set("inside".into());
        });

        assert_eq!(LABEL.get(), None);
        Ok(())
    }

    #[rondo::test]
    async fn test_spawn_with_explicit_context() -> Result<()> {
        let (_, snapshot) = copy_context().run(|| LABEL.set("custom".into()));

        let handle = rondo::spawn_builder()
            .with_context(snapshot)
            .spawn(async { Ok(LABEL.get()) });

        assert_eq!(handle.await?.as_deref(), Some("custom"));
        assert_eq!(LABEL.get(), None);
        Ok(())
    }
}
