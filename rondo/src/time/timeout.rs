use crate::context;
use crate::task::Header;
use crate::time::timer::Expire;
use crate::{Error, Result};
use pin_project::{pin_project, pinned_drop};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Requires `future` to complete within `duration`.
///
/// When the deadline elapses, the task running the future is cancelled. Once
/// the wrapped future lets the cancellation out, the timeout converts it into
/// [`Error::TimedOut`]. A future that finishes in time returns its own result.
///
/// # Examples
///
/// ```
/// use rondo::time::{sleep, timeout};
/// use rondo::Error;
/// use std::time::Duration;
///
/// # #[rondo::main(start_paused = true)]
/// # async fn main() {
/// let slow = timeout(Duration::from_secs(1), sleep(Duration::from_secs(5)));
/// assert_eq!(slow.await, Err(Error::TimedOut));
///
/// let fast = timeout(Duration::from_secs(1), async { Ok(42) });
/// assert_eq!(fast.await, Ok(42));
/// # }
/// ```
#[track_caller]
pub fn timeout<F, T>(duration: Duration, future: F) -> Timeout<F>
where
    F: Future<Output = Result<T>>,
{
    TimeoutScope::after(duration).wrap(future)
}

/// Like [`timeout`] with an absolute deadline.
pub fn timeout_at<F, T>(deadline: Instant, future: F) -> Timeout<F>
where
    F: Future<Output = Result<T>>,
{
    TimeoutScope::new(Some(deadline)).wrap(future)
}

/// Alias of [`timeout`].
#[track_caller]
pub fn wait_for<F, T>(duration: Duration, future: F) -> Timeout<F>
where
    F: Future<Output = Result<T>>,
{
    timeout(duration, future)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Entered,
    /// Deadline elapsed, the cancellation is on its way.
    Expiring,
    Expired,
    Exited,
}

struct ScopeState {
    deadline: Cell<Option<Instant>>,

    phase: Cell<Phase>,

    /// Sequence of the live timer entry.
    armed: Cell<Option<u64>>,

    /// Task to cancel on expiry, known once the scope is entered.
    task: RefCell<Option<Rc<Header>>>,
}

impl ScopeState {
    fn arm(self: &Rc<Self>) {
        self.armed.set(None);

        let Some(deadline) = self.deadline.get() else {
            return;
        };

        let target: Weak<ScopeState> = Rc::downgrade(self);
        let seq = context::with_scheduler(|s| s.timers.borrow_mut().insert(deadline, target));
        self.armed.set(Some(seq));
    }

    fn enter(self: &Rc<Self>) {
        *self.task.borrow_mut() = context::current_task();
        self.phase.set(Phase::Entered);
        self.arm();
    }

    fn exit<T>(&self, out: Result<T>) -> Result<T> {
        self.armed.set(None);
        let task = self.task.borrow_mut().take();

        match self.phase.get() {
            Phase::Expiring => {
                self.phase.set(Phase::Expired);

                let remaining = task.map_or(0, |task| task.uncancel());
                match out {
                    // Nobody else asked for the cancellation: it was ours.
                    Err(Error::Cancelled) if remaining == 0 => Err(Error::TimedOut),
                    out => out,
                }
            }
            _ => {
                self.phase.set(Phase::Exited);
                out
            }
        }
    }
}

impl Expire for ScopeState {
    fn expire(&self, seq: u64) {
        if self.armed.get() != Some(seq) || self.phase.get() != Phase::Entered {
            return;
        }

        self.armed.set(None);
        self.phase.set(Phase::Expiring);

        if let Some(task) = self.task.borrow().as_ref() {
            tracing::trace!(task.id = %task.id, "timeout expired");
            task.request_cancel();
        }
    }
}

/// A timeout whose deadline can move while it is pending.
///
/// The scope is a cheap handle: clone it, move a clone into the wrapped future,
/// and call [`reschedule`](TimeoutScope::reschedule) from there.
///
/// ```
/// use rondo::time::{self, sleep, TimeoutScope};
/// use std::time::Duration;
///
/// # #[rondo::main(start_paused = true)]
/// # async fn main() -> rondo::Result<()> {
/// let scope = TimeoutScope::new(None);
/// let inner = scope.clone();
///
/// scope
///     .clone()
///     .wrap(async move {
///         inner.reschedule(Some(time::now() + Duration::from_secs(10)))?;
///         sleep(Duration::from_secs(1)).await
///     })
///     .await?;
///
/// assert!(!scope.expired());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TimeoutScope {
    state: Rc<ScopeState>,
}

impl TimeoutScope {
    /// Creates a scope expiring at `deadline`. `None` never expires.
    pub fn new(deadline: Option<Instant>) -> TimeoutScope {
        TimeoutScope {
            state: Rc::new(ScopeState {
                deadline: Cell::new(deadline),
                phase: Cell::new(Phase::Created),
                armed: Cell::new(None),
                task: RefCell::new(None),
            }),
        }
    }

    /// Creates a scope expiring `duration` from now. A duration too large to
    /// represent gives a scope that never expires.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a rondo runtime.
    #[track_caller]
    pub fn after(duration: Duration) -> TimeoutScope {
        let now = context::with_scheduler(|s| s.clock.now());
        TimeoutScope::new(now.checked_add(duration))
    }

    /// Applies the scope to `future`. A scope guards a single future.
    pub fn wrap<F, T>(self, future: F) -> Timeout<F>
    where
        F: Future<Output = Result<T>>,
    {
        Timeout {
            scope: self,
            entered: false,
            inner: future,
        }
    }

    /// Current deadline, `None` if the scope never expires.
    pub fn when(&self) -> Option<Instant> {
        self.state.deadline.get()
    }

    /// Moves the deadline. A deadline already in the past expires the scope at
    /// the next scheduler turn, `None` disables it.
    ///
    /// Fails with [`Error::InvalidState`] once the scope expired or exited.
    pub fn reschedule(&self, deadline: Option<Instant>) -> Result<()> {
        let state = &self.state;

        match state.phase.get() {
            Phase::Created => state.deadline.set(deadline),
            Phase::Entered => {
                state.deadline.set(deadline);
                state.arm();
            }
            Phase::Expiring | Phase::Expired => {
                return Err(Error::InvalidState("timeout scope already expired"));
            }
            Phase::Exited => {
                return Err(Error::InvalidState("timeout scope already exited"));
            }
        }

        Ok(())
    }

    /// Whether the deadline elapsed while the scope was active.
    pub fn expired(&self) -> bool {
        matches!(self.state.phase.get(), Phase::Expiring | Phase::Expired)
    }
}

impl fmt::Debug for TimeoutScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutScope")
            .field("when", &self.when())
            .field("phase", &self.state.phase.get())
            .finish()
    }
}

/// Future returned by [`timeout`], [`timeout_at`] and [`TimeoutScope::wrap`].
#[pin_project(PinnedDrop)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Timeout<F> {
    scope: TimeoutScope,

    entered: bool,

    #[pin]
    inner: F,
}

impl<F> Timeout<F> {
    pub fn scope(&self) -> &TimeoutScope {
        &self.scope
    }
}

impl<F, T> Future for Timeout<F>
where
    F: Future<Output = Result<T>>,
{
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let state = &this.scope.state;

        if !*this.entered {
            if state.phase.get() != Phase::Created {
                return Poll::Ready(Err(Error::InvalidState("timeout scope entered twice")));
            }

            *this.entered = true;
            state.enter();
        }

        match this.inner.poll(cx) {
            Poll::Ready(out) => Poll::Ready(state.exit(out)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[pinned_drop]
impl<F> PinnedDrop for Timeout<F> {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        let state = &this.scope.state;

        if *this.entered && matches!(state.phase.get(), Phase::Entered | Phase::Expiring) {
            let _ = state.exit(Ok(()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as rondo;
    use crate::task;
    use crate::time::{self, sleep};
    use anyhow::Result;
    use rstest::rstest;

    #[rstest]
    #[case::finishes_in_time(1, 5, Ok(()))]
    #[case::runs_past_deadline(5, 1, Err(Error::TimedOut))]
    #[rondo::test(start_paused = true)]
    async fn test_timeout_outcome(
        #[case] work_secs: u64,
        #[case] limit_secs: u64,
        #[case] expected: rondo::Result<()>,
    ) -> Result<()> {
        let start = time::now();
        let out = timeout(
            Duration::from_secs(limit_secs),
            sleep(Duration::from_secs(work_secs)),
        )
        .await;

        assert_eq!(out, expected);
        assert_eq!(
            time::now() - start,
            Duration::from_secs(work_secs.min(limit_secs))
        );
        Ok(())
    }

    #[rondo::test(start_paused = true)]
    async fn test_timeout_in_spawned_task_leaves_no_cancel_behind() -> Result<()> {
        let handle = rondo::spawn(async {
            let first = wait_for(Duration::from_secs(1), sleep(Duration::from_secs(3))).await;
            assert_eq!(task::cancelling(), 0);

            // The task is usable after the timeout.
            sleep(Duration::from_secs(1)).await?;
            Ok(first)
        });

        assert_eq!(handle.await?, Err(Error::TimedOut));
        Ok(())
    }

    #[rondo::test(start_paused = true)]
    async fn test_reschedule_none_scope_completes() -> Result<()> {
        let scope = TimeoutScope::new(None);
        assert_eq!(scope.when(), None);

        let inner = scope.clone();
        let out = scope
            .clone()
            .wrap(async move {
                let deadline = time::now() + Duration::from_secs(10);
                inner.reschedule(Some(deadline))?;
                assert_eq!(inner.when(), Some(deadline));

                sleep(Duration::from_secs(1)).await?;
                Ok("hello")
            })
            .await;

        assert_eq!(out, Ok("hello"));
        assert!(!scope.expired());
        Ok(())
    }

    #[rondo::test(start_paused = true)]
    async fn test_reschedule_to_past_expires() -> Result<()> {
        let scope = TimeoutScope::after(Duration::from_secs(60));
        let inner = scope.clone();

        let start = time::now();
        let out = scope
            .clone()
            .wrap(async move {
                inner.reschedule(Some(time::now() - Duration::from_secs(1)))?;
                sleep(Duration::from_secs(30)).await
            })
            .await;

        assert_eq!(out, Err(Error::TimedOut));
        assert!(scope.expired());
        assert_eq!(time::now(), start);
        Ok(())
    }

    #[rondo::test(start_paused = true)]
    async fn test_reschedule_after_expiry_is_rejected() -> Result<()> {
        let scope = TimeoutScope::after(Duration::from_secs(1));
        let out = scope.clone().wrap(sleep(Duration::from_secs(2))).await;

        assert_eq!(out, Err(Error::TimedOut));
        assert!(matches!(
            scope.reschedule(None),
            Err(Error::InvalidState(_))
        ));
        Ok(())
    }

    #[rondo::test(start_paused = true)]
    async fn test_completion_after_expiry_keeps_result() -> Result<()> {
        let scope = TimeoutScope::after(Duration::from_secs(1));

        let out = scope
            .clone()
            .wrap(async {
                // Swallow the cancellation and finish anyway.
                let swallowed = sleep(Duration::from_secs(5)).await;
                assert_eq!(swallowed, Err(Error::Cancelled));
                Ok(7)
            })
            .await;

        assert_eq!(out, Ok(7));
        assert!(scope.expired());
        Ok(())
    }

    #[rondo::test(start_paused = true)]
    async fn test_external_cancel_wins_over_timeout() -> Result<()> {
        let handle = rondo::spawn(async {
            timeout(Duration::from_secs(1), sleep(Duration::from_secs(5))).await
        });

        sleep(Duration::from_secs(1)).await?;
        handle.cancel();

        assert_eq!(handle.await, Err(Error::Cancelled));
        Ok(())
    }

    #[rondo::test(start_paused = true)]
    async fn test_nested_timeouts_report_the_outer_expiry() -> Result<()> {
        let out = timeout(
            Duration::from_secs(1),
            timeout(Duration::from_secs(10), sleep(Duration::from_secs(20))),
        )
        .await;

        assert_eq!(out, Err(Error::TimedOut));
        Ok(())
    }

    #[rondo::test(start_paused = true)]
    async fn test_unrepresentable_duration_never_expires() -> Result<()> {
        let scope = TimeoutScope::after(Duration::MAX);
        assert_eq!(scope.when(), None);

        let out = wait_for(Duration::MAX, async {
            sleep(Duration::from_secs(3600)).await?;
            Ok("done")
        })
        .await;

        assert_eq!(out, Ok("done"));
        Ok(())
    }
}
