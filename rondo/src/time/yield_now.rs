use crate::context;
use crate::{Error, Result};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Gives the turn back to the scheduler.
///
/// The task goes to the back of the ready queue, every task that was already
/// ready runs before it resumes.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by [`yield_now`].
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if context::take_cancellation() {
            return Poll::Ready(Err(Error::Cancelled));
        }

        // Only yield on first poll. Next time the task is scheduled we return.
        if self.yielded {
            return Poll::Ready(Ok(()));
        }

        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as rondo;
    use anyhow::Result;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[rondo::test]
    async fn test_yield_interleaves_in_fifo_order() -> Result<()> {
        let trace = Rc::new(RefCell::new(Vec::new()));

        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|name| {
                let trace = trace.clone();
                rondo::spawn(async move {
                    for round in 0..2 {
                        trace.borrow_mut().push(format!("{name}{round}"));
                        yield_now().await?;
                    }
                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            handle.await?;
        }

        assert_eq!(*trace.borrow(), vec!["a0", "b0", "a1", "b1"]);
        Ok(())
    }

    #[rondo::test]
    async fn test_yield_observes_cancellation() -> Result<()> {
        let handle = rondo::spawn(async {
            loop {
                yield_now().await?;
            }
        });

        yield_now().await?;
        assert!(handle.cancel());
        assert_eq!(handle.await, Err::<(), _>(rondo::Error::Cancelled));
        Ok(())
    }
}
