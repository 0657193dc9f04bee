use crate::executor::handle::{BlockingHandle, JobGuard};
use crate::runtime::runtime::ThreadNameFn;
use crate::{Error, Result};
use anyhow::{Context as _, ensure};
use crossbeam_channel::{Receiver, Sender, unbounded};
use futures::channel::oneshot;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed set of OS threads running blocking callables off the run loop.
///
/// Jobs are taken from a shared channel in submission order. Dropping the pool
/// lets the workers finish the queued jobs, then joins them.
///
/// # Examples
///
/// ```
/// use rondo::executor::ThreadPool;
///
/// # #[rondo::main]
/// # async fn main() -> anyhow::Result<()> {
/// let pool = ThreadPool::new(2)?;
/// let sum = pool.submit(|| (1..=10u64).sum::<u64>()).await?;
/// assert_eq!(sum, 55);
/// # Ok(())
/// # }
/// ```
pub struct ThreadPool {
    size: usize,

    sender: Option<Sender<Job>>,

    workers: Vec<thread::JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawns `size` workers named `rondo-pool-{n}`.
    pub fn new(size: usize) -> anyhow::Result<ThreadPool> {
        ThreadPool::with_config(size, &ThreadNameFn::numbered("rondo-pool"), None)
    }

    pub(crate) fn with_config(
        size: usize,
        thread_name: &ThreadNameFn,
        stack_size: Option<usize>,
    ) -> anyhow::Result<ThreadPool> {
        ensure!(size > 0, "thread pool needs at least one worker");

        let (sender, receiver) = unbounded::<Job>();

        let workers = (0..size)
            .map(|_| spawn_worker_thread(receiver.clone(), thread_name, stack_size))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(ThreadPool {
            size,
            sender: Some(sender),
            workers,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `f` on a worker thread.
    ///
    /// A panic inside `f` completes the handle with
    /// [`Error::ExecutorFailed`].
    pub fn submit<F, T>(&self, f: F) -> BlockingHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.submit_fallible(move || Ok(f()))
    }

    pub(crate) fn submit_fallible<F, T>(&self, f: F) -> BlockingHandle<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let Some(sender) = &self.sender else {
            return BlockingHandle::failed(Error::executor("thread pool is shut down"));
        };

        let (tx, rx) = oneshot::channel();
        let guard = JobGuard::new();

        let job: Job = Box::new(move || {
            // Dropped last, once the outcome is on its way.
            let _guard = guard;

            let out = panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
                Err(Error::executor(Error::panic_message(&*payload)))
            });

            if let Err(Err(err)) = tx.send(out) {
                tracing::warn!(error = %err, "executor job failed after its awaiter went away");
            }
        });

        if sender.send(job).is_err() {
            return BlockingHandle::failed(Error::executor("thread pool is shut down"));
        }

        BlockingHandle::new(rx)
    }
}

fn spawn_worker_thread(
    receiver: Receiver<Job>,
    thread_name: &ThreadNameFn,
    stack_size: Option<usize>,
) -> anyhow::Result<thread::JoinHandle<()>> {
    let mut builder = thread::Builder::new();

    if let Some(stack_size) = stack_size {
        builder = builder.stack_size(stack_size);
    }

    let name = (thread_name.0)();
    builder
        .name(name.clone())
        .spawn(move || {
            for job in receiver.iter() {
                job();
            }
        })
        .with_context(|| format!("failed to spawn worker thread {name}"))
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Closing the channel ends the worker loops once the queue is empty.
        drop(self.sender.take());

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::warn!("thread pool worker panicked");
            }
        }
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as rondo;
    use crate::time::{self, sleep};
    use anyhow::Result;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    #[rondo::test]
    async fn test_jobs_run_off_the_loop_thread() -> Result<()> {
        let pool = ThreadPool::new(1)?;
        let name = pool
            .submit(|| thread::current().name().map(str::to_owned))
            .await?;

        assert_eq!(name.as_deref(), Some("rondo-pool-0"));
        assert_ne!(thread::current().name(), name.as_deref());
        Ok(())
    }

    #[rondo::test]
    async fn test_panicking_job_reports_executor_failure() -> Result<()> {
        let pool = ThreadPool::new(1)?;
        let out = pool.submit(|| -> u32 { panic!("worker exploded") }).await;

        assert_eq!(
            out,
            Err(Error::ExecutorFailed("panicked: worker exploded".into()))
        );

        // The worker survives the panic.
        assert_eq!(pool.submit(|| 1).await?, 1);
        Ok(())
    }

    #[rondo::test]
    async fn test_jobs_run_in_parallel() -> Result<()> {
        let pool = ThreadPool::new(3)?;
        let barrier = Arc::new(Barrier::new(3));

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let barrier = barrier.clone();
                pool.submit(move || {
                    barrier.wait();
                    i
                })
            })
            .collect();

        let mut out = Vec::new();
        for handle in handles {
            out.push(handle.await?);
        }

        assert_eq!(out, vec![0, 1, 2]);
        Ok(())
    }

    // Real clock: a paused one would hold still while the job is in flight.
    #[rondo::test]
    async fn test_blocking_call_does_not_block_the_loop() -> Result<()> {
        let pool = ThreadPool::new(1)?;
        let trace = Rc::new(RefCell::new(vec!["start"]));

        let blocking = pool.submit(|| {
            thread::sleep(Duration::from_millis(400));
            "block_io"
        });

        let hello = {
            let trace = trace.clone();
            rondo::spawn(async move {
                sleep(Duration::from_millis(100)).await?;
                trace.borrow_mut().push("hello");
                Ok(())
            })
        };

        trace.borrow_mut().push(blocking.await?);
        hello.await?;
        trace.borrow_mut().push("stop");

        assert_eq!(*trace.borrow(), vec!["start", "hello", "block_io", "stop"]);
        Ok(())
    }

    #[rondo::test(start_paused = true)]
    async fn test_paused_clock_waits_for_busy_workers() -> Result<()> {
        let pool = ThreadPool::new(1)?;
        let start = time::now();

        let sleeper = rondo::spawn(sleep(Duration::from_secs(3600)));
        pool.submit(|| thread::sleep(Duration::from_millis(50)))
            .await?;

        assert!(time::now() - start < Duration::from_secs(3600));
        assert!(!sleeper.is_finished());

        sleeper.cancel();
        assert_eq!(sleeper.await, Err(Error::Cancelled));
        Ok(())
    }

    #[rondo::test]
    async fn test_cancelled_awaiter_lets_job_finish() -> Result<()> {
        let pool = ThreadPool::new(1)?;
        let ran = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Barrier::new(2));

        let waiter = {
            let ran = ran.clone();
            let gate = gate.clone();
            let job = pool.submit(move || {
                gate.wait();
                ran.fetch_add(1, Ordering::SeqCst);
            });
            rondo::spawn(job)
        };

        time::yield_now().await?;
        assert!(waiter.cancel());
        assert_eq!(waiter.await, Err(Error::Cancelled));

        gate.wait();
        drop(pool);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        Ok(())
    }
}
