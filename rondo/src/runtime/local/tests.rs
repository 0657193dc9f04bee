use super::*;
use crate as rondo;
use crate::Error;
use crate::runtime::Builder;
use crate::task::{JoinHandle, State};
use crate::time::{sleep, yield_now};
use anyhow::Result;
use static_assertions::assert_not_impl_any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_test::traced_test;

assert_not_impl_any!(Scheduler: Send, Sync);
assert_not_impl_any!(Handle: Send, Sync);

struct DropFlag(Rc<Cell<bool>>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.set(true);
    }
}

#[rondo::test]
async fn test_ready_tasks_run_in_spawn_order() -> Result<()> {
    let order = Rc::new(RefCell::new(Vec::new()));

    let handles: Vec<_> = (0..5)
        .map(|n| {
            let order = order.clone();
            rondo::spawn(async move {
                order.borrow_mut().push(n);
                Ok(())
            })
        })
        .collect();

    yield_now().await?;
    assert_eq!(*order.borrow(), vec![0, 1, 2, 3, 4]);

    for handle in handles {
        handle.await?;
    }
    Ok(())
}

#[test]
#[should_panic(expected = "Cannot block_on from within the runtime")]
fn test_nested_block_on_panics() {
    let runtime = Builder::new_local().try_build().unwrap();
    runtime.block_on(async { rondo::block_on(async {}) });
}

#[test]
fn test_tasks_survive_across_block_on_calls() -> Result<()> {
    let runtime = Builder::new_local().start_paused(true).try_build()?;

    let handle = runtime.spawn(async {
        sleep(Duration::from_secs(2)).await?;
        Ok("done")
    });
    let cancel = handle.cancel_handle();

    runtime.block_on(sleep(Duration::from_secs(1)))?;
    assert_eq!(cancel.state(), State::Suspended);

    assert_eq!(runtime.block_on(handle)?, "done");
    Ok(())
}

#[test]
fn test_shutdown_cancels_live_tasks() -> Result<()> {
    let runtime = Builder::new_local().try_build()?;
    let cleaned_up = Rc::new(Cell::new(false));

    let flag = cleaned_up.clone();
    let handle = runtime.spawn(async move {
        let out = sleep(Duration::from_secs(3600)).await;
        flag.set(out == Err(Error::Cancelled));
        out
    });
    let cancel = handle.cancel_handle();
    drop(handle);

    runtime.block_on(yield_now())?;
    assert_eq!(runtime.scheduler().tasks.len(), 1);

    let start = Instant::now();
    runtime.shutdown();

    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(cleaned_up.get());
    assert_eq!(cancel.state(), State::Cancelled);
    Ok(())
}

#[test]
#[traced_test]
fn test_shutdown_timeout_drops_stubborn_tasks() -> Result<()> {
    let runtime = Builder::new_local()
        .shutdown_timeout(Duration::from_millis(50))
        .try_build()?;
    let dropped = Rc::new(Cell::new(false));

    let guard = DropFlag(dropped.clone());
    let handle: JoinHandle<()> = runtime.spawn(async move {
        let _guard = guard;
        loop {
            // Swallows every cancellation.
            let _ = sleep(Duration::from_millis(10)).await;
        }
    });
    let cancel = handle.cancel_handle();

    runtime.block_on(yield_now())?;

    let start = Instant::now();
    runtime.shutdown();

    assert!(start.elapsed() >= Duration::from_millis(50));
    assert!(dropped.get());
    assert_eq!(cancel.state(), State::Cancelled);
    assert_eq!(futures::executor::block_on(handle), Err(Error::Cancelled));
    assert!(logs_contain("dropping task still alive at shutdown"));
    Ok(())
}

#[rondo::test(blocking_threads = 1)]
async fn test_blocking_calls_run_on_named_threads() -> Result<()> {
    let first = rondo::spawn_blocking(|| thread::current().name().map(str::to_owned)).await?;
    assert_eq!(first.as_deref(), Some("rondo-blocking-0"));

    let other = rondo::to_thread(|| 40 + 2).await?;
    assert_eq!(other, 42);
    Ok(())
}

#[test]
fn test_custom_blocking_thread_names() -> Result<()> {
    let runtime = Builder::new_local()
        .thread_name("offload")
        .blocking_threads(1)
        .try_build()?;

    let name = runtime.block_on(rondo::spawn_blocking(|| {
        thread::current().name().map(str::to_owned)
    }))?;
    assert_eq!(name.as_deref(), Some("offload"));
    Ok(())
}

#[rondo::test]
async fn test_timers_fire_while_tasks_stay_ready() -> Result<()> {
    let done = Rc::new(Cell::new(false));

    let flag = done.clone();
    let spinner = rondo::spawn(async move {
        let mut turns = 0u64;
        while !flag.get() {
            yield_now().await?;
            turns += 1;
        }
        Ok(turns)
    });

    // The ready queue never empties, only the ticker can fire this timer.
    sleep(Duration::from_millis(5)).await?;
    done.set(true);

    assert!(spinner.await? > 0);
    Ok(())
}

#[rondo::test(start_paused = true)]
async fn test_paused_clock_skips_idle_time() -> Result<()> {
    let wall = Instant::now();
    let start = rondo::time::now();

    sleep(Duration::from_secs(3600)).await?;

    assert_eq!(rondo::time::now() - start, Duration::from_secs(3600));
    assert!(wall.elapsed() < Duration::from_secs(1));
    Ok(())
}

#[rondo::test(start_paused = true)]
async fn test_paused_clock_holds_while_tasks_are_ready() -> Result<()> {
    let start = rondo::time::now();

    let spinner = rondo::spawn(async {
        for _ in 0..100 {
            yield_now().await?;
        }
        Ok(rondo::time::now())
    });

    sleep(Duration::from_secs(1)).await?;

    assert_eq!(spinner.await?, start);
    assert_eq!(rondo::time::now() - start, Duration::from_secs(1));
    Ok(())
}
