use crate::context;
use crate::runtime::local::Scheduler;
use crate::runtime::runtime::RuntimeConfig;
use crate::runtime::{Park, Ticker, TickerData, TickerEvents};
use crate::task::{Header, Id, State};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug)]
pub(crate) struct Worker {
    /// Determines how we run the event loop.
    policy: EventLoopPolicy,

    /// Event loop ticker.
    ticker: RefCell<Ticker>,

    /// FIFO ready queue. Holds each task at most once, see
    /// `Header::try_notify`.
    pollable: RefCell<VecDeque<Id>>,

    /// Scratch buffer for notifications taken from the inbox.
    woken: RefCell<VecDeque<Id>>,
}

impl Worker {
    pub(super) fn new(cfg: &RuntimeConfig) -> Self {
        Self {
            policy: cfg.into(),
            ticker: RefCell::new(Ticker::new()),
            pollable: RefCell::new(VecDeque::new()),
            woken: RefCell::new(VecDeque::new()),
        }
    }

    /// Queues a task unless it is already queued or finished.
    pub(crate) fn schedule(&self, header: &Header) {
        if header.try_notify() {
            self.pollable.borrow_mut().push_back(header.id);
        }
    }

    /// Moves woken tasks to the ready queue, in wake order. `root` resolves
    /// [`Id::ROOT`], notifications for it are dropped outside of `block_on`.
    fn drain_inbox(&self, s: &Scheduler, root: Option<&Rc<Header>>) {
        let mut woken = self.woken.borrow_mut();
        s.shared.drain_into(&mut woken);

        for id in woken.drain(..) {
            let header = match id.is_root() {
                true => root.cloned(),
                false => s.tasks.get(id).map(|task| task.header().clone()),
            };

            if let Some(header) = header {
                self.schedule(&header);
            }
        }
    }

    fn find_task(&self, s: &Scheduler, root: Option<&Rc<Header>>) -> Option<Id> {
        self.drain_inbox(s, root);
        self.pollable.borrow_mut().pop_front()
    }

    fn tick(&self, s: &Scheduler) {
        let events = self.ticker.borrow_mut().tick(s, &self.policy);

        if events.contains(TickerEvents::FIRE_TIMERS) {
            s.fire_timers();
        }
    }

    /// Nothing is ready: fire due timers, or park until something happens.
    /// `cap` bounds the time spent parked, on the wall clock.
    fn idle(&self, s: &Scheduler, cap: Option<Duration>) {
        if s.fire_timers() > 0 {
            return;
        }

        let deadline = s.timers.borrow_mut().next_deadline();

        s.shared.park(|in_flight| {
            let decision = match deadline {
                Some(deadline) if s.clock.is_paused() && in_flight == 0 => {
                    s.clock.advance_to(deadline);
                    Park::Skip
                }
                Some(_) if s.clock.is_paused() => Park::Wait(cap),
                Some(deadline) => {
                    let until = deadline.saturating_duration_since(s.clock.now());
                    Park::Wait(Some(cap.map_or(until, |cap| cap.min(until))))
                }
                None => Park::Wait(cap),
            };

            trace!(?decision, in_flight, "run loop idle");
            decision
        });
    }

    /// Event loop to drive work to completion. The root future is polled
    /// whenever [`Id::ROOT`] comes up in the ready queue.
    pub(super) fn block_on<F: Future>(
        &self,
        s: &Scheduler,
        root: &Rc<Header>,
        mut future: Pin<&mut F>,
    ) -> F::Output {
        self.schedule(root);

        loop {
            let Some(id) = self.find_task(s, Some(root)) else {
                self.idle(s, None);
                continue;
            };

            if id.is_root() {
                if let Poll::Ready(out) = poll_root(root, future.as_mut()) {
                    return out;
                }
            } else {
                s.run_task(id);
            }

            self.tick(s);
        }
    }

    /// Runs tasks until the registry is empty or `timeout` elapses on the
    /// wall clock.
    pub(super) fn drain(&self, s: &Scheduler, timeout: Duration) {
        // An unrepresentable deadline waits for every task.
        let deadline = Instant::now().checked_add(timeout);

        while !s.tasks.is_empty() {
            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                break;
            }

            match self.find_task(s, None) {
                Some(id) => {
                    s.run_task(id);
                    self.tick(s);
                }
                None => self.idle(s, deadline.map(|deadline| deadline - now)),
            }
        }
    }
}

fn poll_root<F: Future>(root: &Rc<Header>, future: Pin<&mut F>) -> Poll<F::Output> {
    root.clear_notified();
    root.set_state(State::Running);

    let polled = {
        let _guard = context::enter_task(root.clone());
        let mut cx = Context::from_waker(&root.waker);
        future.poll(&mut cx)
    };

    match polled {
        Poll::Ready(out) => {
            root.set_state(State::Success);
            Poll::Ready(out)
        }
        Poll::Pending => {
            // Woken while running: already back in the queue.
            if root.state() == State::Running {
                root.set_state(State::Suspended);
            }
            Poll::Pending
        }
    }
}

#[derive(Debug, Clone)]
struct EventLoopPolicy {
    timer_interval: u32,
}

impl From<&RuntimeConfig> for EventLoopPolicy {
    fn from(from: &RuntimeConfig) -> EventLoopPolicy {
        EventLoopPolicy {
            timer_interval: from.timer_interval,
        }
    }
}

impl TickerData for EventLoopPolicy {
    type Context = Scheduler;

    fn check(&self, s: &Scheduler, tick: u32) -> TickerEvents {
        let mut events = TickerEvents::empty();

        if tick % self.timer_interval == 0 && !s.timers.borrow().is_empty() {
            events.insert(TickerEvents::FIRE_TIMERS);
        }

        events
    }
}
