//! Min-heap of deadlines driving sleeps and timeouts.
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Weak;
use std::time::Instant;

/// Something to do once a deadline elapses.
///
/// `seq` is the value returned by [`TimerHeap::insert`]. Targets re-armed
/// since then compare it against their latest registration and ignore stale
/// entries.
pub(crate) trait Expire {
    fn expire(&self, seq: u64);
}

struct Entry {
    deadline: Instant,
    seq: u64,
    target: Weak<dyn Expire>,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and we want the earliest first.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

#[derive(Default)]
pub(crate) struct TimerHeap {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl TimerHeap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Registers `target` to expire at `deadline`. Entries sharing a deadline
    /// expire in insertion order.
    pub(crate) fn insert(&mut self, deadline: Instant, target: Weak<dyn Expire>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.heap.push(Entry {
            deadline,
            seq,
            target,
        });

        seq
    }

    /// Earliest deadline with a live target. Entries whose target was dropped
    /// are discarded on the way.
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(entry) = self.heap.peek() {
            if entry.target.strong_count() > 0 {
                return Some(entry.deadline);
            }
            self.heap.pop();
        }

        None
    }

    /// Pops every entry due at `now`, in deadline order. The caller runs the
    /// returned callbacks once the heap is no longer borrowed.
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Vec<Expired> {
        let mut expired = Vec::new();

        while self.heap.peek().is_some_and(|entry| entry.deadline <= now) {
            let Some(entry) = self.heap.pop() else {
                break;
            };

            expired.push(Expired {
                seq: entry.seq,
                target: entry.target,
            });
        }

        expired
    }
}

/// A due timer, detached from the heap.
pub(crate) struct Expired {
    seq: u64,
    target: Weak<dyn Expire>,
}

impl Expired {
    /// Returns false if the target was dropped in the meantime.
    pub(crate) fn fire(self) -> bool {
        match self.target.upgrade() {
            Some(target) => {
                target.expire(self.seq);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        fired: RefCell<Vec<u64>>,
    }

    impl Expire for Recorder {
        fn expire(&self, seq: u64) {
            self.fired.borrow_mut().push(seq);
        }
    }

    fn weak(target: &Rc<Recorder>) -> Weak<dyn Expire> {
        let weak: Weak<Recorder> = Rc::downgrade(target);
        weak
    }

    #[test]
    fn test_expires_in_deadline_then_insertion_order() {
        let start = Instant::now();
        let recorder = Rc::new(Recorder::default());
        let mut heap = TimerHeap::new();

        let late = heap.insert(start + Duration::from_secs(2), weak(&recorder));
        let first = heap.insert(start + Duration::from_secs(1), weak(&recorder));
        let second = heap.insert(start + Duration::from_secs(1), weak(&recorder));

        assert_eq!(heap.next_deadline(), Some(start + Duration::from_secs(1)));

        heap.pop_expired(start + Duration::from_secs(1))
            .into_iter()
            .for_each(|e| assert!(e.fire()));
        assert_eq!(*recorder.fired.borrow(), vec![first, second]);
        assert_eq!(heap.len(), 1);

        heap.pop_expired(start + Duration::from_secs(5))
            .into_iter()
            .for_each(|e| assert!(e.fire()));
        assert_eq!(*recorder.fired.borrow(), vec![first, second, late]);
        assert!(heap.is_empty());
    }

    #[test]
    fn test_dropped_targets_are_skipped() {
        let start = Instant::now();
        let alive = Rc::new(Recorder::default());
        let mut heap = TimerHeap::new();

        {
            let dropped = Rc::new(Recorder::default());
            heap.insert(start, weak(&dropped));
        }
        heap.insert(start + Duration::from_secs(1), weak(&alive));

        assert_eq!(heap.next_deadline(), Some(start + Duration::from_secs(1)));
        assert_eq!(heap.len(), 1);
    }
}
