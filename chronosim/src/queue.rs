//! The event queue (`spec.md` §4.1): an ordered multimap from deadline to
//! events, FIFO within a deadline, with O(log n)-ish insert/pop-min and
//! handle-based cancellation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::time::VirtualTime;

/// An opaque, process-wide unique token identifying a scheduled event so it
/// can later be cancelled. Never reused within a process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(u64);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

impl EventHandle {
    fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

struct Slot<T> {
    handle: EventHandle,
    item: T,
}

/// A deadline-ordered multimap of scheduled items, generic in the scheduled
/// payload `T` so that the queue itself stays ignorant of what an "event"
/// actually does when dispatched (that's the virtual clock's job).
///
/// Backed by a `BTreeMap<VirtualTime, VecDeque<Slot<T>>>` (insertion order
/// preserved per deadline, giving the FIFO-within-deadline tie-break
/// `spec.md` §3 requires) plus a `handle -> deadline` side index so
/// `cancel` doesn't need to scan every deadline bucket.
pub struct EventQueue<T> {
    by_time: BTreeMap<VirtualTime, VecDeque<Slot<T>>>,
    index: HashMap<EventHandle, VirtualTime>,
    len: usize,
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        Self {
            by_time: BTreeMap::new(),
            index: HashMap::new(),
            len: 0,
        }
    }

    /// Inserts `item` at `deadline`. Returns the handle used to cancel it
    /// later. Callers are responsible for rejecting deadlines earlier than
    /// the current time (`spec.md` §4.1: "fails only ... when deadline
    /// precedes current time") before calling this; the queue itself has no
    /// notion of "now".
    pub fn insert(&mut self, deadline: VirtualTime, item: T) -> EventHandle {
        let handle = EventHandle::next();
        self.by_time
            .entry(deadline)
            .or_default()
            .push_back(Slot { handle, item });
        self.index.insert(handle, deadline);
        self.len += 1;
        handle
    }

    /// Returns the smallest deadline with at least one pending event, if any.
    pub fn next_deadline(&self) -> Option<VirtualTime> {
        self.by_time.keys().next().copied()
    }

    /// Removes and returns every event at the smallest deadline, provided
    /// that deadline does not exceed `cutoff`. Events are returned in FIFO
    /// (insertion) order.
    pub fn pop_due(&mut self, cutoff: VirtualTime) -> Option<(VirtualTime, Vec<T>)> {
        let deadline = self.next_deadline()?;
        if deadline > cutoff {
            return None;
        }
        let slots = self.by_time.remove(&deadline).expect("deadline key just peeked");
        let mut items = Vec::with_capacity(slots.len());
        for slot in slots {
            self.index.remove(&slot.handle);
            items.push(slot.item);
        }
        self.len -= items.len();
        Some((deadline, items))
    }

    /// Counts pending events with deadline `<= cutoff`, without removing
    /// them.
    pub fn count_until(&self, cutoff: VirtualTime) -> usize {
        self.by_time
            .range(..=cutoff)
            .map(|(_, slots)| slots.len())
            .sum()
    }

    /// Removes exactly one event by handle. Returns whether it was found.
    /// Worst case is O(k) in the number of events at that event's deadline,
    /// which `spec.md` §4.1 explicitly allows ("O(n) worst case
    /// acceptable").
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        let Some(deadline) = self.index.remove(&handle) else {
            return false;
        };
        if let Some(slots) = self.by_time.get_mut(&deadline) {
            if let Some(pos) = slots.iter().position(|slot| slot.handle == handle) {
                slots.remove(pos);
                self.len -= 1;
                if slots.is_empty() {
                    self.by_time.remove(&deadline);
                }
                return true;
            }
        }
        false
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ticks: u64) -> VirtualTime {
        VirtualTime::from_ticks(ticks)
    }

    #[test]
    fn pops_in_deadline_then_fifo_order() {
        let mut q = EventQueue::new();
        q.insert(t(10), "b-at-10-first");
        q.insert(t(5), "a-at-5");
        q.insert(t(10), "b-at-10-second");

        let (when, items) = q.pop_due(t(100)).unwrap();
        assert_eq!(when, t(5));
        assert_eq!(items, vec!["a-at-5"]);

        let (when, items) = q.pop_due(t(100)).unwrap();
        assert_eq!(when, t(10));
        assert_eq!(items, vec!["b-at-10-first", "b-at-10-second"]);

        assert!(q.pop_due(t(100)).is_none());
    }

    #[test]
    fn pop_due_respects_cutoff() {
        let mut q = EventQueue::new();
        q.insert(t(50), "late");
        assert!(q.pop_due(t(10)).is_none());
        assert_eq!(q.count_until(t(10)), 0);
        assert_eq!(q.count_until(t(50)), 1);
        assert!(q.pop_due(t(50)).is_some());
    }

    #[test]
    fn cancel_removes_exactly_one_event() {
        let mut q = EventQueue::new();
        let h1 = q.insert(t(10), "one");
        let h2 = q.insert(t(10), "two");

        assert!(q.cancel(h1));
        assert!(!q.cancel(h1), "cancelling twice returns false");

        let (_, items) = q.pop_due(t(10)).unwrap();
        assert_eq!(items, vec!["two"]);
        let _ = h2;
    }

    #[test]
    fn cancel_unknown_handle_returns_false() {
        let mut q: EventQueue<()> = EventQueue::new();
        let mut other: EventQueue<()> = EventQueue::new();
        let foreign = other.insert(t(1), ());
        assert!(!q.cancel(foreign));
    }

    #[test]
    fn empty_slots_are_pruned() {
        let mut q = EventQueue::new();
        let h = q.insert(t(10), "only");
        q.cancel(h);
        assert!(q.is_empty());
        assert_eq!(q.next_deadline(), None);
    }
}
