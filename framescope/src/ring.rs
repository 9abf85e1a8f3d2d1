//! Single-producer/single-consumer event ring, one per recording thread.

use std::{
    cell::UnsafeCell,
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

use crate::event::ScopeEvent;

/// Fixed-capacity circular event queue owned by one recording thread.
///
/// The owning thread is the only writer of the slots and the write cursor;
/// the collector is the only reader of the slots and the only writer of the
/// read cursor. Cursor stores use release ordering and the opposite side
/// loads them with acquire ordering, so a slot is never read before the write
/// that filled it is visible. One slot is kept vacant to disambiguate a full
/// ring from an empty one: a ring of capacity C holds at most C - 1 events.
/// A full ring drops the incoming event rather than overwrite unread data.
///
/// Rings are `Box::leak`ed at creation and never freed; a ring whose owner
/// exited is retired (alive flag cleared) and goes inert once drained.
pub(crate) struct EventRing {
    slots: Box<[UnsafeCell<ScopeEvent>]>,
    /// Next slot to write. Owner-thread stores, collector acquire-loads.
    write: AtomicUsize,
    /// Next slot to read. Collector stores, owner-thread acquire-loads.
    read: AtomicUsize,
    /// Cleared exactly once, when the owning thread's storage is torn down.
    alive: AtomicBool,
    /// Thread-class flag: set if the owning thread was marked primary.
    primary: AtomicBool,
    /// Events discarded because the ring was full.
    dropped: AtomicU64,
    /// Profiler-assigned id of the owning thread.
    thread_id: u64,
}

// SAFETY: slots are only written by the owning thread and only read by the
// collector, and each side acquire-loads the other's cursor before touching
// a slot the other side published. No slot is ever accessed from both sides
// at once.
unsafe impl Sync for EventRing {}

impl EventRing {
    pub(crate) fn new(capacity: usize, thread_id: u64) -> Self {
        let slots = (0..capacity.max(2))
            .map(|_| UnsafeCell::new(ScopeEvent::EMPTY))
            .collect();
        Self {
            slots,
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
            alive: AtomicBool::new(true),
            primary: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            thread_id,
        }
    }

    pub(crate) fn thread_id(&self) -> u64 {
        self.thread_id
    }

    /// Append an event. Owning thread only. Returns `false` if the ring was
    /// full and the event was dropped.
    pub(crate) fn push(&self, event: ScopeEvent) -> bool {
        let write = self.write.load(Ordering::Relaxed);
        let next = (write + 1) % self.slots.len();
        if next == self.read.load(Ordering::Acquire) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        // SAFETY: `write` is owned by this thread and the slot at `write` is
        // outside the readable window, so the collector cannot observe it
        // until the release store below publishes it.
        unsafe { *self.slots[write].get() = event };
        self.write.store(next, Ordering::Release);
        true
    }

    /// Take the oldest unread event. Collector only.
    pub(crate) fn pop(&self) -> Option<ScopeEvent> {
        let read = self.read.load(Ordering::Relaxed);
        if read == self.write.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: the acquire load above proved the owner published this
        // slot, and the owner will not rewrite it until the release store
        // below moves it outside the readable window.
        let event = unsafe { *self.slots[read].get() };
        self.read
            .store((read + 1) % self.slots.len(), Ordering::Release);
        Some(event)
    }

    /// Whether no unread events remain.
    pub(crate) fn is_empty(&self) -> bool {
        self.read.load(Ordering::Acquire) == self.write.load(Ordering::Acquire)
    }

    /// Drop every unread event by jumping the read cursor to the write
    /// cursor. Touches consumer-owned state only, so it is safe while the
    /// owner keeps writing.
    pub(crate) fn discard_pending(&self) {
        self.read
            .store(self.write.load(Ordering::Acquire), Ordering::Release);
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Mark the owning thread as gone. Called once from TLS teardown.
    pub(crate) fn retire(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub(crate) fn mark_primary(&self) {
        self.primary.store(true, Ordering::Release);
    }

    pub(crate) fn is_primary(&self) -> bool {
        self.primary.load(Ordering::Relaxed)
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(i: u64) -> ScopeEvent {
        ScopeEvent {
            name: "ring_test",
            parent: None,
            duration_ms: i as f64,
            thread_id: i.wrapping_mul(3),
            depth: (i % 7) as u16,
            primary: false,
        }
    }

    #[test]
    fn pops_preserve_push_order() {
        let ring = EventRing::new(16, 0);
        for i in 0..10 {
            assert!(ring.push(event(i)));
        }
        for i in 0..10 {
            let popped = ring.pop().expect("event should be available");
            assert_eq!(popped.duration_ms, i as f64);
        }
        assert!(ring.pop().is_none());
    }

    #[test]
    fn full_ring_drops_newest_and_counts() {
        let ring = EventRing::new(4, 0);
        let mut accepted = 0;
        for i in 0..6 {
            if ring.push(event(i)) {
                accepted += 1;
            }
        }
        // One slot stays vacant: capacity 4 holds exactly 3 events.
        assert_eq!(accepted, 3);
        assert_eq!(ring.dropped(), 3);
        for i in 0..3 {
            let popped = ring.pop().expect("oldest events should survive");
            assert_eq!(popped.duration_ms, i as f64);
        }
        assert!(ring.pop().is_none());
    }

    #[test]
    fn discard_pending_empties_the_ring() {
        let ring = EventRing::new(8, 0);
        for i in 0..5 {
            ring.push(event(i));
        }
        ring.discard_pending();
        assert!(ring.is_empty());
        assert!(ring.pop().is_none());
        // The ring stays usable afterwards.
        assert!(ring.push(event(42)));
        assert_eq!(
            ring.pop().expect("event should be available").duration_ms,
            42.0
        );
    }

    #[test]
    fn retire_clears_liveness_once() {
        let ring = EventRing::new(4, 9);
        assert!(ring.is_alive());
        ring.retire();
        assert!(!ring.is_alive());
        assert_eq!(ring.thread_id(), 9);
    }

    #[test]
    fn concurrent_push_pop_never_tears() {
        const COUNT: u64 = 10_000;
        let ring = EventRing::new(64, 0);
        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..COUNT {
                    // Spin until the slot frees up; the drop counter is
                    // irrelevant here, only slot integrity is under test.
                    while !ring.push(event(i)) {
                        std::hint::spin_loop();
                    }
                }
            });
            let mut expected = 0u64;
            while expected < COUNT {
                match ring.pop() {
                    Some(popped) => {
                        assert_eq!(popped.duration_ms, expected as f64);
                        assert_eq!(popped.thread_id, expected.wrapping_mul(3));
                        assert_eq!(popped.depth, (expected % 7) as u16);
                        expected += 1;
                    }
                    None => std::hint::spin_loop(),
                }
            }
        });
        assert!(ring.is_empty());
    }
}
