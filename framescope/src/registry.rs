//! Process-wide registry of every recording thread's event ring.

use std::{
    cell::UnsafeCell,
    hint,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::ring::EventRing;

/// Append-only list of all rings ever created, behind a single-bit spinlock.
///
/// Registration happens once per thread lifetime and the collector copies the
/// list out once per pass, so the lock is only ever held for an O(1) append
/// or a short clone. Rings are never removed; a ring whose owner exited stays
/// listed with its alive flag cleared.
pub(crate) struct Registry {
    locked: AtomicBool,
    rings: UnsafeCell<Vec<&'static EventRing>>,
}

// SAFETY: `rings` is only accessed while `locked` is held (claimed with an
// acquire compare-exchange, released with a release store), which serializes
// every access.
unsafe impl Sync for Registry {}

pub(crate) static REGISTRY: Registry = Registry::new();

impl Registry {
    const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
            rings: UnsafeCell::new(Vec::new()),
        }
    }

    fn lock(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Append a newly created ring. Called at most once per thread.
    pub(crate) fn register(&self, ring: &'static EventRing) {
        self.lock();
        // SAFETY: the spinlock above is held.
        unsafe { (*self.rings.get()).push(ring) };
        self.unlock();
    }

    /// Copy the current ring list so the caller can iterate without holding
    /// the lock while new threads register.
    pub(crate) fn rings(&self) -> Vec<&'static EventRing> {
        self.lock();
        // SAFETY: the spinlock above is held.
        let rings = unsafe { (*self.rings.get()).clone() };
        self.unlock();
        rings
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::REGISTRY;
    use crate::ring::EventRing;

    #[test]
    fn concurrent_registrations_all_land() {
        let before = REGISTRY.rings().len();
        thread::scope(|s| {
            for i in 0..8u64 {
                s.spawn(move || {
                    let ring: &'static EventRing =
                        Box::leak(Box::new(EventRing::new(4, 1_000 + i)));
                    REGISTRY.register(ring);
                });
            }
        });
        // Other tests may register concurrently, so only a lower bound holds.
        let after = REGISTRY.rings().len();
        assert!(after >= before + 8, "expected at least 8 new rings");
    }
}
