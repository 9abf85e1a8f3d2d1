//! Producer side: thread-local rings, call stacks, and the RAII scope guard.

use std::{
    cell::RefCell,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Instant,
};

use smallvec::SmallVec;
use tracing::warn;

use crate::{config, event::ScopeEvent, registry::REGISTRY, ring::EventRing};

/// Global switch. Recorders read it once per scope entry; the rest of the
/// pipeline freezes while it is off.
static ENABLED: AtomicBool = AtomicBool::new(false);

/// Monotonic id handed to each recording thread on first use.
static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(0);

/// Turn profiling on or off globally.
///
/// While off, [`scope`] takes no timestamp and records nothing, and the
/// collector leaves previously aggregated entries frozen: they neither
/// advance nor get evicted until re-enabled or [`clear`](crate::clear)ed.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

/// Whether profiling is currently enabled.
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Per-thread recorder state: the leaked, registered ring plus the stack of
/// in-flight section names. Created lazily on the first recorded scope.
struct LocalRecorder {
    ring: &'static EventRing,
    stack: RefCell<SmallVec<[&'static str; 16]>>,
}

impl LocalRecorder {
    fn new() -> Self {
        let thread_id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        let ring: &'static EventRing = Box::leak(Box::new(EventRing::new(
            config::get().ring_capacity,
            thread_id,
        )));
        REGISTRY.register(ring);
        Self {
            ring,
            stack: RefCell::new(SmallVec::new()),
        }
    }
}

impl Drop for LocalRecorder {
    fn drop(&mut self) {
        // TLS teardown: the ring stays allocated but goes inert, so the
        // collector drains what was written and then skips it.
        self.ring.retire();
    }
}

thread_local! {
    static RECORDER: LocalRecorder = LocalRecorder::new();
}

/// Classify the calling thread into the primary display bucket.
///
/// Called once by the thread whose timings should be grouped separately from
/// the worker pool, typically the render/main-loop thread. Events recorded
/// by this thread land in [`Snapshot::primary`](crate::Snapshot::primary).
pub fn mark_thread_primary() {
    RECORDER.with(|recorder| recorder.ring.mark_primary());
}

/// RAII guard for one timed scope. Created by [`scope`]; records the interval
/// when dropped, on every exit path.
#[must_use = "dropping the guard immediately ends the scope; bind it with `let _scope = ...`"]
pub struct ScopeGuard {
    name: &'static str,
    /// `None` when profiling was disabled at entry; `Drop` is then a no-op.
    start: Option<Instant>,
}

/// Begin a named scope on the calling thread.
///
/// The returned guard submits a completed-interval event to this thread's
/// ring when it drops. Near-zero cost while profiling is disabled: no
/// timestamp is taken and the guard does nothing.
///
/// # Examples
///
/// ```
/// fn simulate() {
///     let _scope = framescope::scope("simulation");
///     // ... work ...
/// }
/// ```
pub fn scope(name: &'static str) -> ScopeGuard {
    if !is_enabled() {
        return ScopeGuard { name, start: None };
    }
    let pushed = RECORDER
        .try_with(|recorder| recorder.stack.borrow_mut().push(name))
        .is_ok();
    if !pushed {
        // TLS already torn down; nothing to attribute the scope to.
        return ScopeGuard { name, start: None };
    }
    ScopeGuard {
        name,
        start: Some(Instant::now()),
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let Some(start) = self.start else { return };
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        if duration_ms > config::get().slow_scope_ms {
            warn!("slow scope '{}' took {duration_ms:.1}ms", self.name);
        }
        let _ = RECORDER.try_with(|recorder| {
            let (parent, depth) = {
                let mut stack = recorder.stack.borrow_mut();
                let popped = stack.pop();
                debug_assert!(
                    popped.is_some(),
                    "scope guard dropped with an empty call stack"
                );
                (stack.last().copied(), stack.len() as u16)
            };
            recorder.ring.push(ScopeEvent {
                name: self.name,
                parent,
                duration_ms,
                thread_id: recorder.ring.thread_id(),
                depth,
                primary: recorder.ring.is_primary(),
            });
        });
    }
}
