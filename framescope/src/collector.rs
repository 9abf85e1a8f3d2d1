//! The single consumer: drains rings, derives statistics, publishes
//! snapshots.
//!
//! Exactly one collector thread runs the pipeline on a fixed period. The
//! host's hot path only ever bumps an atomic frame counter; all aggregation
//! work happens here.

use std::{
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::Instant,
};

use parking_lot::RwLock;
use tracing::error;

use crate::{
    config, recorder,
    registry::REGISTRY,
    ring::EventRing,
    snapshot::{Snapshot, build_tree},
    stats::{self, SectionMap},
};

/// Frames completed by the host since startup. [`end_frame`] bumps it; the
/// collector runs a frame pass when it observes an advance.
static FRAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Set by [`clear`]; the collector wipes its maps at the top of its next
/// pass.
static CLEAR_PENDING: AtomicBool = AtomicBool::new(false);

/// Cooperative stop flag for the collector thread.
static STOP: AtomicBool = AtomicBool::new(false);

static PUBLISHED: OnceLock<RwLock<Arc<Snapshot>>> = OnceLock::new();

fn published() -> &'static RwLock<Arc<Snapshot>> {
    PUBLISHED.get_or_init(|| RwLock::new(Arc::new(Snapshot::default())))
}

/// Read the most recently published snapshot.
///
/// Safe from any thread; the lock is held only for the `Arc` clone, and the
/// returned snapshot is never mutated in place.
pub fn snapshot() -> Arc<Snapshot> {
    published().read().clone()
}

fn publish(snapshot: Snapshot) {
    *published().write() = Arc::new(snapshot);
}

/// Mark a frame boundary.
///
/// Called once per frame by the host's main loop. Does no aggregation work
/// itself; it bumps a counter and lazily starts the collector thread. A
/// no-op while profiling is disabled.
pub fn end_frame() {
    if !recorder::is_enabled() {
        return;
    }
    mark_frame();
    ensure_collector();
}

/// Bump the frame counter without touching the collector thread.
pub(crate) fn mark_frame() {
    FRAME_COUNTER.fetch_add(1, Ordering::Release);
}

/// Ask the collector thread to exit after its current pass.
///
/// Events recorded after the final drain are never processed; that loss is
/// part of the shutdown contract. The collector cannot be restarted within
/// the same process.
pub fn shutdown() {
    STOP.store(true, Ordering::Release);
}

/// Reset every ring, both aggregated maps, and the published snapshot.
///
/// Pending ring events are discarded immediately and an empty snapshot is
/// published; the aggregated maps are wiped by the collector at the top of
/// its next pass. The display will briefly show an empty tree.
pub fn clear() {
    for ring in REGISTRY.rings() {
        ring.discard_pending();
    }
    CLEAR_PENDING.store(true, Ordering::Release);
    publish(Snapshot::default());
}

static COLLECTOR: OnceLock<()> = OnceLock::new();

fn ensure_collector() {
    COLLECTOR.get_or_init(|| {
        let spawned = thread::Builder::new()
            .name("framescope-collector".to_string())
            .spawn(collector_loop);
        if let Err(err) = spawned {
            error!("framescope failed to spawn collector thread: {err}");
        }
    });
}

fn collector_loop() {
    let mut collector = Collector::new();
    let interval = config::get().collect_interval;
    while !STOP.load(Ordering::Acquire) {
        collector.run_pass(Instant::now());
        thread::sleep(interval);
    }
}

/// The aggregation pipeline state, owned by the collector thread.
///
/// Kept separate from the thread loop so tests can drive passes
/// deterministically.
pub(crate) struct Collector {
    pub(crate) primary: SectionMap,
    pub(crate) workers: SectionMap,
    last_frame: u64,
    last_refresh: Instant,
}

impl Collector {
    pub(crate) fn new() -> Self {
        Self {
            primary: SectionMap::default(),
            workers: SectionMap::default(),
            last_frame: FRAME_COUNTER.load(Ordering::Acquire),
            last_refresh: Instant::now(),
        }
    }

    /// One collector tick: clear request, drain, frame pass, throttled
    /// refresh. Frozen entirely (except the clear request) while profiling
    /// is disabled.
    pub(crate) fn run_pass(&mut self, now: Instant) {
        if CLEAR_PENDING.swap(false, Ordering::AcqRel) {
            self.primary.clear();
            self.workers.clear();
        }
        if !recorder::is_enabled() {
            return;
        }
        self.drain(now);
        let frame = FRAME_COUNTER.load(Ordering::Acquire);
        if frame != self.last_frame {
            self.last_frame = frame;
            self.frame_pass(now);
        }
        if now.duration_since(self.last_refresh) >= config::get().refresh_interval {
            self.last_refresh = now;
            self.refresh();
        }
    }

    /// Consume every available event from every registered ring.
    ///
    /// A retired ring can still hold events written before its thread
    /// exited; those are drained, after which the empty dead ring is
    /// skipped without touching its cursors.
    pub(crate) fn drain(&mut self, now: Instant) {
        for ring in REGISTRY.rings() {
            if !ring.is_alive() && ring.is_empty() {
                continue;
            }
            self.drain_ring(ring, now);
        }
    }

    pub(crate) fn drain_ring(&mut self, ring: &EventRing, now: Instant) {
        while let Some(event) = ring.pop() {
            let map = if event.primary {
                &mut self.primary
            } else {
                &mut self.workers
            };
            stats::fold_event(map, &event, now);
        }
    }

    /// Frame-boundary derivation: hierarchy, rolling accumulation, eviction.
    pub(crate) fn frame_pass(&mut self, now: Instant) {
        let stale_after = config::get().stale_after;
        for map in [&mut self.primary, &mut self.workers] {
            stats::compute_hierarchy(map);
            stats::accumulate_frame(map);
            stats::evict_stale(map, now, stale_after);
        }
    }

    /// Recompute rolling averages and publish a fresh display snapshot.
    pub(crate) fn refresh(&mut self) {
        stats::refresh_rolling(&mut self.primary);
        stats::refresh_rolling(&mut self.workers);
        let dropped: u64 = REGISTRY.rings().iter().map(|ring| ring.dropped()).sum();
        publish(Snapshot {
            primary: build_tree(&self.primary),
            workers: build_tree(&self.workers),
            dropped_events: dropped,
        });
    }
}
