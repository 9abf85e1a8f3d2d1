//! Profiler tuning knobs.

use std::{sync::OnceLock, time::Duration};

/// Tuning knobs for the profiler.
///
/// Install with [`configure`](crate::configure) before the first scope is
/// recorded; the first installation wins and later calls are ignored, as are
/// calls made after the defaults were already picked up.
#[derive(Clone, Debug)]
pub struct ProfilerConfig {
    /// Per-thread ring capacity in slots. One slot stays vacant, so a ring
    /// holds `ring_capacity - 1` events between collector passes.
    pub ring_capacity: usize,
    /// Period of the collector thread's drain pass.
    pub collect_interval: Duration,
    /// Minimum interval between rolling-average refreshes and snapshot
    /// rebuilds.
    pub refresh_interval: Duration,
    /// Entries that received no event for this long are evicted.
    pub stale_after: Duration,
    /// Scopes longer than this many milliseconds are logged as slow.
    pub slow_scope_ms: f64,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 1024,
            collect_interval: Duration::from_millis(16),
            refresh_interval: Duration::from_millis(250),
            stale_after: Duration::from_secs(5),
            slow_scope_ms: 100.0,
        }
    }
}

static CONFIG: OnceLock<ProfilerConfig> = OnceLock::new();

/// Install a config. Returns `false` if one was already in effect.
pub(crate) fn install(config: ProfilerConfig) -> bool {
    CONFIG.set(config).is_ok()
}

pub(crate) fn get() -> &'static ProfilerConfig {
    CONFIG.get_or_init(ProfilerConfig::default)
}
