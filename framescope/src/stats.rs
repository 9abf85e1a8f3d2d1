//! Aggregated per-section statistics and the per-frame derivation passes.
//!
//! Everything here operates on a single thread-class map at a time and runs
//! on the collector thread only. Entries are keyed by section name alone: a
//! name recorded under two different parents keeps its most recently observed
//! parent, trading call-site fidelity for a compact display tree.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::event::ScopeEvent;

pub(crate) type SectionMap = FxHashMap<&'static str, SectionEntry>;

/// Aggregated state for one section name within one thread-class map.
#[derive(Debug)]
pub(crate) struct SectionEntry {
    /// Most recently observed parent name.
    pub parent: Option<&'static str>,
    /// Distinct child names in first-observation order.
    pub children: Vec<&'static str>,
    /// Current-frame total, refilled by drains, zeroed by the frame pass.
    pub frame_ms: f64,
    /// Current-frame call count.
    pub frame_calls: u32,
    /// Longest single call observed in the current rolling window.
    pub window_max_ms: f64,
    /// Self time derived by the most recent frame pass.
    pub self_ms: f64,
    /// Share of the group total, derived by the most recent pass.
    pub total_pct: f64,
    /// Share of the parent's total, derived by the most recent frame pass.
    pub parent_pct: f64,
    /// Rolling-window accumulated total time.
    pub acc_ms: f64,
    /// Rolling-window accumulated self time.
    pub acc_self_ms: f64,
    /// Rolling-window accumulated call count.
    pub acc_calls: u64,
    /// Frames contributing to the rolling window.
    pub acc_frames: u32,
    /// Rolling-average time per frame.
    pub avg_ms: f64,
    /// Rolling-average self time per frame.
    pub avg_self_ms: f64,
    /// Rolling-average calls per frame.
    pub avg_calls: f64,
    /// Longest single call in the last closed window.
    pub max_ms: f64,
    /// Staleness clock; entries untouched for too long are evicted.
    pub last_update: Instant,
}

impl SectionEntry {
    fn new(now: Instant) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            frame_ms: 0.0,
            frame_calls: 0,
            window_max_ms: 0.0,
            self_ms: 0.0,
            total_pct: 0.0,
            parent_pct: 0.0,
            acc_ms: 0.0,
            acc_self_ms: 0.0,
            acc_calls: 0,
            acc_frames: 0,
            avg_ms: 0.0,
            avg_self_ms: 0.0,
            avg_calls: 0.0,
            max_ms: 0.0,
            last_update: now,
        }
    }

    /// Whether this entry is a display root within `map`.
    pub(crate) fn is_root(&self, map: &SectionMap) -> bool {
        self.parent.is_none_or(|parent| !map.contains_key(parent))
    }
}

/// Fold one drained event into its map.
///
/// Create-if-missing on both the entry and its parent; a parent entry created
/// here is timestamped so it survives until its own events arrive.
pub(crate) fn fold_event(map: &mut SectionMap, event: &ScopeEvent, now: Instant) {
    debug_assert!(event.duration_ms >= 0.0);
    debug_assert_eq!(event.parent.is_none(), event.depth == 0);

    let entry = map
        .entry(event.name)
        .or_insert_with(|| SectionEntry::new(now));
    entry.frame_ms += event.duration_ms;
    entry.frame_calls += 1;
    entry.window_max_ms = entry.window_max_ms.max(event.duration_ms);
    entry.parent = event.parent;
    entry.last_update = now;

    if let Some(parent) = event.parent {
        let parent_entry = map.entry(parent).or_insert_with(|| SectionEntry::new(now));
        if !parent_entry.children.contains(&event.name) {
            parent_entry.children.push(event.name);
        }
    }
}

/// Derive self time and percentages for every entry in the map.
///
/// Self time is the entry's frame total minus the frame totals of its
/// recorded children, clamped at zero (a child drained in a different frame
/// than its parent can otherwise push the difference negative). The group
/// total is the sum of root-entry frame totals; entries whose parent is
/// missing from the map count as roots.
pub(crate) fn compute_hierarchy(map: &mut SectionMap) {
    let names: Vec<&'static str> = map.keys().copied().collect();

    for &name in &names {
        let children = match map.get(name) {
            Some(entry) => entry.children.clone(),
            None => continue,
        };
        let children_ms: f64 = children
            .iter()
            .filter_map(|child| map.get(child))
            .map(|child| child.frame_ms)
            .sum();
        if let Some(entry) = map.get_mut(name) {
            entry.self_ms = (entry.frame_ms - children_ms).max(0.0);
        }
    }

    let group_total: f64 = map
        .iter()
        .filter(|(_, entry)| entry.is_root(map))
        .map(|(_, entry)| entry.frame_ms)
        .sum();

    for &name in &names {
        let (frame_ms, parent) = match map.get(name) {
            Some(entry) => (entry.frame_ms, entry.parent),
            None => continue,
        };
        let parent_ms = parent.and_then(|parent| map.get(parent)).map(|p| p.frame_ms);
        let total_pct = if group_total > 0.0 {
            (100.0 * frame_ms / group_total).clamp(0.0, 100.0)
        } else {
            0.0
        };
        let parent_pct = match parent_ms {
            Some(ms) if ms > 0.0 => (100.0 * frame_ms / ms).clamp(0.0, 100.0),
            _ => total_pct,
        };
        if let Some(entry) = map.get_mut(name) {
            entry.total_pct = total_pct;
            entry.parent_pct = parent_pct;
        }
    }
}

/// Accumulate the frame's totals into the rolling window and reset the frame
/// accumulators for the next frame's drains.
pub(crate) fn accumulate_frame(map: &mut SectionMap) {
    for entry in map.values_mut() {
        entry.acc_ms += entry.frame_ms;
        entry.acc_self_ms += entry.self_ms;
        entry.acc_calls += u64::from(entry.frame_calls);
        entry.acc_frames += 1;
        entry.frame_ms = 0.0;
        entry.frame_calls = 0;
    }
}

/// Drop entries that received no event within `stale_after`.
pub(crate) fn evict_stale(map: &mut SectionMap, now: Instant, stale_after: Duration) {
    map.retain(|_, entry| now.duration_since(entry.last_update) <= stale_after);
}

/// Recompute rolling averages from the accumulated window, restart the
/// window, and rebase total-relative percentages on the group's rolling
/// total.
pub(crate) fn refresh_rolling(map: &mut SectionMap) {
    for entry in map.values_mut() {
        if entry.acc_frames > 0 {
            let frames = f64::from(entry.acc_frames);
            entry.avg_ms = entry.acc_ms / frames;
            entry.avg_self_ms = entry.acc_self_ms / frames;
            entry.avg_calls = entry.acc_calls as f64 / frames;
        } else {
            entry.avg_ms = 0.0;
            entry.avg_self_ms = 0.0;
            entry.avg_calls = 0.0;
        }
        entry.acc_ms = 0.0;
        entry.acc_self_ms = 0.0;
        entry.acc_calls = 0;
        entry.acc_frames = 0;
        entry.max_ms = entry.window_max_ms;
        entry.window_max_ms = 0.0;
    }

    let group_total: f64 = map
        .iter()
        .filter(|(_, entry)| entry.is_root(map))
        .map(|(_, entry)| entry.avg_ms)
        .sum();
    for entry in map.values_mut() {
        entry.total_pct = if group_total > 0.0 {
            (100.0 * entry.avg_ms / group_total).clamp(0.0, 100.0)
        } else {
            0.0
        };
    }
}
