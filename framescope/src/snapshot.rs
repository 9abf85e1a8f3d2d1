//! Immutable display snapshots and the ordered tree builder.

use rustc_hash::FxHashSet;

use crate::stats::SectionMap;

/// One row of the display tree.
#[derive(Clone, Debug)]
pub struct SectionStats {
    /// Section name.
    pub name: &'static str,
    /// Most recently observed parent, if any.
    pub parent: Option<&'static str>,
    /// Depth in the rebuilt display tree (0 = root), for indentation.
    pub depth: usize,
    /// Rolling-average time per frame, milliseconds.
    pub avg_ms: f64,
    /// Rolling-average self time per frame, milliseconds.
    pub avg_self_ms: f64,
    /// Rolling-average call count per frame.
    pub avg_calls: f64,
    /// Share of the thread-class group's rolling total, percent.
    pub total_pct: f64,
    /// Share of the parent's time, percent; equals `total_pct` for roots.
    pub parent_pct: f64,
    /// Longest single call in the last rolling window, milliseconds.
    pub max_ms: f64,
}

/// Immutable, wholesale-replaced view of both thread-class groups.
///
/// Rows are ordered parent-before-children with siblings sorted by
/// descending rolling time, so a renderer can print an indented tree in one
/// linear pass over each sequence.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// Sections recorded by the primary thread.
    pub primary: Vec<SectionStats>,
    /// Sections recorded by every other thread.
    pub workers: Vec<SectionStats>,
    /// Events lost to full rings since startup.
    pub dropped_events: u64,
}

/// Flatten one thread-class map into display order.
pub(crate) fn build_tree(map: &SectionMap) -> Vec<SectionStats> {
    let mut roots: Vec<&'static str> = map
        .iter()
        .filter(|(_, entry)| entry.is_root(map))
        .map(|(name, _)| *name)
        .collect();
    sort_by_avg_desc(&mut roots, map);

    let mut rows = Vec::with_capacity(map.len());
    let mut emitted = FxHashSet::default();
    for root in roots {
        emit(map, root, 0, &mut rows, &mut emitted);
    }
    rows
}

fn sort_by_avg_desc(names: &mut [&'static str], map: &SectionMap) {
    names.sort_by(|a, b| {
        let a_ms = map.get(*a).map_or(0.0, |entry| entry.avg_ms);
        let b_ms = map.get(*b).map_or(0.0, |entry| entry.avg_ms);
        b_ms.partial_cmp(&a_ms).unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn emit(
    map: &SectionMap,
    name: &'static str,
    depth: usize,
    rows: &mut Vec<SectionStats>,
    emitted: &mut FxHashSet<&'static str>,
) {
    // A name can linger in a stale child list after being re-parented; the
    // set keeps every name to a single row and breaks re-parenting cycles.
    if !emitted.insert(name) {
        return;
    }
    let Some(entry) = map.get(name) else { return };
    rows.push(SectionStats {
        name,
        parent: entry.parent,
        depth,
        avg_ms: entry.avg_ms,
        avg_self_ms: entry.avg_self_ms,
        avg_calls: entry.avg_calls,
        total_pct: entry.total_pct,
        parent_pct: entry.parent_pct,
        max_ms: entry.max_ms,
    });

    let mut children = entry.children.clone();
    sort_by_avg_desc(&mut children, map);
    for child in children {
        // Recurse only into children that still claim this parent.
        if map
            .get(child)
            .is_some_and(|entry| entry.parent == Some(name))
        {
            emit(map, child, depth + 1, rows, emitted);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::{event::ScopeEvent, stats};

    fn fold(map: &mut SectionMap, name: &'static str, parent: Option<&'static str>, ms: f64) {
        let event = ScopeEvent {
            name,
            parent,
            duration_ms: ms,
            thread_id: 0,
            depth: u16::from(parent.is_some()),
            primary: false,
        };
        stats::fold_event(map, &event, Instant::now());
    }

    /// Run a full frame so rolling averages reflect the folded times.
    fn close_window(map: &mut SectionMap) {
        stats::compute_hierarchy(map);
        stats::accumulate_frame(map);
        stats::refresh_rolling(map);
    }

    #[test]
    fn rows_come_out_parent_first_and_time_sorted() {
        let mut map = SectionMap::default();
        fold(&mut map, "frame", None, 16.0);
        fold(&mut map, "render", Some("frame"), 9.0);
        fold(&mut map, "simulation", Some("frame"), 5.0);
        fold(&mut map, "collision", Some("simulation"), 3.0);
        fold(&mut map, "io", None, 1.0);
        close_window(&mut map);

        let rows = build_tree(&map);
        let names: Vec<&str> = rows.iter().map(|row| row.name).collect();
        assert_eq!(
            names,
            vec!["frame", "render", "simulation", "collision", "io"]
        );

        let depths: Vec<usize> = rows.iter().map(|row| row.depth).collect();
        assert_eq!(depths, vec![0, 1, 1, 2, 0]);
    }

    #[test]
    fn reparented_name_appears_exactly_once() {
        let mut map = SectionMap::default();
        fold(&mut map, "old_parent", None, 10.0);
        fold(&mut map, "shared", Some("old_parent"), 2.0);
        // The same name later shows up under a different parent; the stale
        // child list on old_parent must not duplicate it.
        fold(&mut map, "new_parent", None, 8.0);
        fold(&mut map, "shared", Some("new_parent"), 2.0);
        close_window(&mut map);

        let rows = build_tree(&map);
        let shared_rows = rows.iter().filter(|row| row.name == "shared").count();
        assert_eq!(shared_rows, 1);
        let shared = rows
            .iter()
            .find(|row| row.name == "shared")
            .expect("shared row");
        assert_eq!(shared.parent, Some("new_parent"));
        assert_eq!(shared.depth, 1);
    }

    #[test]
    fn empty_map_builds_an_empty_tree() {
        let map = SectionMap::default();
        assert!(build_tree(&map).is_empty());
    }
}
