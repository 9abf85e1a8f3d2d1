//! Completed-interval records exchanged between recorders and the collector.

/// An immutable record of one completed timed interval.
///
/// Produced by a dropping [`ScopeGuard`](crate::ScopeGuard) on the recording
/// thread and consumed exactly once by the collector. Section names are
/// `&'static str`: instrumentation sites name their scopes with literals, so
/// an event never owns an allocation and is `Copy`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ScopeEvent {
    /// Section name.
    pub name: &'static str,
    /// Name of the enclosing section, if any.
    pub parent: Option<&'static str>,
    /// Wall time spent in the section, fractional milliseconds. Never
    /// negative.
    pub duration_ms: f64,
    /// Profiler-assigned id of the recording thread.
    pub thread_id: u64,
    /// Nesting depth at scope entry (0 = top-level). `depth == 0` exactly
    /// when `parent` is `None`.
    pub depth: u16,
    /// Whether the recording thread was marked primary.
    pub primary: bool,
}

impl ScopeEvent {
    /// Placeholder used to initialize ring slots.
    pub(crate) const EMPTY: Self = Self {
        name: "",
        parent: None,
        duration_ms: 0.0,
        thread_id: 0,
        depth: 0,
        primary: false,
    };
}
