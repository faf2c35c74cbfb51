use std::time::Duration;

/// Configuration for query behavior.
///
/// This controls how long queries treat cached data as fresh and when
/// unwatched entries are garbage collected.
#[derive(Debug, Clone, Copy)]
pub struct QueryConfig {
    /// How long data is considered fresh before becoming stale.
    ///
    /// While fresh, reads serve the cached value without refetching. Once
    /// stale, reads still serve the cached value immediately but trigger a
    /// background refetch.
    pub stale_time: Duration,

    /// How long an entry with zero subscribers is retained before eviction.
    ///
    /// A read after eviction behaves like a first load.
    pub cache_time: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(5 * 60),
            cache_time: Duration::from_secs(10 * 60),
        }
    }
}

impl QueryConfig {
    /// Creates a new query configuration with the given stale and cache times.
    #[must_use]
    pub const fn new(stale_time: Duration, cache_time: Duration) -> Self {
        Self {
            stale_time,
            cache_time,
        }
    }
}
