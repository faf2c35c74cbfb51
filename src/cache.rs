//! Internal cache entry machinery: per-key slots, refetch triggering, and
//! the read retry policy.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::Error;
use crate::key::QueryKey;
use crate::query::{QueryCache, QueryState};

/// Fetch function registered for a query key.
pub(crate) type Fetcher<T> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<T, Error>> + Send + Sync>;

/// Type-erased refetch trigger stored alongside each slot.
///
/// The closure captures the slot's typed watch sender and fetcher, so
/// [`QueryCache::invalidate`] can trigger a refetch without knowing the
/// entry's value type. It receives the cache by reference and only clones it
/// into the spawned task, so slots do not keep the cache alive. The `u64` is
/// the slot's invalidation generation at trigger time; a fetch that was
/// superseded by the time it settles has its result marked stale.
pub(crate) type Refetch = Box<dyn Fn(&QueryCache, &QueryKey, u64) + Send + Sync>;

/// One cache entry. Metadata lives here, guarded by the map; the entry's
/// state is published through the watch channel stored (type-erased) in
/// `state`.
pub(crate) struct Slot {
    /// Unique per slot instance. Handles remember it so a handle from a
    /// replaced slot cannot touch its successor's subscriber count.
    pub(crate) slot_id: u64,
    /// `watch::Sender<QueryState<T>>` behind `Any`, downcast on read.
    pub(crate) state: Box<dyn Any + Send + Sync>,
    pub(crate) refetch: Refetch,
    /// When the last successful fetch settled. `None` means stale.
    pub(crate) fetched_at: Option<Instant>,
    pub(crate) in_flight: bool,
    /// Bumped by every invalidation, so a fetch that settles can tell
    /// whether an invalidation arrived while it was in flight.
    pub(crate) generation: u64,
    pub(crate) subscribers: usize,
    /// Set when the subscriber count drops to zero; drives eviction.
    pub(crate) idle_since: Option<Instant>,
}

impl Slot {
    pub(crate) fn new<T>(slot_id: u64, tx: watch::Sender<QueryState<T>>, fetcher: Fetcher<T>) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self {
            slot_id,
            state: Box::new(tx.clone()),
            refetch: make_refetch(tx, fetcher),
            fetched_at: None,
            in_flight: false,
            generation: 0,
            subscribers: 0,
            idle_since: None,
        }
    }

    pub(crate) fn is_fresh(&self, stale_time: Duration) -> bool {
        self.fetched_at
            .map_or(false, |at| at.elapsed() < stale_time)
    }

    pub(crate) fn expired(&self, cache_time: Duration) -> bool {
        self.subscribers == 0
            && self
                .idle_since
                .map_or(false, |at| at.elapsed() >= cache_time)
    }
}

fn make_refetch<T>(tx: watch::Sender<QueryState<T>>, fetcher: Fetcher<T>) -> Refetch
where
    T: Clone + Send + Sync + 'static,
{
    Box::new(move |cache, key, generation| {
        // Keep stale data visible while the refetch runs; only a load with
        // nothing cached shows Loading.
        tx.send_modify(|state| match state {
            QueryState::Success { is_stale, .. } => *is_stale = true,
            other => *other = QueryState::Loading,
        });

        let cache = cache.clone();
        let key = key.clone();
        let tx = tx.clone();
        let fetcher = Arc::clone(&fetcher);
        tokio::spawn(async move {
            // The fetch runs on its own task so a panicking fetcher still
            // settles the slot instead of wedging it in flight.
            let outcome =
                tokio::spawn(async move { fetch_with_retry(fetcher.as_ref()).await }).await;
            let result = outcome
                .unwrap_or_else(|err| Err(Error::Transport(format!("fetch task failed: {err}"))));
            let current = cache.settle(&key, result.is_ok(), generation);
            match result {
                Ok(data) => {
                    debug!(key = %key, superseded = !current, "fetch settled");
                    // A fetch superseded by an invalidation mid-flight still
                    // publishes its data, but as stale.
                    let _ = tx.send_replace(QueryState::Success {
                        data,
                        is_stale: !current,
                    });
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "fetch failed");
                    let _ = tx.send_replace(QueryState::Error(err));
                }
            }
            if !current {
                cache.revalidate(&key);
            }
        });
    })
}

/// Runs a fetch, retrying exactly once on transport failure. API and
/// validation errors are returned as-is.
pub(crate) async fn fetch_with_retry<T>(
    fetcher: &(dyn Fn() -> BoxFuture<'static, Result<T, Error>> + Send + Sync),
) -> Result<T, Error> {
    match fetcher().await {
        Err(err) if err.is_transport() => {
            debug!(error = %err, "transport failure, retrying once");
            fetcher().await
        }
        other => other,
    }
}
