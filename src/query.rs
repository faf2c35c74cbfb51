//! Query cache with stale-while-revalidate semantics and coalesced fetches.
//!
//! This module provides the [`QueryCache`] and the [`QueryHandle`] returned
//! by [`QueryCache::read`], similar to SWR or TanStack Query.
//!
//! # Design Pattern: Subscription-based State Management
//!
//! A read does not return data directly; it returns a handle that observes
//! the cached entry's state:
//!
//! 1. If fresh cached data exists, it's immediately visible and no fetch runs
//! 2. If data is stale or missing, a background fetch is triggered; stale
//!    data stays visible (marked `is_stale`) until the fetch settles
//! 3. Concurrent reads of the same key share one in-flight fetch
//! 4. Invalidating a key with active subscribers triggers exactly one refetch
//!
//! The cache is an explicitly owned instance: construct it, pass it (it's
//! cheaply cloneable) to whoever issues reads and mutations, and tear it
//! down with [`QueryCache::clear`]. There is no process-wide singleton.
//!
//! # Example
//!
//! ```rust,ignore
//! use roster::prelude::*;
//!
//! let cache = QueryCache::new();
//! let api = ApiClient::new("http://localhost:3000/api")?;
//!
//! let list = {
//!     let api = api.clone();
//!     cache.read(QueryKey::from(["users"]), move || api.list())
//! };
//! let mut list = list;
//! match list.settled().await {
//!     QueryState::Success { data, .. } => println!("{} users", data.len()),
//!     QueryState::Error(err) => eprintln!("load failed: {err}"),
//!     QueryState::Loading => unreachable!("settled() waits out loading"),
//! }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::debug;

use crate::cache::{Fetcher, Slot};
use crate::config::QueryConfig;
use crate::error::Error;
use crate::key::QueryKey;

/// The state of a cached query.
#[derive(Debug, Clone)]
pub enum QueryState<T> {
    /// Loading with nothing cached to show.
    Loading,
    /// Query succeeded with data.
    Success {
        /// The data returned by the last successful fetch.
        data: T,
        /// Whether a refetch is pending; the data shown is the previous value.
        is_stale: bool,
    },
    /// Query failed with an error.
    Error(Error),
}

impl<T> QueryState<T> {
    /// Returns the data if the query succeeded, otherwise `None`.
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Returns the error if the query failed, otherwise `None`.
    pub const fn error(&self) -> Option<&Error> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Returns `true` while loading with nothing cached.
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Returns `true` if the query succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns `true` if the query failed.
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns `true` if cached data is shown while a refetch is pending.
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Success { is_stale: true, .. })
    }

    /// Returns `true` once the query is neither loading nor refetching.
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Success { is_stale: false, .. } | Self::Error(_))
    }
}

/// In-memory cache of query results, keyed by [`QueryKey`].
///
/// Cloning is cheap; clones share the same entries. The cache tracks, per
/// key: status, staleness, at most one in-flight fetch, subscriber count,
/// and idle time for garbage collection.
#[derive(Clone)]
pub struct QueryCache {
    slots: Arc<DashMap<QueryKey, Slot>>,
    next_slot_id: Arc<AtomicU64>,
    config: QueryConfig,
}

impl QueryCache {
    /// Creates a cache with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(QueryConfig::default())
    }

    /// Creates a cache with the given configuration.
    #[must_use]
    pub fn with_config(config: QueryConfig) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            next_slot_id: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    /// The cache's configuration.
    #[must_use]
    pub const fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Subscribes to a key, fetching if there is no fresh entry.
    ///
    /// The fetcher registered by the first read of a key is reused for
    /// refetches triggered by staleness or [`invalidate`](Self::invalidate).
    ///
    /// Must be called from within a tokio runtime: fetches run on spawned
    /// tasks.
    pub fn read<T, F>(&self, key: QueryKey, fetch: F) -> QueryHandle<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> BoxFuture<'static, Result<T, Error>> + Send + Sync + 'static,
    {
        self.sweep();
        let fetcher: Fetcher<T> = Arc::new(fetch);

        let (rx, slot_id) = match self.slots.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if let Some(tx) = slot.state.downcast_ref::<watch::Sender<QueryState<T>>>() {
                    let rx = tx.subscribe();
                    slot.subscribers += 1;
                    slot.idle_since = None;
                    if !slot.in_flight && !slot.is_fresh(self.config.stale_time) {
                        slot.in_flight = true;
                        (slot.refetch)(self, &key, slot.generation);
                    }
                    (rx, slot.slot_id)
                } else {
                    // Same key reused with a different value type; the old
                    // entry cannot serve this read, so start over.
                    debug!(key = %key, "entry type changed, resetting");
                    let slot_id = self.next_slot_id.fetch_add(1, Ordering::Relaxed);
                    let (tx, rx) = watch::channel(QueryState::Loading);
                    let mut fresh = Slot::new(slot_id, tx, fetcher);
                    fresh.subscribers = 1;
                    fresh.in_flight = true;
                    *slot = fresh;
                    (slot.refetch)(self, &key, slot.generation);
                    (rx, slot_id)
                }
            }
            Entry::Vacant(vacant) => {
                let slot_id = self.next_slot_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = watch::channel(QueryState::Loading);
                let mut slot = Slot::new(slot_id, tx, fetcher);
                slot.subscribers = 1;
                slot.in_flight = true;
                let slot = vacant.insert(slot);
                (slot.refetch)(self, &key, slot.generation);
                (rx, slot_id)
            }
        };

        QueryHandle {
            key,
            rx,
            cache: self.clone(),
            slot_id,
        }
    }

    /// Marks the entry for `key` as stale. If the key has active subscribers
    /// and no fetch already in flight, a refetch starts immediately; the
    /// stale value keeps being served until it settles.
    pub fn invalidate(&self, key: &QueryKey) {
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.fetched_at = None;
            // A fetch already in flight was started before this invalidation;
            // bumping the generation makes its result settle as stale.
            slot.generation += 1;
            if slot.subscribers > 0 && !slot.in_flight {
                slot.in_flight = true;
                (slot.refetch)(self, key, slot.generation);
            }
            debug!(key = %key, subscribers = slot.subscribers, "invalidated");
        }
    }

    /// Evicts entries that have had zero subscribers for at least
    /// `cache_time`. Also runs automatically at the start of every read.
    pub fn gc(&self) {
        self.sweep();
    }

    /// Drops every entry. Live handles keep observing their last state but
    /// receive no further updates.
    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Number of cached entries, including unsubscribed ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Records the outcome of a finished fetch for `key`. Returns `false`
    /// when the fetch was superseded by an invalidation while in flight; the
    /// entry then stays stale regardless of the outcome.
    pub(crate) fn settle(&self, key: &QueryKey, fetched: bool, generation: u64) -> bool {
        let Some(mut slot) = self.slots.get_mut(key) else {
            return true;
        };
        slot.in_flight = false;
        let current = slot.generation == generation;
        // Failed or superseded fetches leave the entry stale so the next
        // read retries.
        slot.fetched_at = (current && fetched).then(Instant::now);
        current
    }

    /// Starts a refetch for a stale entry with active subscribers, unless one
    /// is already in flight. Called after a superseded fetch settles.
    pub(crate) fn revalidate(&self, key: &QueryKey) {
        if let Some(mut slot) = self.slots.get_mut(key) {
            if slot.subscribers > 0 && !slot.in_flight && slot.fetched_at.is_none() {
                slot.in_flight = true;
                (slot.refetch)(self, key, slot.generation);
            }
        }
    }

    pub(crate) fn unsubscribe(&self, key: &QueryKey, slot_id: u64) {
        if let Some(mut slot) = self.slots.get_mut(key) {
            // Handles from a slot that was since replaced must not touch the
            // replacement's count.
            if slot.slot_id != slot_id {
                return;
            }
            slot.subscribers = slot.subscribers.saturating_sub(1);
            if slot.subscribers == 0 {
                slot.idle_since = Some(Instant::now());
            }
        }
    }

    fn sweep(&self) {
        let cache_time = self.config.cache_time;
        self.slots.retain(|key, slot| {
            let expired = slot.expired(cache_time);
            if expired {
                debug!(key = %key, "evicted idle entry");
            }
            !expired
        });
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.slots.len())
            .field("config", &self.config)
            .finish()
    }
}

/// A live subscription to one cached query.
///
/// Dropping the handle unsubscribes; the entry stays cached until the
/// garbage-collection window elapses. A fetch that outlives its last
/// subscriber still updates the shared entry.
pub struct QueryHandle<T> {
    key: QueryKey,
    rx: watch::Receiver<QueryState<T>>,
    cache: QueryCache,
    slot_id: u64,
}

impl<T: Clone> QueryHandle<T> {
    /// The key this handle observes.
    #[must_use]
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// The entry's current state.
    #[must_use]
    pub fn state(&self) -> QueryState<T> {
        self.rx.borrow().clone()
    }

    /// The current data, fresh or stale, if any.
    #[must_use]
    pub fn data(&self) -> Option<T> {
        self.state().data().cloned()
    }

    /// Waits for the next state change and returns the new state. Returns
    /// the current state immediately if the cache was cleared.
    pub async fn changed(&mut self) -> QueryState<T> {
        let _ = self.rx.changed().await;
        self.state()
    }

    /// Waits until the query is settled: fresh `Success` or `Error`.
    pub async fn settled(&mut self) -> QueryState<T> {
        loop {
            let state = self.rx.borrow_and_update().clone();
            if state.is_settled() {
                return state;
            }
            if self.rx.changed().await.is_err() {
                // Sender gone (cache cleared); report what we last saw.
                return self.state();
            }
        }
    }
}

impl<T> Drop for QueryHandle<T> {
    fn drop(&mut self) {
        self.cache.unsubscribe(&self.key, self.slot_id);
    }
}

impl<T: fmt::Debug + Clone> fmt::Debug for QueryHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("key", &self.key)
            .field("state", &*self.rx.borrow())
            .finish()
    }
}
