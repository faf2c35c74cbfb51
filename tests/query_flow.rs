//! End-to-end behavior of the query cache: coalescing, staleness,
//! invalidation, retry, and garbage collection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::sleep;

use roster::error::Error;
use roster::key::QueryKey;
use roster::mutation::Mutation;
use roster::prelude::{QueryCache, QueryConfig};

/// Fetcher that counts its calls and takes a moment to resolve, so tests can
/// observe the in-flight window.
fn slow_counting_fetcher(
    calls: Arc<AtomicUsize>,
) -> impl Fn() -> BoxFuture<'static, Result<u32, Error>> + Send + Sync + 'static {
    move || {
        let n = calls.fetch_add(1, Ordering::SeqCst) as u32;
        Box::pin(async move {
            sleep(Duration::from_millis(30)).await;
            Ok(n + 1)
        })
    }
}

fn fresh_config() -> QueryConfig {
    QueryConfig::new(Duration::from_secs(60), Duration::from_secs(60))
}

#[tokio::test]
async fn concurrent_reads_share_one_fetch() {
    let cache = QueryCache::with_config(fresh_config());
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::from(["users"]);

    let mut first = cache.read(key.clone(), slow_counting_fetcher(calls.clone()));
    let mut second = cache.read(key.clone(), slow_counting_fetcher(calls.clone()));
    let mut third = cache.read(key, slow_counting_fetcher(calls.clone()));

    let (a, b, c) = (
        first.settled().await,
        second.settled().await,
        third.settled().await,
    );
    assert_eq!(a.data(), Some(&1));
    assert_eq!(b.data(), Some(&1));
    assert_eq!(c.data(), Some(&1));
    assert_eq!(
        calls.load(Ordering::SeqCst),
        1,
        "concurrent reads must coalesce onto one fetch"
    );
}

#[tokio::test]
async fn stale_entry_serves_cached_value_while_refetching() {
    // Zero stale time: everything is stale the moment it lands.
    let cache = QueryCache::with_config(QueryConfig::new(Duration::ZERO, Duration::from_secs(60)));
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::from(["users"]);

    let mut first = cache.read(key.clone(), slow_counting_fetcher(calls.clone()));
    first.settled().await;
    drop(first);

    let mut second = cache.read(key, slow_counting_fetcher(calls.clone()));
    let state = second.state();
    assert_eq!(
        state.data(),
        Some(&1),
        "stale value is served immediately, not blocked on the refetch"
    );
    assert!(state.is_stale());

    let state = second.settled().await;
    assert_eq!(state.data(), Some(&2));
    assert!(!state.is_stale());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invalidate_with_subscriber_triggers_exactly_one_refetch() {
    let cache = QueryCache::with_config(fresh_config());
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::from(["users"]);

    let mut handle = cache.read(key.clone(), slow_counting_fetcher(calls.clone()));
    handle.settled().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    cache.invalidate(&key);

    let state = handle.state();
    assert_eq!(state.data(), Some(&1), "stale data stays visible");
    assert!(state.is_stale());

    let state = handle.settled().await;
    assert_eq!(state.data(), Some(&2));
    assert_eq!(
        calls.load(Ordering::SeqCst),
        2,
        "one invalidation issues one refetch"
    );
}

#[tokio::test]
async fn invalidate_during_inflight_fetch_supersedes_its_result() {
    let cache = QueryCache::with_config(fresh_config());
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::from(["users"]);

    let mut handle = cache.read(key.clone(), slow_counting_fetcher(calls.clone()));
    // The fetch is in flight; its result predates this invalidation and must
    // not settle the entry as fresh.
    cache.invalidate(&key);

    let state = handle.settled().await;
    assert_eq!(state.data(), Some(&2), "the follow-up refetch wins");
    assert_eq!(
        calls.load(Ordering::SeqCst),
        2,
        "the superseded fetch is followed by exactly one refetch"
    );
}

#[tokio::test]
async fn repeated_invalidation_during_flight_coalesces_into_one_followup() {
    let cache = QueryCache::with_config(fresh_config());
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::from(["users"]);

    let mut handle = cache.read(key.clone(), slow_counting_fetcher(calls.clone()));
    cache.invalidate(&key);
    cache.invalidate(&key);

    handle.settled().await;
    sleep(Duration::from_millis(60)).await;
    assert_eq!(
        calls.load(Ordering::SeqCst),
        2,
        "invalidations during the flight collapse into one follow-up refetch"
    );
}

#[tokio::test]
async fn invalidate_during_flight_without_subscribers_leaves_entry_stale() {
    let cache = QueryCache::with_config(fresh_config());
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::from(["users"]);

    let handle = cache.read(key.clone(), slow_counting_fetcher(calls.clone()));
    cache.invalidate(&key);
    drop(handle);

    // The superseded fetch settles but nobody is watching: no follow-up.
    sleep(Duration::from_millis(60)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The entry stayed stale, so the next read refetches.
    let mut handle = cache.read(key, slow_counting_fetcher(calls.clone()));
    let state = handle.settled().await;
    assert_eq!(state.data(), Some(&2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invalidate_without_subscribers_only_marks_stale() {
    let cache = QueryCache::with_config(fresh_config());
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::from(["users"]);

    let mut handle = cache.read(key.clone(), slow_counting_fetcher(calls.clone()));
    handle.settled().await;
    drop(handle);

    cache.invalidate(&key);
    sleep(Duration::from_millis(60)).await;
    assert_eq!(
        calls.load(Ordering::SeqCst),
        1,
        "no refetch without subscribers"
    );

    // The next read sees a stale entry and refetches.
    let mut handle = cache.read(key, slow_counting_fetcher(calls.clone()));
    handle.settled().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn reads_on_different_keys_are_independent() {
    let cache = QueryCache::with_config(fresh_config());
    let users_calls = Arc::new(AtomicUsize::new(0));
    let one_calls = Arc::new(AtomicUsize::new(0));

    let mut users = cache.read(
        QueryKey::from(["users"]),
        slow_counting_fetcher(users_calls.clone()),
    );
    let mut one = cache.read(
        QueryKey::from(["users", "u1"]),
        slow_counting_fetcher(one_calls.clone()),
    );

    users.settled().await;
    one.settled().await;
    assert_eq!(users_calls.load(Ordering::SeqCst), 1);
    assert_eq!(one_calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 2);

    cache.invalidate(&QueryKey::from(["users"]));
    users.settled().await;
    sleep(Duration::from_millis(60)).await;
    assert_eq!(users_calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        one_calls.load(Ordering::SeqCst),
        1,
        "invalidating the collection does not touch the record key"
    );
}

#[tokio::test]
async fn transport_failure_is_retried_once_per_read() {
    let cache = QueryCache::with_config(fresh_config());
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();

    let mut handle = cache.read(QueryKey::from(["users"]), move || {
        counted.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Err::<u32, _>(Error::Transport("connection refused".to_string())) })
    });

    let state = handle.settled().await;
    let err = state.error().expect("fetch should fail");
    assert!(err.is_transport());
    assert_eq!(
        calls.load(Ordering::SeqCst),
        2,
        "exactly one retry on transport failure"
    );
}

#[tokio::test]
async fn failed_mutation_leaves_keys_un_invalidated() {
    let cache = QueryCache::with_config(fresh_config());
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::from(["users"]);

    let mut list = cache.read(key.clone(), slow_counting_fetcher(calls.clone()));
    list.settled().await;

    let mutation: Mutation<(), ()> = Mutation::new(cache.clone(), vec![key], |()| {
        Box::pin(async {
            Err(Error::Api {
                status: 500,
                message: "boom".to_string(),
                field_errors: None,
            })
        })
    });

    let mut pending = mutation.invoke(());
    let state = pending.settled().await;
    assert_eq!(state.error().and_then(Error::status), Some(500));

    sleep(Duration::from_millis(60)).await;
    assert_eq!(
        calls.load(Ordering::SeqCst),
        1,
        "a failed mutation must not trigger a refetch"
    );
    assert!(!list.state().is_stale());
}

#[tokio::test]
async fn successful_mutation_invalidates_and_refetches() {
    let cache = QueryCache::with_config(fresh_config());
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::from(["users"]);

    let mut list = cache.read(key.clone(), slow_counting_fetcher(calls.clone()));
    list.settled().await;

    let mutation: Mutation<(), ()> =
        Mutation::new(cache.clone(), vec![key], |()| Box::pin(async { Ok(()) }));

    let mut pending = mutation.invoke(());
    assert!(pending.settled().await.is_success());

    let state = list.settled().await;
    assert_eq!(state.data(), Some(&2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn idle_entries_are_evicted_after_the_gc_window() {
    let cache = QueryCache::with_config(QueryConfig::new(
        Duration::from_secs(60),
        Duration::from_millis(50),
    ));
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::from(["users"]);

    let mut handle = cache.read(key.clone(), slow_counting_fetcher(calls.clone()));
    handle.settled().await;
    drop(handle);
    assert_eq!(cache.len(), 1, "entry is retained while the window is open");

    sleep(Duration::from_millis(120)).await;
    cache.gc();
    assert!(cache.is_empty(), "idle entry evicted after the window");

    // A read after eviction is a first load, not a stale serve.
    let mut handle = cache.read(key, slow_counting_fetcher(calls.clone()));
    assert!(handle.state().is_loading());
    handle.settled().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn subscribed_entries_survive_the_gc_window() {
    let cache = QueryCache::with_config(QueryConfig::new(
        Duration::from_secs(60),
        Duration::from_millis(50),
    ));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handle = cache.read(QueryKey::from(["users"]), slow_counting_fetcher(calls));
    handle.settled().await;

    sleep(Duration::from_millis(120)).await;
    cache.gc();
    assert_eq!(cache.len(), 1, "subscribed entries are never evicted");
}

#[tokio::test]
async fn panicking_fetcher_settles_as_error_and_recovers() {
    let cache = QueryCache::with_config(fresh_config());
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::from(["users"]);

    let counted = calls.clone();
    let fetcher = move || -> BoxFuture<'static, Result<u32, Error>> {
        let n = counted.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if n == 0 {
                panic!("fetch exploded");
            }
            Ok(7)
        })
    };

    let mut handle = cache.read(key.clone(), fetcher.clone());
    let state = handle.settled().await;
    assert!(
        state.error().is_some(),
        "a panicking fetcher settles as an error instead of hanging"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    drop(handle);

    // The entry is stale, not wedged: the next read fetches again.
    let mut handle = cache.read(key, fetcher);
    let state = handle.settled().await;
    assert_eq!(state.data(), Some(&7));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn departed_subscriber_does_not_cancel_the_fetch() {
    let cache = QueryCache::with_config(fresh_config());
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::from(["users"]);

    let handle = cache.read(key.clone(), slow_counting_fetcher(calls.clone()));
    drop(handle);

    // The fetch completes and settles the shared entry anyway.
    sleep(Duration::from_millis(80)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let second = cache.read(key, slow_counting_fetcher(calls.clone()));
    assert_eq!(
        second.data(),
        Some(1),
        "a later subscriber benefits from the completed fetch"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
