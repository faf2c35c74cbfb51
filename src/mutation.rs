//! Mutations: one-off writes that invalidate queries on success.
//!
//! # Design Pattern: Transaction-based Operations
//!
//! Unlike queries, mutations are discrete operations with a clear start and
//! end. A [`Mutation`] binds a mutation function to the cache keys it
//! invalidates; each [`Mutation::invoke`] call runs independently and
//! publishes its progress (`Pending` → `Success` | `Error`) through its own
//! [`MutationHandle`], which is discarded once the caller has observed the
//! result.
//!
//! Invalidation happens only when the mutation function succeeds: a failed
//! write must not trigger a refetch, and mutations are never auto-retried
//! because duplicate writes are unsafe.
//!
//! # Example
//!
//! ```rust,ignore
//! use roster::prelude::*;
//!
//! let create = Mutation::new(cache.clone(), vec![QueryKey::from(["users"])], move |draft| {
//!     let api = api.clone();
//!     Box::pin(async move {
//!         let payload = draft.validate()?;
//!         api.create(payload).await
//!     })
//! });
//!
//! let mut handle = create.invoke(draft);
//! match handle.settled().await {
//!     MutationState::Success(user) => println!("created {}", user.id),
//!     MutationState::Error(err) => eprintln!("create failed: {err}"),
//!     _ => unreachable!("settled() waits out pending states"),
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::debug;

use crate::error::Error;
use crate::key::QueryKey;
use crate::query::QueryCache;

/// The state of one mutation invocation.
#[derive(Debug, Clone, Default)]
pub enum MutationState<T> {
    /// Not yet invoked.
    #[default]
    Idle,
    /// The mutation function is running.
    Pending,
    /// Mutation succeeded; the declared keys have been invalidated.
    Success(T),
    /// Mutation failed; no keys were invalidated.
    Error(Error),
}

impl<T> MutationState<T> {
    /// Returns the result data if the mutation succeeded, otherwise `None`.
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the error if the mutation failed, otherwise `None`.
    pub const fn error(&self) -> Option<&Error> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Returns `true` before the mutation has been invoked.
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns `true` while the mutation function is running.
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns `true` if the mutation succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns `true` if the mutation failed.
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns `true` once the mutation has succeeded or failed.
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Error(_))
    }
}

/// A write operation bound to the query keys it invalidates on success.
pub struct Mutation<I, O> {
    cache: QueryCache,
    invalidates: Vec<QueryKey>,
    run: Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, Error>> + Send + Sync>,
}

impl<I, O> Mutation<I, O>
where
    I: Send + 'static,
    O: Clone + Send + Sync + 'static,
{
    /// Creates a mutation. `invalidates` lists the keys to invalidate after
    /// each successful invocation.
    pub fn new<F>(cache: QueryCache, invalidates: Vec<QueryKey>, run: F) -> Self
    where
        F: Fn(I) -> BoxFuture<'static, Result<O, Error>> + Send + Sync + 'static,
    {
        Self {
            cache,
            invalidates,
            run: Arc::new(run),
        }
    }

    /// Runs the mutation with the given input.
    ///
    /// Returns immediately with a handle observing this invocation. On
    /// success the declared keys are invalidated before the handle reports
    /// `Success`, so an already-subscribed query sees its refetch begin
    /// first. Dropping the handle does not cancel the mutation.
    ///
    /// Must be called from within a tokio runtime.
    pub fn invoke(&self, input: I) -> MutationHandle<O> {
        let (tx, rx) = watch::channel(MutationState::Pending);
        let cache = self.cache.clone();
        let invalidates = self.invalidates.clone();
        let fut = (self.run)(input);

        tokio::spawn(async move {
            match fut.await {
                Ok(output) => {
                    for key in &invalidates {
                        cache.invalidate(key);
                    }
                    let _ = tx.send_replace(MutationState::Success(output));
                }
                Err(err) => {
                    debug!(error = %err, "mutation failed");
                    let _ = tx.send_replace(MutationState::Error(err));
                }
            }
        });

        MutationHandle { rx }
    }
}

impl<I, O> fmt::Debug for Mutation<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutation")
            .field("invalidates", &self.invalidates)
            .finish()
    }
}

/// Observes a single mutation invocation.
pub struct MutationHandle<O> {
    rx: watch::Receiver<MutationState<O>>,
}

impl<O: Clone> MutationHandle<O> {
    /// The invocation's current state.
    #[must_use]
    pub fn state(&self) -> MutationState<O> {
        self.rx.borrow().clone()
    }

    /// Waits until the invocation has succeeded or failed.
    pub async fn settled(&mut self) -> MutationState<O> {
        loop {
            let state = self.rx.borrow_and_update().clone();
            if state.is_settled() {
                return state;
            }
            if self.rx.changed().await.is_err() {
                return self.state();
            }
        }
    }
}

impl<O: fmt::Debug + Clone> fmt::Debug for MutationHandle<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationHandle")
            .field("state", &*self.rx.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_state_data() {
        let state = MutationState::Success(42);
        assert_eq!(state.data(), Some(&42));

        let state: MutationState<i32> = MutationState::Idle;
        assert_eq!(state.data(), None);

        let state: MutationState<i32> = MutationState::Pending;
        assert_eq!(state.data(), None);

        let state: MutationState<i32> = MutationState::Error(Error::Transport("x".to_string()));
        assert_eq!(state.data(), None);
        assert!(state.error().is_some());
    }

    #[test]
    fn test_mutation_state_predicates() {
        let idle: MutationState<i32> = MutationState::default();
        assert!(idle.is_idle());
        assert!(!idle.is_settled());

        let pending: MutationState<i32> = MutationState::Pending;
        assert!(pending.is_pending());
        assert!(!pending.is_settled());

        let success = MutationState::Success(42);
        assert!(success.is_success());
        assert!(success.is_settled());

        let error: MutationState<i32> = MutationState::Error(Error::Transport("x".to_string()));
        assert!(error.is_error());
        assert!(error.is_settled());
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let cache = QueryCache::new();
        let mutation: Mutation<u32, u32> =
            Mutation::new(cache, vec![], |n| Box::pin(async move { Ok(n * 2) }));

        let mut handle = mutation.invoke(21);
        let state = handle.settled().await;
        assert_eq!(state.data(), Some(&42));
    }

    #[tokio::test]
    async fn test_invoke_error_preserves_original() {
        let cache = QueryCache::new();
        let mutation: Mutation<(), u32> = Mutation::new(cache, vec![], |()| {
            Box::pin(async {
                Err(Error::Api {
                    status: 404,
                    message: "User not found".to_string(),
                    field_errors: None,
                })
            })
        });

        let mut handle = mutation.invoke(());
        let state = handle.settled().await;
        let err = state.error().expect("mutation should fail");
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "api error (status 404): User not found");
    }

    #[tokio::test]
    async fn test_each_invocation_is_independent() {
        let cache = QueryCache::new();
        let mutation: Mutation<u32, u32> =
            Mutation::new(cache, vec![], |n| Box::pin(async move { Ok(n) }));

        let mut first = mutation.invoke(1);
        let mut second = mutation.invoke(2);
        assert_eq!(first.settled().await.data(), Some(&1));
        assert_eq!(second.settled().await.data(), Some(&2));
    }
}
