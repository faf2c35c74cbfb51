//! # Roster - Query and Mutation Layer for a User Directory
//!
//! Roster is the data layer of a user-management client: it lists, creates,
//! replaces, and deletes user records against a remote REST API, keeping a
//! local query cache in sync through invalidation-driven refetching, similar
//! to SWR or TanStack Query.
//!
//! ## Architecture
//!
//! Three components, leaf to root:
//!
//! 1. **API client** ([`api`]): one HTTP request per operation, response
//!    envelopes unwrapped and failures normalized into [`error::Error`]
//! 2. **Query/mutation cache** ([`query`], [`mutation`]): per-key state
//!    (loading/success/error), stale-while-revalidate reads, coalesced
//!    in-flight fetches, invalidation, and garbage collection
//! 3. **Hook facade** ([`hooks`]): typed operations bound to fixed keys,
//!    with client-side validation and declared invalidation rules
//!
//! The rendering layer is out of scope: reads hand back a
//! [`query::QueryHandle`] and mutations a [`mutation::MutationHandle`], both
//! observable state the UI polls or awaits.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use roster::prelude::*;
//!
//! # async fn run() -> Result<(), roster::error::Error> {
//! let api = Arc::new(ApiClient::new("http://localhost:3000/api")?);
//! let hooks = UserHooks::new(api, QueryCache::new());
//!
//! // Subscribe to the collection; the fetch starts in the background.
//! let mut list = hooks.user_list();
//!
//! // Create a record; on success the list is invalidated and refetched.
//! let create = hooks.create_user();
//! let mut pending = create.invoke(UserDraft {
//!     name: "Ada Lovelace".into(),
//!     email: "ada@example.com".into(),
//!     age: "36".into(),
//!     occupation: "Mathematician".into(),
//! });
//!
//! match pending.settled().await {
//!     MutationState::Success(user) => println!("created {}", user.id),
//!     MutationState::Error(err) => eprintln!("create failed: {err}"),
//!     _ => unreachable!(),
//! }
//!
//! if let QueryState::Success { data, .. } = list.settled().await {
//!     println!("{} users", data.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
mod cache;
pub mod config;
pub mod error;
pub mod hooks;
pub mod key;
pub mod model;
pub mod mutation;
pub mod prelude;
pub mod query;
