//! Prelude module for convenient imports.
//!
//! ```
//! use roster::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`ApiClient`] / [`UserApi`] - the HTTP client and its seam trait
//! - [`QueryCache`] / [`QueryConfig`] - the cache and its tuning knobs
//! - [`QueryHandle`] / [`QueryState`] - observable read state
//! - [`Mutation`] / [`MutationHandle`] / [`MutationState`] - observable writes
//! - [`UserHooks`] - the typed facade over fixed keys
//! - The data model: [`User`], [`UserDraft`], [`NewUser`], [`UserUpdate`]

pub use crate::api::{ApiClient, UserApi};
pub use crate::config::QueryConfig;
pub use crate::error::Error;
pub use crate::hooks::{user_key, users_key, UserHooks};
pub use crate::key::QueryKey;
pub use crate::model::{NewUser, User, UserDraft, UserUpdate};
pub use crate::mutation::{Mutation, MutationHandle, MutationState};
pub use crate::query::{QueryCache, QueryHandle, QueryState};
