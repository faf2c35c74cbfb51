//! Typed entry points binding fixed query keys to API calls.
//!
//! [`UserHooks`] is the surface the rendering layer talks to. Reads return a
//! [`QueryHandle`] exposing `{data, status, error}`; mutations return a
//! [`Mutation`] whose `invoke` yields a
//! [`MutationHandle`](crate::mutation::MutationHandle) the caller awaits or
//! polls for `{status, error}`.
//!
//! Consistency model: every successful mutation invalidates the whole
//! `["users"]` collection, which refetches for any active subscriber. No
//! entity-level cache merge is performed.
//!
//! Create and update validate the draft locally first; a
//! [`Error::Validation`](crate::error::Error::Validation) settles the
//! mutation without any network call and without invalidating anything.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use roster::prelude::*;
//!
//! let api = Arc::new(ApiClient::new("http://localhost:3000/api")?);
//! let hooks = UserHooks::new(api, QueryCache::new());
//!
//! let mut list = hooks.user_list();
//! let mut create = hooks.create_user().invoke(UserDraft {
//!     name: "Ada Lovelace".into(),
//!     email: "ada@example.com".into(),
//!     age: "36".into(),
//!     occupation: "Mathematician".into(),
//! });
//!
//! if create.settled().await.is_success() {
//!     // The list refetch is already underway.
//!     let state = list.settled().await;
//! }
//! ```

use std::sync::Arc;

use crate::api::UserApi;
use crate::key::QueryKey;
use crate::model::{User, UserDraft, UserUpdate};
use crate::mutation::Mutation;
use crate::query::{QueryCache, QueryHandle};

/// Key for the whole user collection.
#[must_use]
pub fn users_key() -> QueryKey {
    QueryKey::from(["users"])
}

/// Key for a single user record.
#[must_use]
pub fn user_key(id: &str) -> QueryKey {
    users_key().child(id)
}

/// Binds the user API to the query cache under fixed keys.
#[derive(Clone)]
pub struct UserHooks {
    api: Arc<dyn UserApi>,
    cache: QueryCache,
}

impl UserHooks {
    /// Creates the facade over an API implementation and a cache instance.
    pub fn new(api: Arc<dyn UserApi>, cache: QueryCache) -> Self {
        Self { api, cache }
    }

    /// The cache this facade reads and invalidates through.
    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Subscribes to the user collection under `["users"]`.
    pub fn user_list(&self) -> QueryHandle<Vec<User>> {
        let api = Arc::clone(&self.api);
        self.cache.read(users_key(), move || api.list())
    }

    /// Subscribes to a single record under `["users", id]`.
    pub fn user(&self, id: &str) -> QueryHandle<User> {
        let api = Arc::clone(&self.api);
        let id_owned = id.to_string();
        self.cache.read(user_key(id), move || api.get(&id_owned))
    }

    /// Mutation creating a user from validated form input. Invalidates
    /// `["users"]` on success.
    pub fn create_user(&self) -> Mutation<UserDraft, User> {
        let api = Arc::clone(&self.api);
        Mutation::new(self.cache.clone(), vec![users_key()], move |draft: UserDraft| {
            let api = Arc::clone(&api);
            Box::pin(async move {
                let payload = draft.validate()?;
                api.create(payload).await
            })
        })
    }

    /// Mutation replacing a user record (whole-record PUT). Invalidates
    /// `["users"]` on success.
    pub fn update_user(&self) -> Mutation<UserUpdate, User> {
        let api = Arc::clone(&self.api);
        Mutation::new(self.cache.clone(), vec![users_key()], move |update: UserUpdate| {
            let api = Arc::clone(&api);
            Box::pin(async move {
                let UserUpdate { id, draft } = update;
                let payload = draft.validate()?;
                api.update(&id, payload).await
            })
        })
    }

    /// Mutation deleting a user by id. Invalidates `["users"]` on success.
    pub fn delete_user(&self) -> Mutation<String, ()> {
        let api = Arc::clone(&self.api);
        Mutation::new(self.cache.clone(), vec![users_key()], move |id: String| {
            let api = Arc::clone(&api);
            Box::pin(async move { api.remove(&id).await })
        })
    }
}

impl std::fmt::Debug for UserHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserHooks")
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_keys() {
        assert_eq!(users_key().segments(), ["users"]);
        assert_eq!(user_key("u1").segments(), ["users", "u1"]);
        assert_eq!(user_key("u1"), users_key().child("u1"));
    }
}
