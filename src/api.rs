//! HTTP client for the user record store.
//!
//! [`ApiClient`] issues one request per operation against the REST surface
//! (`GET/POST/PUT/DELETE /users`), unwraps the `{data: …}` response envelope,
//! and normalizes failures into [`Error`]: connection-level problems become
//! [`Error::Transport`], non-2xx statuses become [`Error::Api`] with the
//! body's `{message, errors?}` parsed best-effort.
//!
//! The client performs no retries; the read-retry policy lives in the query
//! cache. Request/response metadata is logged at debug level for
//! observability only.
//!
//! [`UserApi`] is the seam between the hook facade and the transport: the
//! facade only depends on the trait, so tests can substitute an in-memory
//! implementation.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

use crate::error::Error;
use crate::model::{NewUser, User};

/// The operations the hook facade needs from the record store.
///
/// Methods return `'static` boxed futures so implementations must capture
/// what they need by value (the bundled [`ApiClient`] clones itself; clones
/// share the underlying connection pool).
pub trait UserApi: Send + Sync {
    /// Fetches the whole collection.
    fn list(&self) -> BoxFuture<'static, Result<Vec<User>, Error>>;

    /// Fetches a single record by id.
    fn get(&self, id: &str) -> BoxFuture<'static, Result<User, Error>>;

    /// Creates a record and returns it with server-assigned fields.
    fn create(&self, user: NewUser) -> BoxFuture<'static, Result<User, Error>>;

    /// Replaces a record and returns the stored version.
    fn update(&self, id: &str, user: NewUser) -> BoxFuture<'static, Result<User, Error>>;

    /// Deletes a record. The server answers 200 or 204 on success.
    fn remove(&self, id: &str) -> BoxFuture<'static, Result<(), Error>>;
}

/// HTTP client bound to a base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Creates a new client for the given base URL (e.g. `http://host/api`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// The base URL this client was created with.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// GET /users
    pub async fn list_users(&self) -> Result<Vec<User>, Error> {
        let url = self.url("/users");
        debug!(method = "GET", url = %url, "api request");
        let response = self.client.get(&url).send().await.map_err(transport)?;
        decode(response).await
    }

    /// GET /users/:id
    pub async fn get_user(&self, id: &str) -> Result<User, Error> {
        let url = self.url(&format!("/users/{id}"));
        debug!(method = "GET", url = %url, "api request");
        let response = self.client.get(&url).send().await.map_err(transport)?;
        decode(response).await
    }

    /// POST /users
    pub async fn create_user(&self, user: &NewUser) -> Result<User, Error> {
        let url = self.url("/users");
        debug!(method = "POST", url = %url, "api request");
        let response = self
            .client
            .post(&url)
            .json(user)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    /// PUT /users/:id
    pub async fn update_user(&self, id: &str, user: &NewUser) -> Result<User, Error> {
        let url = self.url(&format!("/users/{id}"));
        debug!(method = "PUT", url = %url, "api request");
        let response = self
            .client
            .put(&url)
            .json(user)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    /// DELETE /users/:id
    pub async fn delete_user(&self, id: &str) -> Result<(), Error> {
        let url = self.url(&format!("/users/{id}"));
        debug!(method = "DELETE", url = %url, "api request");
        let response = self.client.delete(&url).send().await.map_err(transport)?;
        let status = response.status();
        debug!(status = %status, "api response");
        if status.is_success() {
            return Ok(());
        }
        Err(error_from_response(response).await)
    }
}

impl UserApi for ApiClient {
    fn list(&self) -> BoxFuture<'static, Result<Vec<User>, Error>> {
        let client = self.clone();
        Box::pin(async move { client.list_users().await })
    }

    fn get(&self, id: &str) -> BoxFuture<'static, Result<User, Error>> {
        let client = self.clone();
        let id = id.to_string();
        Box::pin(async move { client.get_user(&id).await })
    }

    fn create(&self, user: NewUser) -> BoxFuture<'static, Result<User, Error>> {
        let client = self.clone();
        Box::pin(async move { client.create_user(&user).await })
    }

    fn update(&self, id: &str, user: NewUser) -> BoxFuture<'static, Result<User, Error>> {
        let client = self.clone();
        let id = id.to_string();
        Box::pin(async move { client.update_user(&id, &user).await })
    }

    fn remove(&self, id: &str) -> BoxFuture<'static, Result<(), Error>> {
        let client = self.clone();
        let id = id.to_string();
        Box::pin(async move { client.delete_user(&id).await })
    }
}

/// Success envelope: every 2xx body is `{"data": …}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Error body: `{"message": …, "errors": {field: message}}`, both optional.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    errors: Option<HashMap<String, String>>,
}

fn transport(err: reqwest::Error) -> Error {
    Error::Transport(err.to_string())
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, Error> {
    let status = response.status();
    debug!(status = %status, "api response");
    if status.is_success() {
        let envelope: Envelope<T> = response.json().await.map_err(transport)?;
        Ok(envelope.data)
    } else {
        Err(error_from_response(response).await)
    }
}

async fn error_from_response(response: Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    api_error(status, &body)
}

/// Builds an [`Error::Api`] from a status and a raw body. Bodies that are
/// not the expected `{message, errors?}` shape fall back to a generic
/// message.
fn api_error(status: u16, body: &str) -> Error {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    Error::Api {
        status,
        message: parsed
            .message
            .unwrap_or_else(|| format!("request failed with status {status}")),
        field_errors: parsed.errors,
    }
}
