//! HTTP plumbing shared by [`Server`](crate::Server) and [`Database`](crate::Database).
//!
//! A [`Resource`] is a base URL plus a shared `reqwest::Client`. Handles for
//! sub-paths are produced with [`Resource::child`] and share the underlying
//! connection pool and session cookie.
//!
//! Every JSON answer goes through [`check_result`], which turns CouchDB's
//! `{"error", "reason"}` bodies and error statuses into [`CouchError`]s.
//!
//! # Examples
//!
//! ```ignore
//! use couchdb_http::client::{ClientConfig, RequestParts, Resource};
//! use reqwest::Method;
//!
//! let resource = Resource::connect(ClientConfig::new("http://localhost:5984/")).await?;
//! let response = resource
//!     .request(Method::GET, &["_all_dbs"], RequestParts::new())
//!     .await?;
//! println!("{:?}", response.body);
//! ```

use crate::client::config::{AuthMethod, ClientConfig};
use crate::client::utils::exponential_backoff;
use crate::error::{CouchError, Result};
use crate::protocol::constants::{headers as couch_headers, paths, JSON_MIME};
use crate::protocol::{extract_auth_cookie, extract_credentials, is_json_content_type, join_segments};
use crate::types::Credentials;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE,
};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

/// Query parameters, body and extra headers of one request.
#[derive(Debug, Clone, Default)]
pub struct RequestParts {
    /// Query string pairs, sent in order
    pub params: Vec<(String, String)>,
    /// Raw request body
    pub body: Option<Bytes>,
    /// Headers overriding the client defaults
    pub headers: HeaderMap,
}

impl RequestParts {
    /// Empty request: no params, no body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Add several query parameters.
    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Serialize `body` as the JSON request body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        self.body = Some(Bytes::from(serde_json::to_vec(body)?));
        Ok(self)
    }

    /// Use raw bytes as the request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add a request header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A checked CouchDB answer.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Parsed JSON body; `None` for HEAD, empty or non-JSON answers
    pub body: Option<Value>,
}

impl Response {
    /// The JSON body, or an error naming what was expected.
    pub fn into_json(self) -> Result<Value> {
        self.body
            .ok_or_else(|| CouchError::Unexpected(format!("empty answer (status {})", self.status)))
    }

    /// Deserialize the JSON body into `T`.
    pub fn into_typed<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.into_json()?)?)
    }

    /// A header value as text.
    pub fn header_str(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// An addressable location on a CouchDB server.
#[derive(Clone)]
pub struct Resource {
    client: reqwest::Client,
    base_url: Url,
    config: Arc<ClientConfig>,
    session: Arc<RwLock<Option<HeaderValue>>>,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl Resource {
    /// Build the HTTP client and authenticate.
    ///
    /// Credentials embedded in `config.base_url` are stripped from the URL and
    /// presented according to `config.auth_method`.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let (base_url, credentials) = extract_credentials(&config.base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_MIME));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_MIME));
        if !config.full_commit {
            headers.insert(couch_headers::FULL_COMMIT, HeaderValue::from_static("false"));
        }
        if let (Some(creds), AuthMethod::Basic) = (&credentials, config.auth_method) {
            headers.insert(AUTHORIZATION, basic_auth_header(creds)?);
        }

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.verify)
            .pool_idle_timeout(Duration::from_secs(90));

        if !config.proxy_url.is_empty() {
            builder = builder.proxy(reqwest::Proxy::all(&config.proxy_url)?);
        }

        let resource = Resource {
            client: builder.build()?,
            base_url,
            config: Arc::new(config),
            session: Arc::new(RwLock::new(None)),
        };

        if let (Some(creds), AuthMethod::Session) = (&credentials, resource.config.auth_method) {
            resource.login(creds).await?;
        }

        Ok(resource)
    }

    /// A resource rooted `segments` below this one.
    pub fn child(&self, segments: &[&str]) -> Result<Self> {
        Ok(Resource {
            client: self.client.clone(),
            base_url: join_segments(&self.base_url, segments)?,
            config: self.config.clone(),
            session: self.session.clone(),
        })
    }

    /// Base URL without credentials.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The configuration this resource was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Absolute URL of `segments` below this resource.
    pub fn url_for(&self, segments: &[&str]) -> Result<Url> {
        join_segments(&self.base_url, segments)
    }

    /// Issue a request and check the answer.
    ///
    /// GET and HEAD are retried on transport failures and transient statuses.
    /// Other methods, and the last failed attempt, surface the mapped error
    /// with the server's body intact.
    pub async fn request(
        &self,
        method: Method,
        segments: &[&str],
        parts: RequestParts,
    ) -> Result<Response> {
        let idempotent = method == Method::GET || method == Method::HEAD;
        let mut attempt = 0;

        loop {
            match self.request_once(method.clone(), segments, &parts).await {
                Ok(response) => return Ok(response),
                Err(e) if idempotent && e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = exponential_backoff(attempt, self.config.retry_delay_ms);
                    if self.config.enable_logging {
                        tracing::warn!(
                            "Request failed (attempt {}), retrying after {:?}: {}",
                            attempt + 1,
                            delay,
                            e
                        );
                    }
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// `GET` shorthand.
    pub async fn get(&self, segments: &[&str], parts: RequestParts) -> Result<Response> {
        self.request(Method::GET, segments, parts).await
    }

    /// `PUT` shorthand.
    pub async fn put(&self, segments: &[&str], parts: RequestParts) -> Result<Response> {
        self.request(Method::PUT, segments, parts).await
    }

    /// `POST` shorthand.
    pub async fn post(&self, segments: &[&str], parts: RequestParts) -> Result<Response> {
        self.request(Method::POST, segments, parts).await
    }

    /// `DELETE` shorthand.
    pub async fn delete(&self, segments: &[&str], parts: RequestParts) -> Result<Response> {
        self.request(Method::DELETE, segments, parts).await
    }

    /// `HEAD` shorthand.
    pub async fn head(&self, segments: &[&str], parts: RequestParts) -> Result<Response> {
        self.request(Method::HEAD, segments, parts).await
    }

    /// Issue a request whose body will be consumed as a stream.
    ///
    /// Successful answers are returned unread and without a timeout; error
    /// answers are read and mapped like any other request.
    pub async fn stream(
        &self,
        method: Method,
        segments: &[&str],
        parts: RequestParts,
    ) -> Result<reqwest::Response> {
        let url = self.url_for(segments)?;
        let response = self.build(method.clone(), url.clone(), &parts).send().await?;
        let status = response.status().as_u16();
        tracing::debug!(%method, %url, status, "couchdb stream opened");
        self.store_session_cookie(response.headers());

        if status < 400 {
            return Ok(response);
        }

        let body = response.json::<Value>().await.ok();
        Err(check_result(status, body.as_ref())
            .err()
            .unwrap_or(CouchError::Generic {
                status,
                body: body.unwrap_or(Value::Null),
            }))
    }

    async fn request_once(
        &self,
        method: Method,
        segments: &[&str],
        parts: &RequestParts,
    ) -> Result<Response> {
        let url = self.url_for(segments)?;
        let response = self
            .build(method.clone(), url.clone(), parts)
            .timeout(Duration::from_millis(self.config.request_timeout_ms))
            .send()
            .await?;

        let status = response.status().as_u16();
        tracing::debug!(%method, %url, status, "couchdb request");

        self.store_session_cookie(response.headers());
        let headers = response.headers().clone();

        let is_json = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(is_json_content_type)
            .unwrap_or(false);

        let body = if method == Method::HEAD {
            None
        } else {
            let bytes = response.bytes().await?;
            if is_json && !bytes.is_empty() {
                Some(serde_json::from_slice(&bytes)?)
            } else {
                None
            }
        };

        check_result(status, body.as_ref())?;

        Ok(Response {
            status,
            headers,
            body,
        })
    }

    fn build(&self, method: Method, url: Url, parts: &RequestParts) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);

        if !parts.params.is_empty() {
            builder = builder.query(&parts.params);
        }

        let cookie = self.session.read().clone();
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }

        builder = builder.headers(parts.headers.clone());

        if let Some(body) = &parts.body {
            builder = builder.body(body.clone());
        }

        builder
    }

    async fn login(&self, creds: &Credentials) -> Result<()> {
        let url = self.url_for(&[paths::SESSION])?;
        let body = serde_json::json!({"name": creds.username, "password": creds.password});

        let response = self.client.post(url).json(&body).send().await?;
        if response.status() != reqwest::StatusCode::OK {
            tracing::debug!(status = response.status().as_u16(), "session login refused");
            return Err(CouchError::AuthenticationFailed);
        }

        self.store_session_cookie(response.headers());
        if self.session.read().is_none() {
            return Err(CouchError::AuthenticationFailed);
        }
        Ok(())
    }

    /// CouchDB refreshes the session cookie on ordinary answers; keep the latest.
    fn store_session_cookie(&self, headers: &HeaderMap) {
        let cookie = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(extract_auth_cookie)
            .and_then(|c| HeaderValue::from_str(&c).ok());

        if let Some(cookie) = cookie {
            *self.session.write() = Some(cookie);
        }
    }
}

fn basic_auth_header(creds: &Credentials) -> Result<HeaderValue> {
    let token = STANDARD.encode(format!("{}:{}", creds.username, creds.password));
    let mut value = HeaderValue::from_str(&format!("Basic {}", token))
        .map_err(|e| CouchError::InvalidArgument(format!("invalid credentials: {}", e)))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Map a CouchDB answer to an error, if it is one.
///
/// A `conflict`/`file_exists` error body is a conflict even on a 2xx status
/// (bulk writes report per-document failures that way). Array bodies are
/// checked element by element.
pub fn check_result(status: u16, body: Option<&Value>) -> Result<()> {
    match body {
        Some(Value::Array(items)) => items
            .iter()
            .try_for_each(|item| check_single(status, Some(item))),
        other => check_single(status, other),
    }
}

fn check_single(status: u16, body: Option<&Value>) -> Result<()> {
    let error = body.and_then(|b| b.get("error")).and_then(Value::as_str);
    let reason = body
        .and_then(|b| b.get("reason"))
        .and_then(Value::as_str)
        .filter(|r| !r.is_empty());

    if matches!(error, Some("conflict") | Some("file_exists")) {
        return Err(CouchError::Conflict(reason.unwrap_or("Conflict").to_string()));
    }

    if status > 205 {
        if status == 404 || error == Some("not_found") {
            return Err(CouchError::NotFound(reason.unwrap_or("Not found").to_string()));
        }
        if error == Some("bad_request") {
            return Err(CouchError::BadRequest(reason.unwrap_or("Bad request").to_string()));
        }
        return Err(CouchError::Generic {
            status,
            body: body.cloned().unwrap_or(Value::Null),
        });
    }

    Ok(())
}
