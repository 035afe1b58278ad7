//! Authenticated request gateway
//!
//! Every authenticated call goes through [`Gateway::request`], which:
//! - reads the token from the session store on each call (never cached)
//! - injects `Content-Type: application/json` and `Authorization: Bearer <token>`
//! - applies caller headers last, so a caller only overrides what it names
//! - on 401, clears the store and bumps the teardown epoch
//!
//! There is no refresh-token flow, so a 401 always ends the session. The
//! gateway cannot reach into the controller's memory; it publishes the
//! teardown on a `watch` channel and the controller applies it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode};
use tokio::sync::watch;

use super::error::ApiError;
use crate::session::SessionStore;
use crate::util::token_fingerprint;

/// Per-call options: an optional JSON body and extra headers
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub body: Option<serde_json::Value>,
    pub headers: HeaderMap,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// HTTP access to the EcoReceipt API with bearer injection and 401 teardown
#[derive(Clone)]
pub struct Gateway {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn SessionStore>,
    /// Incremented once per teardown; receivers compare epochs
    teardown: Arc<watch::Sender<u64>>,
}

impl Gateway {
    /// Build a gateway for `base_url` (e.g. `http://localhost:8001`)
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        tracing::debug!("Gateway targeting {}", base_url);

        Ok(Self {
            http,
            base_url,
            store,
            teardown: Arc::new(watch::channel(0).0),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Raw HTTP client for calls that must not carry credentials (login, register)
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.store)
    }

    /// Receiver that observes every teardown the gateway triggers from now on
    pub fn subscribe_teardown(&self) -> watch::Receiver<u64> {
        self.teardown.subscribe()
    }

    /// Send an authenticated request.
    ///
    /// Returns `Ok(None)` when the server answered 401; by then the store is
    /// cleared and the teardown published. Any other status is returned to the
    /// caller untouched. Transport failures are `ApiError::Transport` and leave
    /// the session alone.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Option<Response>, ApiError> {
        let token = self.current_token();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                ApiError::InvalidRequest("stored token is not a valid header value".to_string())
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        // Caller headers win, but only for the names they set
        headers.extend(options.headers);

        let mut builder = self
            .http
            .request(method.clone(), self.url(path))
            .headers(headers);
        if let Some(body) = &options.body {
            builder = builder.body(body.to_string());
        }

        tracing::debug!(
            "{} {} (token: {})",
            method,
            path,
            token
                .as_deref()
                .map(token_fingerprint)
                .unwrap_or_else(|| "none".to_string())
        );

        let start = Instant::now();
        let response = builder.send().await.map_err(|e| {
            tracing::warn!("{} {} failed: {}", method, path, e);
            ApiError::Transport(e)
        })?;

        let status = response.status();
        tracing::debug!(
            "{} {} -> {} in {:?}",
            method,
            path,
            status.as_u16(),
            start.elapsed()
        );

        if status == StatusCode::UNAUTHORIZED {
            self.teardown(path);
            return Ok(None);
        }

        Ok(Some(response))
    }

    fn current_token(&self) -> Option<String> {
        match self.store.load() {
            Ok(session) => session.map(|s| s.access_token),
            Err(e) => {
                tracing::warn!("Could not read session store, sending without token: {}", e);
                None
            }
        }
    }

    /// Clear persisted credentials and tell every subscriber the session is gone
    fn teardown(&self, path: &str) {
        tracing::warn!("Authentication rejected on {}, tearing down session", path);

        if let Err(e) = self.store.clear() {
            tracing::error!("Failed to clear session store during teardown: {}", e);
        }

        self.teardown.send_modify(|epoch| *epoch += 1);
    }
}
