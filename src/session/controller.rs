//! Session controller
//!
//! Owns the session state machine and the per-session caches:
//!
//! ```text
//!   anonymous ──login/register──▶ authenticating ──token──▶ active
//!       ▲                              │                      │
//!       └──────────rejected────────────┘      logout / 401 ───┘
//! ```
//!
//! A 401 can surface inside any network call. The gateway clears the store
//! and bumps its teardown epoch; the controller checks that epoch after each
//! operation and, if it moved, resets to anonymous exactly like `logout`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::store::{FileSessionStore, SessionStore, StoreError};
use super::Session;
use crate::api::{ApiClient, ApiError, AuthOutcome, Gateway};
use crate::chat::{ChatSession, ChatTranscript};
use crate::config::Config;
use crate::dashboard::{Dashboard, RefreshOutcome};
use crate::models::User;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Active(Session),
}

/// Why a login or registration did not produce an active session
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Server refused the credentials; the text is its `detail`
    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("failed to persist session: {0}")]
    Store(#[from] StoreError),

    /// Signed in, but the server rejected the new token right away
    #[error("session ended by the server immediately after sign-in")]
    SessionEnded,
}

pub struct SessionController {
    store: Arc<dyn SessionStore>,
    api: ApiClient,
    state: SessionState,
    dashboard: Dashboard,
    chat: ChatSession,
    teardown_rx: watch::Receiver<u64>,
    /// Set when a teardown was applied and nobody has asked about it yet
    torn_down: bool,
}

impl SessionController {
    /// Controller over `gateway`, sharing the gateway's session store
    pub fn new(gateway: Gateway) -> Self {
        let store = gateway.store();
        let teardown_rx = gateway.subscribe_teardown();
        Self {
            store,
            api: ApiClient::new(gateway),
            state: SessionState::Anonymous,
            dashboard: Dashboard::new(),
            chat: ChatSession::new(),
            teardown_rx,
            torn_down: false,
        }
    }

    /// Controller with a file-backed store and gateway built from `config`
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let store: Arc<dyn SessionStore> =
            Arc::new(FileSessionStore::new(config.session_file.clone()));
        let gateway = Gateway::new(
            config.api_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
            store,
        )?;
        Ok(Self::new(gateway))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            SessionState::Active(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session().is_some()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn transcript(&self) -> &ChatTranscript {
        self.chat.transcript()
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    /// Whether a server-forced teardown happened since the last call
    pub fn take_teardown(&mut self) -> bool {
        std::mem::take(&mut self.torn_down)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────

    /// Resume a stored session at startup, without contacting the auth endpoints.
    ///
    /// Returns whether the controller ended up active.
    pub async fn resume(&mut self) -> bool {
        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Discarding unreadable stored session: {}", e);
                if let Err(e) = self.store.clear() {
                    tracing::error!("Failed to clear session store: {}", e);
                }
                None
            }
        };

        let Some(stored) = stored else {
            tracing::debug!("No stored session, starting anonymous");
            return false;
        };

        tracing::info!("Resuming session for {}", stored.user.name);
        self.activate(stored.access_token, &stored.user);
        self.refresh_dashboard().await;
        self.is_active()
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<&Session, AuthError> {
        self.discard_stale_teardown();
        let previous = std::mem::replace(&mut self.state, SessionState::Authenticating);
        let outcome = self.api.login(email, password).await;
        self.complete_authentication(previous, outcome).await
    }

    pub async fn register(
        &mut self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<&Session, AuthError> {
        self.discard_stale_teardown();
        let previous = std::mem::replace(&mut self.state, SessionState::Authenticating);
        let outcome = self.api.register(email, password, name).await;
        self.complete_authentication(previous, outcome).await
    }

    async fn complete_authentication(
        &mut self,
        previous: SessionState,
        outcome: Result<AuthOutcome, ApiError>,
    ) -> Result<&Session, AuthError> {
        let (token, user) = match outcome {
            Ok(AuthOutcome::Authenticated { token, user }) => (token, user),
            Ok(AuthOutcome::Rejected { detail }) => {
                self.state = previous;
                return Err(AuthError::Rejected(detail));
            }
            Err(e) => {
                self.state = previous;
                return Err(e.into());
            }
        };

        // Teardowns before this point belong to the old token
        self.teardown_rx.borrow_and_update();

        if let Err(e) = self.store.save(&token, &user) {
            self.state = previous;
            return Err(e.into());
        }

        // A different account replaces whatever the previous one had cached
        if let SessionState::Active(old) = &previous {
            if old.user_id != user.id {
                self.dashboard.clear();
                self.chat.clear();
            }
        }

        self.activate(token, &user);
        self.refresh_dashboard().await;

        self.session().ok_or(AuthError::SessionEnded)
    }

    /// Sign out. Local only: never waits on the network, never fails.
    pub fn logout(&mut self) {
        if let Err(e) = self.store.clear() {
            tracing::error!("Failed to clear session store on logout: {}", e);
        }
        self.reset();
        tracing::info!("Logged out");
    }

    fn activate(&mut self, token: String, user: &User) {
        self.state = SessionState::Active(Session::new(token, user));
        self.chat.greet(&user.name);
    }

    fn reset(&mut self) {
        self.state = SessionState::Anonymous;
        self.dashboard.clear();
        self.chat.clear();
    }

    /// Drop a session the gateway already tore down outside the controller
    /// (e.g. through `api()`). The user is about to sign in again, so there is
    /// nothing to report.
    fn discard_stale_teardown(&mut self) {
        if self.teardown_rx.has_changed().unwrap_or(false) {
            self.teardown_rx.borrow_and_update();
            self.reset();
        }
    }

    /// Apply a gateway teardown if one happened since the last check
    fn apply_teardown(&mut self) -> bool {
        if !self.teardown_rx.has_changed().unwrap_or(false) {
            return false;
        }
        self.teardown_rx.borrow_and_update();

        tracing::warn!("Session no longer valid, returning to sign-in");
        self.reset();
        self.torn_down = true;
        true
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session-scoped operations
    // ─────────────────────────────────────────────────────────────────────

    /// Reload receipts, impact and analytics as one snapshot
    pub async fn refresh_dashboard(&mut self) -> RefreshOutcome {
        if !self.is_active() {
            return RefreshOutcome::Skipped;
        }
        let outcome = self.dashboard.refresh(&self.api).await;
        if self.apply_teardown() {
            return RefreshOutcome::Skipped;
        }
        outcome
    }

    /// Send a chat message; returns the assistant's reply, `None` for blank input
    pub async fn send_chat(&mut self, text: &str) -> Option<String> {
        let reply = self
            .chat
            .send(&self.api, text)
            .await
            .map(|turn| turn.text.clone());
        self.apply_teardown();
        reply
    }

    /// Submit one of the suggested questions as if typed
    pub async fn suggest_question(&mut self, question: &str) -> Option<String> {
        let reply = self
            .chat
            .suggest_question(&self.api, question)
            .await
            .map(|turn| turn.text.clone());
        self.apply_teardown();
        reply
    }

    /// Run an arbitrary API call and then honor any teardown it caused
    pub async fn call<T, F, Fut>(&mut self, f: F) -> T
    where
        F: FnOnce(ApiClient) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let result = f(self.api.clone()).await;
        self.apply_teardown();
        result
    }
}
