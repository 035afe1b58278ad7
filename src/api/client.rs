//! Typed client for the EcoReceipt API
//!
//! A thin layer over [`Gateway`]: it knows the paths and JSON shapes, and how
//! each operation degrades when the gateway yields no response (401 teardown).

use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::error::{extract_detail, ApiError};
use super::gateway::{Gateway, RequestOptions};
use crate::models::{
    EnvironmentalImpact, HealthStatus, NewReceipt, OcrResult, Receipt, SpendingAnalytics, User,
};

/// Assistant reply used whenever the chat endpoint fails or says nothing
pub const CHAT_FALLBACK_REPLY: &str = "I'm having trouble connecting right now. Please try again!";

mod paths {
    pub const LOGIN: &str = "/api/auth/login";
    pub const REGISTER: &str = "/api/auth/register";
    pub const RECEIPTS: &str = "/api/receipts";
    pub const RECEIPTS_OCR: &str = "/api/receipts/ocr";
    pub const ENVIRONMENTAL_IMPACT: &str = "/api/analytics/environmental-impact";
    pub const SPENDING: &str = "/api/analytics/spending";
    pub const CHAT: &str = "/api/ai/chat";
    pub const HEALTH: &str = "/api/health";
}

/// Result of a login or registration attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Authenticated { token: String, user: User },
    /// The server did not issue a token; `detail` is its explanation
    Rejected { detail: String },
}

/// Body of the auth endpoints. Success is decided only by `access_token`
/// being present, never by status code.
// NOTE: keying on payload shape is fragile; if the API ever guarantees
// status codes for auth, branch on those instead.
#[derive(Debug, Deserialize)]
struct AuthReply {
    access_token: Option<String>,
    user: Option<User>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    response: Option<String>,
}

/// Domain operations over an authenticated [`Gateway`]
#[derive(Clone)]
pub struct ApiClient {
    gateway: Gateway,
}

impl ApiClient {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    // ─────────────────────────────────────────────────────────────────────
    // Authentication (no credentials injected, no teardown on 401)
    // ─────────────────────────────────────────────────────────────────────

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthOutcome, ApiError> {
        self.authenticate(
            paths::LOGIN,
            json!({ "email": email, "password": password }),
        )
        .await
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AuthOutcome, ApiError> {
        self.authenticate(
            paths::REGISTER,
            json!({ "email": email, "password": password, "name": name }),
        )
        .await
    }

    async fn authenticate(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<AuthOutcome, ApiError> {
        let response = self
            .gateway
            .http()
            .post(self.gateway.url(path))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        let reply: AuthReply = match serde_json::from_slice(&bytes) {
            Ok(reply) => reply,
            // A non-JSON error page (proxy 502 etc.) is not a credential rejection
            Err(_) if !status.is_success() => {
                return Err(ApiError::Status {
                    status: status.as_u16(),
                    detail: extract_detail(&bytes),
                })
            }
            Err(source) => {
                return Err(ApiError::Decode {
                    path: path.to_string(),
                    source,
                })
            }
        };

        match (reply.access_token, reply.user) {
            (Some(token), Some(user)) => {
                tracing::info!("Authenticated as {} via {}", user.name, path);
                Ok(AuthOutcome::Authenticated { token, user })
            }
            (Some(_), None) => Err(ApiError::Malformed {
                path: path.to_string(),
                reason: "access_token present but no user profile".to_string(),
            }),
            (None, _) => {
                let detail = match reply.detail {
                    Some(_) => extract_detail(&bytes),
                    None => "Unknown error".to_string(),
                };
                tracing::info!("Authentication rejected via {}: {}", path, detail);
                Ok(AuthOutcome::Rejected { detail })
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Dashboard data
    // ─────────────────────────────────────────────────────────────────────

    /// All receipts of the current user. Empty when the session was torn down.
    pub async fn get_receipts(&self) -> Result<Vec<Receipt>, ApiError> {
        match self.get(paths::RECEIPTS).await? {
            Some(response) => decode(paths::RECEIPTS, response).await,
            None => Ok(Vec::new()),
        }
    }

    /// `None` when the session was torn down
    pub async fn get_environmental_impact(&self) -> Result<Option<EnvironmentalImpact>, ApiError> {
        match self.get(paths::ENVIRONMENTAL_IMPACT).await? {
            Some(response) => decode(paths::ENVIRONMENTAL_IMPACT, response).await.map(Some),
            None => Ok(None),
        }
    }

    /// `None` when the session was torn down
    pub async fn get_spending_analytics(&self) -> Result<Option<SpendingAnalytics>, ApiError> {
        match self.get(paths::SPENDING).await? {
            Some(response) => decode(paths::SPENDING, response).await.map(Some),
            None => Ok(None),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Single receipts
    // ─────────────────────────────────────────────────────────────────────

    /// One receipt by id. `None` if it does not exist or the session ended.
    pub async fn get_receipt(&self, id: &str) -> Result<Option<Receipt>, ApiError> {
        let path = receipt_path(id)?;
        match self.get(&path).await? {
            Some(response) if response.status() == StatusCode::NOT_FOUND => Ok(None),
            Some(response) => decode(&path, response).await.map(Some),
            None => Ok(None),
        }
    }

    /// Store a new receipt. `None` if the session ended.
    pub async fn create_receipt(&self, receipt: &NewReceipt) -> Result<Option<Receipt>, ApiError> {
        let body = serde_json::to_value(receipt).map_err(|source| ApiError::Decode {
            path: paths::RECEIPTS.to_string(),
            source,
        })?;
        let options = RequestOptions::new().json(body);
        match self
            .gateway
            .request(Method::POST, paths::RECEIPTS, options)
            .await?
        {
            Some(response) => decode(paths::RECEIPTS, response).await.map(Some),
            None => Ok(None),
        }
    }

    /// Delete a receipt. `false` if it did not exist or the session ended.
    pub async fn delete_receipt(&self, id: &str) -> Result<bool, ApiError> {
        let path = receipt_path(id)?;
        match self
            .gateway
            .request(Method::DELETE, &path, RequestOptions::new())
            .await?
        {
            Some(response) if response.status() == StatusCode::NOT_FOUND => Ok(false),
            Some(response) => {
                decode::<serde_json::Value>(&path, response).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Ask the server to parse a receipt image. `None` if the session ended.
    pub async fn process_receipt_ocr(&self) -> Result<Option<OcrResult>, ApiError> {
        match self
            .gateway
            .request(Method::POST, paths::RECEIPTS_OCR, RequestOptions::new())
            .await?
        {
            Some(response) => decode(paths::RECEIPTS_OCR, response).await.map(Some),
            None => Ok(None),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Chat
    // ─────────────────────────────────────────────────────────────────────

    /// Ask the assistant. Never fails: any problem yields [`CHAT_FALLBACK_REPLY`].
    pub async fn send_chat_message(&self, text: &str) -> String {
        match self.try_send_chat(text).await {
            Ok(Some(reply)) if !reply.trim().is_empty() => reply,
            Ok(_) => {
                tracing::debug!("Chat returned no text, using fallback reply");
                CHAT_FALLBACK_REPLY.to_string()
            }
            Err(e) => {
                tracing::warn!("Chat request failed, using fallback reply: {}", e);
                CHAT_FALLBACK_REPLY.to_string()
            }
        }
    }

    async fn try_send_chat(&self, text: &str) -> Result<Option<String>, ApiError> {
        let options = RequestOptions::new().json(json!({ "message": text }));
        let Some(response) = self
            .gateway
            .request(Method::POST, paths::CHAT, options)
            .await?
        else {
            return Ok(None);
        };
        let reply: ChatReply = decode(paths::CHAT, response).await?;
        Ok(reply.response)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Misc
    // ─────────────────────────────────────────────────────────────────────

    /// Unauthenticated liveness probe
    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        let response = self
            .gateway
            .http()
            .get(self.gateway.url(paths::HEALTH))
            .send()
            .await?;
        decode(paths::HEALTH, response).await
    }

    async fn get(&self, path: &str) -> Result<Option<Response>, ApiError> {
        self.gateway
            .request(Method::GET, path, RequestOptions::new())
            .await
    }
}

fn receipt_path(id: &str) -> Result<String, ApiError> {
    if id.is_empty() || id.contains(['/', '?', '#']) {
        return Err(ApiError::InvalidRequest(format!("invalid receipt id {:?}", id)));
    }
    Ok(format!("{}/{}", paths::RECEIPTS, id))
}

/// Turn a response into `T`, or a `Status` error carrying the server's detail
async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            detail: extract_detail(&bytes),
        });
    }

    serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode {
        path: path.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemorySessionStore, SessionStore};
    use crate::testing::{unreachable_url, MockApi};
    use std::sync::Arc;
    use std::time::Duration;

    fn client_with(base_url: &str, store: Arc<MemorySessionStore>) -> ApiClient {
        ApiClient::new(Gateway::new(base_url, Duration::from_secs(5), store).unwrap())
    }

    fn signed_in(base_url: &str) -> (ApiClient, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::with_session("t1", User::new("2", "B")));
        (client_with(base_url, store.clone()), store)
    }

    #[tokio::test]
    async fn test_login_success_by_token_presence() {
        let api = MockApi::start().await;
        let client = client_with(&api.base_url, Arc::new(MemorySessionStore::new()));

        let outcome = client.login("b@example.com", "pw").await.unwrap();
        match outcome {
            AuthOutcome::Authenticated { token, user } => {
                assert_eq!(token, "abc");
                assert_eq!(user.id, "2");
                assert_eq!(user.name, "B");
            }
            other => panic!("Expected Authenticated, got {:?}", other),
        }

        let hit = &api.hits()[0];
        assert_eq!(hit.path, "/api/auth/login");
        assert_eq!(hit.authorization, None);
        assert_eq!(
            hit.body.as_ref().unwrap(),
            &json!({"email": "b@example.com", "password": "pw"})
        );
    }

    #[tokio::test]
    async fn test_login_401_is_rejection_not_teardown() {
        let api = MockApi::start().await;
        api.set_login_reply(
            StatusCode::UNAUTHORIZED,
            json!({"detail": "Invalid credentials"}),
        );
        let (client, store) = signed_in(&api.base_url);
        let teardown = client.gateway().subscribe_teardown();

        let outcome = client.login("b@example.com", "wrong").await.unwrap();

        assert_eq!(
            outcome,
            AuthOutcome::Rejected {
                detail: "Invalid credentials".to_string()
            }
        );
        assert!(store.load().unwrap().is_some());
        assert!(!teardown.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_token_in_error_status_still_counts_as_success() {
        let api = MockApi::start().await;
        api.set_login_reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"access_token": "odd", "user": {"id": 7, "name": "Q"}}),
        );
        let client = client_with(&api.base_url, Arc::new(MemorySessionStore::new()));

        let outcome = client.login("q@example.com", "pw").await.unwrap();
        assert!(matches!(outcome, AuthOutcome::Authenticated { ref token, .. } if token == "odd"));
    }

    #[tokio::test]
    async fn test_register_sends_name() {
        let api = MockApi::start().await;
        api.set_register_reply(
            StatusCode::BAD_REQUEST,
            json!({"detail": "Email already registered"}),
        );
        let client = client_with(&api.base_url, Arc::new(MemorySessionStore::new()));

        let outcome = client.register("c@example.com", "pw", "C").await.unwrap();

        assert_eq!(
            outcome,
            AuthOutcome::Rejected {
                detail: "Email already registered".to_string()
            }
        );
        assert_eq!(
            api.hits()[0].body.as_ref().unwrap()["name"],
            json!("C")
        );
    }

    #[tokio::test]
    async fn test_get_receipts_decodes_list() {
        let api = MockApi::start().await;
        let (client, _) = signed_in(&api.base_url);

        let receipts = client.get_receipts().await.unwrap();
        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[1].retailer, "Shell");
        assert_eq!(api.hits()[0].authorization.as_deref(), Some("Bearer t1"));
    }

    #[tokio::test]
    async fn test_get_operations_yield_empty_on_teardown() {
        let api = MockApi::start().await;
        api.set_valid_token("someone-else");
        let (client, _) = signed_in(&api.base_url);

        assert!(client.get_receipts().await.unwrap().is_empty());
        assert_eq!(client.get_environmental_impact().await.unwrap(), None);
        assert_eq!(client.get_spending_analytics().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_server_error_is_status_error() {
        let api = MockApi::start().await;
        api.fail("/api/analytics/spending", StatusCode::INTERNAL_SERVER_ERROR);
        let (client, _) = signed_in(&api.base_url);

        match client.get_spending_analytics().await {
            Err(ApiError::Status { status, detail }) => {
                assert_eq!(status, 500);
                assert_eq!(detail, "injected failure");
            }
            other => panic!("Expected Status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_receipt_crud() {
        let api = MockApi::start().await;
        let (client, _) = signed_in(&api.base_url);

        let receipt = client.get_receipt("r-1").await.unwrap().unwrap();
        assert_eq!(receipt.retailer, "Whole Foods Market");
        assert_eq!(client.get_receipt("missing").await.unwrap(), None);

        let ocr = client.process_receipt_ocr().await.unwrap().unwrap();
        assert_eq!(ocr.parsed_receipt.retailer, "Digital Store");

        let created = client
            .create_receipt(&ocr.parsed_receipt)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.id, "r-3");
        assert_eq!(created.line_items.len(), 2);

        assert!(client.delete_receipt("r-3").await.unwrap());
        assert!(!client.delete_receipt("r-3").await.unwrap());
    }

    #[tokio::test]
    async fn test_receipt_id_is_validated() {
        let api = MockApi::start().await;
        let (client, _) = signed_in(&api.base_url);

        let result = client.get_receipt("../auth/login").await;
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
        assert!(api.hits().is_empty());
    }

    #[tokio::test]
    async fn test_chat_reply_and_fallbacks() {
        let api = MockApi::start().await;
        let (client, _) = signed_in(&api.base_url);

        assert_eq!(
            client.send_chat_message("hi").await,
            "You asked: hi".to_string()
        );

        api.set_chat_reply(json!({"response": ""}));
        assert_eq!(client.send_chat_message("hi").await, CHAT_FALLBACK_REPLY);

        api.set_chat_reply(json!({"unexpected": true}));
        assert_eq!(client.send_chat_message("hi").await, CHAT_FALLBACK_REPLY);

        api.fail("/api/ai/chat", StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(client.send_chat_message("hi").await, CHAT_FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_chat_transport_failure_falls_back() {
        let (client, _) = signed_in(&unreachable_url());
        assert_eq!(client.send_chat_message("hi").await, CHAT_FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_health() {
        let api = MockApi::start().await;
        let client = client_with(&api.base_url, Arc::new(MemorySessionStore::new()));
        let health = client.health().await.unwrap();
        assert_eq!(health.status, "healthy");
    }
}
