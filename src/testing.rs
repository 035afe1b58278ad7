// In-process mock of the EcoReceipt API for tests
//
// Binds an axum server to an ephemeral localhost port and records every hit.
// Behavior is steered per test: which token is valid, what login returns,
// which paths fail with which status, and how long the dashboard endpoints
// take (so concurrency can be observed).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};

/// One request as seen by the mock server
#[derive(Debug, Clone)]
pub struct Hit {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<Value>,
}

struct MockState {
    hits: Mutex<Vec<Hit>>,
    /// When set, only this bearer token is accepted
    valid_token: Mutex<Option<String>>,
    login_reply: Mutex<(StatusCode, Value)>,
    register_reply: Mutex<(StatusCode, Value)>,
    failures: Mutex<HashMap<String, StatusCode>>,
    chat_reply: Mutex<Option<Value>>,
    receipts: Mutex<Vec<Value>>,
    dashboard_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Handle to a running mock server
pub struct MockApi {
    pub base_url: String,
    state: Arc<MockState>,
}

pub fn sample_receipts() -> Vec<Value> {
    vec![
        json!({
            "id": "r-1", "user_id": "2", "retailer": "Whole Foods Market",
            "date": "2025-01-15", "time": "14:32",
            "items": [{"name": "Organic Bananas", "quantity": 2, "price": 3.98}],
            "subtotal": 3.98, "tax": 0.32, "total": 4.30, "category": "Groceries",
            "logo": null, "created_at": "2025-01-15T14:33:00"
        }),
        json!({
            "id": "r-2", "user_id": "2", "retailer": "Shell",
            "date": "2025-01-10", "time": "08:05",
            "items": [{"name": "Regular Unleaded", "quantity": 1, "price": 40.00}],
            "subtotal": 40.00, "tax": 3.20, "total": 43.20, "category": "Gas",
            "logo": null, "created_at": "2025-01-10T08:06:00"
        }),
    ]
}

fn auth_success(token: &str, id: Value, name: &str) -> Value {
    json!({
        "access_token": token,
        "token_type": "bearer",
        "user": {"id": id, "name": name, "email": "b@example.com"}
    })
}

impl MockApi {
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            hits: Mutex::new(Vec::new()),
            valid_token: Mutex::new(None),
            login_reply: Mutex::new((StatusCode::OK, auth_success("abc", json!(2), "B"))),
            register_reply: Mutex::new((StatusCode::OK, auth_success("reg", json!("u-3"), "C"))),
            failures: Mutex::new(HashMap::new()),
            chat_reply: Mutex::new(None),
            receipts: Mutex::new(sample_receipts()),
            dashboard_delay: Mutex::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });

        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.state.hits.lock().unwrap().clone()
    }

    pub fn hits_on(&self, path: &str) -> usize {
        self.hits().iter().filter(|h| h.path == path).count()
    }

    pub fn set_valid_token(&self, token: &str) {
        *self.state.valid_token.lock().unwrap() = Some(token.to_string());
    }

    pub fn set_login_reply(&self, status: StatusCode, body: Value) {
        *self.state.login_reply.lock().unwrap() = (status, body);
    }

    pub fn set_register_reply(&self, status: StatusCode, body: Value) {
        *self.state.register_reply.lock().unwrap() = (status, body);
    }

    /// Make `path` answer with `status` (401 included)
    pub fn fail(&self, path: &str, status: StatusCode) {
        self.state
            .failures
            .lock()
            .unwrap()
            .insert(path.to_string(), status);
    }

    pub fn heal(&self, path: &str) {
        self.state.failures.lock().unwrap().remove(path);
    }

    /// Raw JSON body for the chat endpoint (default echoes the question)
    pub fn set_chat_reply(&self, body: Value) {
        *self.state.chat_reply.lock().unwrap() = Some(body);
    }

    pub fn set_receipts(&self, receipts: Vec<Value>) {
        *self.state.receipts.lock().unwrap() = receipts;
    }

    pub fn set_dashboard_delay(&self, delay: Duration) {
        *self.state.dashboard_delay.lock().unwrap() = delay;
    }

    /// Highest number of dashboard requests observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

/// A base URL nothing listens on
pub fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn reply(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };
    let authorization = header("authorization");
    let parsed: Option<Value> = serde_json::from_slice(&body).ok();

    state.hits.lock().unwrap().push(Hit {
        method: method.to_string(),
        path: path.clone(),
        authorization: authorization.clone(),
        content_type: header("content-type"),
        body: parsed.clone(),
    });

    // Unauthenticated endpoints
    match (method.as_str(), path.as_str()) {
        ("GET", "/api/health") => {
            return reply(
                StatusCode::OK,
                json!({"status": "healthy", "message": "EcoReceipt API is running"}),
            )
        }
        ("POST", "/api/auth/login") => {
            let (status, body) = state.login_reply.lock().unwrap().clone();
            return reply(status, body);
        }
        ("POST", "/api/auth/register") => {
            let (status, body) = state.register_reply.lock().unwrap().clone();
            return reply(status, body);
        }
        _ => {}
    }

    let token = authorization.and_then(|v| v.strip_prefix("Bearer ").map(String::from));
    let valid = match (&token, state.valid_token.lock().unwrap().as_deref()) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(t), Some(expected)) => t == expected,
    };
    if !valid {
        return reply(StatusCode::UNAUTHORIZED, json!({"detail": "Invalid token"}));
    }

    let is_dashboard = matches!(
        path.as_str(),
        "/api/receipts" | "/api/analytics/environmental-impact" | "/api/analytics/spending"
    ) && method == Method::GET;

    if is_dashboard {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *state.dashboard_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        state.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    if let Some(status) = state.failures.lock().unwrap().get(&path).copied() {
        return reply(status, json!({"detail": "injected failure"}));
    }

    let receipts = state.receipts.lock().unwrap().clone();
    match (method.as_str(), path.as_str()) {
        ("GET", "/api/receipts") => reply(StatusCode::OK, Value::Array(receipts)),
        ("POST", "/api/receipts") => {
            let mut created = parsed.unwrap_or_else(|| json!({}));
            created["id"] = json!(format!("r-{}", receipts.len() + 1));
            created["user_id"] = json!("2");
            state.receipts.lock().unwrap().push(created.clone());
            reply(StatusCode::OK, created)
        }
        ("POST", "/api/receipts/ocr") => reply(
            StatusCode::OK,
            json!({
                "parsed_receipt": {
                    "retailer": "Digital Store", "date": "2025-01-20", "time": "12:00",
                    "items": [
                        {"name": "Sample Item 1", "quantity": 1, "price": 15.99},
                        {"name": "Sample Item 2", "quantity": 2, "price": 24.98}
                    ],
                    "subtotal": 40.97, "tax": 4.10, "total": 45.07, "category": "General",
                    "logo": "https://placehold.co/50x50/4CAF50/FFFFFF?text=DS"
                },
                "message": "Receipt processed successfully (mock data)"
            }),
        ),
        ("GET", "/api/analytics/environmental-impact") => {
            let count = receipts.len() as f64;
            reply(
                StatusCode::OK,
                json!({
                    "trees_saved": count * 0.037,
                    "water_saved": count * 6.25,
                    "co2_reduced": count * 1.25
                }),
            )
        }
        ("GET", "/api/analytics/spending") => reply(
            StatusCode::OK,
            json!({
                "total_spent": 47.5,
                "category_breakdown": {"Groceries": 4.3, "Gas": 43.2},
                "monthly_spending": [{"month": "Dec", "amount": 20.0}, {"month": "Jan", "amount": 27.5}]
            }),
        ),
        ("POST", "/api/ai/chat") => {
            let body = state.chat_reply.lock().unwrap().clone().unwrap_or_else(|| {
                let message = parsed
                    .as_ref()
                    .and_then(|b| b.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or_default()
                    .to_string();
                json!({"response": format!("You asked: {}", message)})
            });
            reply(StatusCode::OK, body)
        }
        (m, p) if p.starts_with("/api/receipts/") => {
            let id = &p["/api/receipts/".len()..];
            let position = receipts.iter().position(|r| r["id"] == json!(id));
            match (m, position) {
                ("GET", Some(i)) => reply(StatusCode::OK, receipts[i].clone()),
                ("DELETE", Some(i)) => {
                    state.receipts.lock().unwrap().remove(i);
                    reply(
                        StatusCode::OK,
                        json!({"message": "Receipt deleted successfully"}),
                    )
                }
                _ => reply(StatusCode::NOT_FOUND, json!({"detail": "Receipt not found"})),
            }
        }
        _ => reply(StatusCode::NOT_FOUND, json!({"detail": "Not Found"})),
    }
}
