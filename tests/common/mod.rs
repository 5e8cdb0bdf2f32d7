//! Test utilities and fixtures for PSP dashboard integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, Response, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

pub use psp_dashboard::config::{KvConfig, PspCoreConfig, RateLimitConfig};
pub use psp_dashboard::error::PspError;
pub use psp_dashboard::handlers;
pub use psp_dashboard::inbox::{Backend, InboxStore, KvBackend};
pub use psp_dashboard::models::*;
pub use psp_dashboard::psp::{InvoiceSource, PspClient};
pub use psp_dashboard::state::AppState;

pub const TEST_SECRET: &str = "whsec_test_psp_secret";
pub const TEST_INBOX_TOKEN: &str = "inbox-token-for-tests";
pub const TEST_KV_TOKEN: &str = "kv-token-for-tests";

/// Base URL nothing listens on; every request fails to connect.
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:1";

// ============ Signatures ============

/// Computes a `psp-signature` header value independently of the crate.
pub fn sign_body(body: &str, secret: &str, timestamp: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(format!("{}.{}", timestamp, body).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}

// ============ App setup ============

pub fn test_state(inbox: InboxStore, psp_url: &str) -> AppState {
    AppState {
        inbox,
        psp: PspClient::new(&PspCoreConfig {
            base_url: psp_url.to_string(),
            api_key: None,
        })
        .expect("test PSP client"),
        webhook_secret: Some(Arc::from(TEST_SECRET)),
        webhook_tolerance_secs: None,
        inbox_read_token: Some(Arc::from(TEST_INBOX_TOKEN)),
        dev_mode: false,
    }
}

/// Router without rate limiting.
pub fn test_app(state: AppState) -> Router {
    handlers::router(RateLimitConfig::disabled()).with_state(state)
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn envelope(body: &str) -> WebhookEnvelope {
    WebhookEnvelope::new(
        Some("application/json".to_string()),
        body.to_string(),
        chrono::Utc::now(),
    )
}

// ============ Invoices ============

pub fn invoice(value: Value) -> Invoice {
    Invoice::from_value(value).expect("valid invoice fixture")
}

pub fn waiting_invoice(id: &str) -> Invoice {
    invoice(json!({ "id": id, "status": "waiting" }))
}

pub fn screened_invoice(id: &str) -> Invoice {
    invoice(json!({
        "id": id,
        "status": "confirmed",
        "txHash": "0xabc",
        "amlStatus": "clean",
        "riskScore": 0,
    }))
}

// ============ Fake KV REST server ============

/// In-process stand-in for a Redis-over-REST service. Supports the commands
/// the inbox issues.
#[derive(Default)]
pub struct FakeKv {
    pub lists: HashMap<String, Vec<String>>,
    pub hashes: HashMap<String, HashMap<String, String>>,
    pub commands: Vec<String>,
}

type SharedKv = Arc<Mutex<FakeKv>>;

/// Redis LRANGE/LTRIM index resolution; `None` when the range is empty.
fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

fn as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl FakeKv {
    fn exec(&mut self, args: &[Value]) -> Value {
        let args: Vec<String> = args.iter().map(as_text).collect();
        let Some(cmd) = args.first() else {
            return json!({ "error": "ERR empty command" });
        };
        self.commands.push(cmd.to_uppercase());
        let int = |i: usize| args.get(i).and_then(|s| s.parse::<i64>().ok()).unwrap_or(0);

        match cmd.to_uppercase().as_str() {
            "LPUSH" => {
                let list = self.lists.entry(args[1].clone()).or_default();
                for v in &args[2..] {
                    list.insert(0, v.clone());
                }
                json!({ "result": list.len() })
            }
            "LRANGE" => {
                let list = self.lists.get(&args[1]).cloned().unwrap_or_default();
                let items = match resolve_range(list.len(), int(2), int(3)) {
                    Some((a, b)) => list[a..=b].to_vec(),
                    None => Vec::new(),
                };
                json!({ "result": items })
            }
            "LTRIM" => {
                let list = self.lists.entry(args[1].clone()).or_default();
                *list = match resolve_range(list.len(), int(2), int(3)) {
                    Some((a, b)) => list[a..=b].to_vec(),
                    None => Vec::new(),
                };
                json!({ "result": "OK" })
            }
            "HSET" => {
                let hash = self.hashes.entry(args[1].clone()).or_default();
                let mut added = 0;
                for pair in args[2..].chunks(2) {
                    if let [field, value] = pair
                        && hash.insert(field.clone(), value.clone()).is_none()
                    {
                        added += 1;
                    }
                }
                json!({ "result": added })
            }
            "HGET" => {
                let value = self.hashes.get(&args[1]).and_then(|h| h.get(&args[2]));
                json!({ "result": value })
            }
            "HMGET" => {
                let hash = self.hashes.get(&args[1]);
                let values: Vec<Option<&String>> = args[2..]
                    .iter()
                    .map(|f| hash.and_then(|h| h.get(f)))
                    .collect();
                json!({ "result": values })
            }
            "HDEL" => {
                let removed = match self.hashes.get_mut(&args[1]) {
                    Some(hash) => args[2..].iter().filter(|f| hash.remove(*f).is_some()).count(),
                    None => 0,
                };
                json!({ "result": removed })
            }
            "DEL" => {
                let mut removed = 0;
                for key in &args[1..] {
                    if self.lists.remove(key).is_some() {
                        removed += 1;
                    }
                    if self.hashes.remove(key).is_some() {
                        removed += 1;
                    }
                }
                json!({ "result": removed })
            }
            other => json!({ "error": format!("ERR unknown command '{}'", other) }),
        }
    }
}

fn kv_authorized(headers: &HeaderMap) -> bool {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", TEST_KV_TOKEN))
}

async fn kv_command(
    State(kv): State<SharedKv>,
    headers: HeaderMap,
    Json(args): Json<Vec<Value>>,
) -> impl IntoResponse {
    if !kv_authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" })));
    }
    let reply = kv.lock().unwrap().exec(&args);
    (StatusCode::OK, Json(reply))
}

async fn kv_multi_exec(
    State(kv): State<SharedKv>,
    headers: HeaderMap,
    Json(commands): Json<Vec<Vec<Value>>>,
) -> impl IntoResponse {
    if !kv_authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" })));
    }
    let mut kv = kv.lock().unwrap();
    let replies: Vec<Value> = commands.iter().map(|c| kv.exec(c)).collect();
    (StatusCode::OK, Json(Value::Array(replies)))
}

/// Starts a fake KV service on an ephemeral port. Returns its base URL and
/// a handle on its data.
pub async fn spawn_fake_kv() -> (String, Arc<Mutex<FakeKv>>) {
    let kv: SharedKv = Arc::new(Mutex::new(FakeKv::default()));
    let app = Router::new()
        .route("/", post(kv_command))
        .route("/multi-exec", post(kv_multi_exec))
        .with_state(kv.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), kv)
}

pub fn kv_config(url: &str, token: &str) -> KvConfig {
    KvConfig {
        url: url.to_string(),
        token: token.to_string(),
        prefix: "test:webhooks".to_string(),
    }
}

/// Inbox backed by a fresh fake KV service.
pub async fn durable_store(capacity: usize) -> (InboxStore, Arc<Mutex<FakeKv>>) {
    let (url, kv) = spawn_fake_kv().await;
    let backend = KvBackend::new(&kv_config(&url, TEST_KV_TOKEN), capacity).unwrap();
    (InboxStore::with_durable(backend, capacity), kv)
}

/// Inbox whose durable backend can never be reached.
pub fn broken_durable_store(capacity: usize) -> InboxStore {
    let backend = KvBackend::new(&kv_config(UNREACHABLE_URL, TEST_KV_TOKEN), capacity).unwrap();
    InboxStore::with_durable(backend, capacity)
}

// ============ Fake PSP core ============

/// Raw invoice JSON served by the fake core, in list order.
pub type SharedInvoices = Arc<Mutex<Vec<Value>>>;

#[derive(Deserialize)]
struct PageParams {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn core_get_invoice(
    State(invoices): State<SharedInvoices>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if id == "core-says-no" {
        return (
            StatusCode::OK,
            Json(json!({ "ok": false, "error": "invoice locked" })),
        );
    }
    if id == "no-id-field" {
        return (
            StatusCode::OK,
            Json(json!({ "ok": true, "invoice": { "status": "waiting" } })),
        );
    }

    let found = invoices
        .lock()
        .unwrap()
        .iter()
        .find(|v| v.get("id").and_then(Value::as_str) == Some(id.as_str()))
        .cloned();

    match found {
        Some(invoice) => (StatusCode::OK, Json(json!({ "ok": true, "invoice": invoice }))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "ok": false, "error": "invoice not found" })),
        ),
    }
}

async fn core_list_invoices(
    State(invoices): State<SharedInvoices>,
    Query(params): Query<PageParams>,
) -> Json<Value> {
    let all = invoices.lock().unwrap();
    let page: Vec<Value> = all
        .iter()
        .skip(params.offset.unwrap_or(0))
        .take(params.limit.unwrap_or(50))
        .cloned()
        .collect();
    Json(json!({ "ok": true, "invoices": page }))
}

/// Starts a fake PSP core serving `invoices`. Returns its base URL.
pub async fn spawn_fake_core(invoices: Vec<Value>) -> (String, SharedInvoices) {
    let invoices: SharedInvoices = Arc::new(Mutex::new(invoices));
    let app = Router::new()
        .route("/invoices", get(core_list_invoices))
        .route("/invoices/{id}", get(core_get_invoice))
        .with_state(invoices.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), invoices)
}

// ============ Scripted invoice source ============

/// Plays back a fixed sequence of fetch results. Once the script runs out,
/// every fetch returns a waiting invoice.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Invoice, String>>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Invoice, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every fetch takes `delay` before resolving.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == id).count()
    }
}

impl InvoiceSource for ScriptedSource {
    async fn fetch_invoice(&self, invoice_id: &str) -> Result<Invoice, PspError> {
        self.calls.lock().unwrap().push(invoice_id.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match next {
            Some(Ok(invoice)) => Ok(invoice),
            Some(Err(message)) => Err(PspError::Network(message)),
            None => Ok(waiting_invoice(invoice_id)),
        }
    }
}
