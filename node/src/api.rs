//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the intent ledger over HTTP.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                     | Description                          |
//! |--------|--------------------------|--------------------------------------|
//! | GET    | `/health`                | Liveness probe                       |
//! | GET    | `/status`                | Node status summary                  |
//! | POST   | `/intents`               | Declare an intent                    |
//! | GET    | `/intents/:hash`         | Intent record                        |
//! | POST   | `/intents/:hash/verify`  | Present a signature                  |
//! | POST   | `/intents/:hash/seize`   | Settle a verified intent             |
//! | POST   | `/treasury/deposit`      | Fund the held balance                |
//! | GET    | `/treasury`              | Held balance                         |
//! | GET    | `/accounts/:address`     | Settled balance of an address        |
//! | GET    | `/events?since=N`        | Ledger events after sequence `N`     |
//! | GET    | `/ws`                    | WebSocket for live ledger events     |

use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ghost_contracts::{
    DepositError, EventRecord, EventSink, Intent, IntentLedger, IntentStatus, IntentStore,
    LedgerError, SettlementExecutor, Treasury,
};
use ghost_protocol::crypto::keys::Address;
use ghost_protocol::intent::{IntentHash, IntentPayload};

use crate::metrics::SharedMetrics;
use crate::oracle::PayloadBook;

/// The ledger as hosted by the node: a runtime-selected store and the
/// in-process treasury.
pub type Ledger = IntentLedger<Box<dyn IntentStore>, Treasury>;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone, everything lives behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    pub ledger: Arc<Ledger>,
    /// Payloads retained for the verifying service's audit.
    pub payloads: Arc<PayloadBook>,
    /// Live ledger events for WebSocket subscribers.
    pub event_tx: broadcast::Sender<EventRecord>,
    pub metrics: SharedMetrics,
    /// Address of the verifying service, when one is running.
    pub oracle: Option<Address>,
}

/// Forwards ledger events into a tokio broadcast channel.
pub struct BroadcastSink {
    tx: broadcast::Sender<EventRecord>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<EventRecord>) -> Self {
        Self { tx }
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, record: &EventRecord) {
        // no receivers is fine
        let _ = self.tx.send(record.clone());
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/intents", post(declare_handler))
        .route("/intents/:hash", get(intent_handler))
        .route("/intents/:hash/verify", post(verify_handler))
        .route("/intents/:hash/seize", post(seize_handler))
        .route("/treasury", get(treasury_handler))
        .route("/treasury/deposit", post(deposit_handler))
        .route("/accounts/:address", get(account_handler))
        .route("/events", get(events_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    BadRequest(String),
    Internal(String),
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError::Ledger(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            ApiError::Ledger(e) => match e {
                LedgerError::DuplicateIntent(_) => (StatusCode::CONFLICT, "duplicate_intent"),
                LedgerError::InvalidStateTransition { .. } => {
                    (StatusCode::CONFLICT, "invalid_state_transition")
                }
                LedgerError::InvalidSignature(_) => (StatusCode::UNAUTHORIZED, "invalid_signature"),
                LedgerError::TransferFailure(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "transfer_failure")
                }
                LedgerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                LedgerError::Reentrancy => (StatusCode::CONFLICT, "reentrancy"),
                LedgerError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let error = match self {
            ApiError::Ledger(e) => e.to_string(),
            ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg,
        };
        if status.is_server_error() {
            tracing::error!(%error, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error,
                kind: kind.to_string(),
            }),
        )
            .into_response()
    }
}

fn parse_hash(raw: &str) -> Result<IntentHash, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid intent hash: {e}")))
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid address: {e}")))
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /intents`. At least one of `intent_hash` and `payload`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeclareRequest {
    pub declarer: String,
    #[serde(default)]
    pub intent_hash: Option<String>,
    #[serde(default)]
    pub payload: Option<IntentPayload>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyRequest {
    /// Hex-encoded `r ‖ s ‖ v`, with or without `0x`.
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DepositRequest {
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IntentResponse {
    pub intent_hash: String,
    pub declarer: String,
    pub status: IntentStatus,
    pub status_code: u8,
}

impl From<Intent> for IntentResponse {
    fn from(intent: Intent) -> Self {
        Self {
            intent_hash: intent.intent_hash.to_hex(),
            declarer: intent.declarer.to_hex(),
            status: intent.status,
            status_code: intent.status.code(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeizeResponse {
    pub intent_hash: String,
    pub amount: u64,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub intent_count: usize,
    pub held_balance: u64,
    pub last_event_seq: u64,
    /// Address of the verifying service, if one is running.
    pub oracle: Option<String>,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TreasuryResponse {
    pub held_balance: u64,
    pub total_paid_out: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: String,
    pub balance: u64,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: node status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        version: state.version.clone(),
        intent_count: state.ledger.intent_count(),
        held_balance: state.ledger.executor().held_balance(),
        last_event_seq: state.ledger.events().last_seq(),
        oracle: state.oracle.map(|a| a.to_hex()),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /intents`: declare an intent.
///
/// When a payload is given its canonical hash is the intent hash and the
/// payload is kept for the verifying service. A payload and an explicit
/// hash must agree.
async fn declare_handler(
    State(state): State<AppState>,
    body: Result<Json<DeclareRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<IntentResponse>), ApiError> {
    let Json(req) = body?;
    let declarer = parse_address(&req.declarer)?;

    let explicit = req.intent_hash.as_deref().map(parse_hash).transpose()?;
    let from_payload = match &req.payload {
        Some(payload) => Some(
            payload
                .intent_hash()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        ),
        None => None,
    };
    let intent_hash = match (explicit, from_payload) {
        (Some(a), Some(b)) if a != b => {
            return Err(ApiError::BadRequest(format!(
                "intent_hash {a} does not match payload hash {b}"
            )))
        }
        (Some(h), _) | (None, Some(h)) => h,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "either intent_hash or payload is required".into(),
            ))
        }
    };

    // Retain first so the verifying service finds it when the event fires.
    if let Some(payload) = req.payload {
        state.payloads.insert(intent_hash, payload);
    }

    let timer = state.metrics.operation_latency_seconds.start_timer();
    let result = state.ledger.declare_intent(intent_hash, declarer);
    timer.observe_duration();
    if result.is_err() {
        state.metrics.record_failure("declare");
    }
    result?;

    let intent = state.ledger.get_intent(&intent_hash)?;
    Ok((StatusCode::CREATED, Json(intent.into())))
}

/// `GET /intents/:hash`: the stored record.
async fn intent_handler(
    Path(hash): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<IntentResponse>, ApiError> {
    let intent_hash = parse_hash(&hash)?;
    let intent = state.ledger.get_intent(&intent_hash)?;
    Ok(Json(intent.into()))
}

/// `POST /intents/:hash/verify`: present a signature over the hash.
///
/// Only hex decoding is checked here. Length and encoding problems with the
/// decoded bytes are the ledger's to reject.
async fn verify_handler(
    Path(hash): Path<String>,
    State(state): State<AppState>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<IntentResponse>, ApiError> {
    let intent_hash = parse_hash(&hash)?;
    let Json(req) = body?;
    let raw = req.signature.trim();
    let signature = hex::decode(raw.strip_prefix("0x").unwrap_or(raw))
        .map_err(|e| ApiError::BadRequest(format!("invalid signature hex: {e}")))?;

    let timer = state.metrics.operation_latency_seconds.start_timer();
    let result = state.ledger.verify_intent(&intent_hash, &signature);
    timer.observe_duration();
    if result.is_err() {
        state.metrics.record_failure("verify");
    }
    result?;

    let intent = state.ledger.get_intent(&intent_hash)?;
    Ok(Json(intent.into()))
}

/// `POST /intents/:hash/seize`: settle a verified intent.
async fn seize_handler(
    Path(hash): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SeizeResponse>, ApiError> {
    let intent_hash = parse_hash(&hash)?;

    let timer = state.metrics.operation_latency_seconds.start_timer();
    let result = state.ledger.seize_assets(&intent_hash);
    timer.observe_duration();
    if result.is_err() {
        state.metrics.record_failure("seize");
    }
    let amount = result?;

    state
        .metrics
        .set_treasury_balance(state.ledger.executor().held_balance());
    Ok(Json(SeizeResponse {
        intent_hash: intent_hash.to_hex(),
        amount,
    }))
}

/// `GET /treasury`: held balance and lifetime payouts.
async fn treasury_handler(State(state): State<AppState>) -> Json<TreasuryResponse> {
    let treasury = state.ledger.executor();
    Json(TreasuryResponse {
        held_balance: treasury.held_balance(),
        total_paid_out: treasury.total_paid_out(),
    })
}

/// `POST /treasury/deposit`: add to the held balance.
async fn deposit_handler(
    State(state): State<AppState>,
    body: Result<Json<DepositRequest>, JsonRejection>,
) -> Result<Json<TreasuryResponse>, ApiError> {
    let Json(req) = body?;
    let treasury = state.ledger.executor();
    let held = treasury.deposit(req.amount).map_err(|e| match e {
        DepositError::Overflow { .. } => ApiError::BadRequest(e.to_string()),
        DepositError::Storage(msg) => ApiError::Internal(msg),
    })?;
    state.metrics.set_treasury_balance(held);
    tracing::info!(amount = req.amount, held, "treasury funded");

    Ok(Json(TreasuryResponse {
        held_balance: held,
        total_paid_out: treasury.total_paid_out(),
    }))
}

/// `GET /accounts/:address`: funds settled to an address.
async fn account_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AccountResponse>, ApiError> {
    let address = parse_address(&address)?;
    Ok(Json(AccountResponse {
        address: address.to_hex(),
        balance: state.ledger.executor().balance_of(&address),
    }))
}

/// `GET /events?since=N`: logged events with a sequence number above `N`.
async fn events_handler(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<EventRecord>> {
    Json(state.ledger.events().events_since(query.since))
}

/// `GET /ws`: WebSocket upgrade for live event streaming.
///
/// Clients receive each [`EventRecord`] as JSON. The connection is
/// push-only; client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(record) => {
                        let payload = match serde_json::to_string(&record) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use ghost_contracts::MemoryIntentStore;
    use ghost_protocol::crypto::keys::AgentKeypair;
    use ghost_protocol::crypto::signatures::sign_intent_hash;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// Creates a test AppState with an in-memory store and an empty treasury.
    fn test_app_state() -> AppState {
        let store: Box<dyn IntentStore> = Box::new(MemoryIntentStore::new());
        let ledger = Arc::new(IntentLedger::new(store, Treasury::new()));
        let (event_tx, _) = broadcast::channel(16);
        ledger
            .events()
            .subscribe(Arc::new(BroadcastSink::new(event_tx.clone())));
        let metrics = Arc::new(crate::metrics::NodeMetrics::new().unwrap());
        ledger.events().subscribe(metrics.clone());

        AppState {
            version: "0.1.0-test".into(),
            ledger,
            payloads: Arc::new(PayloadBook::new()),
            event_tx,
            metrics,
            oracle: None,
        }
    }

    /// Sends a GET request and returns the (status, body_bytes).
    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    /// Sends a POST request with JSON body and returns (status, body_bytes).
    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    async fn declare(router: &Router, declarer: &AgentKeypair, hash: IntentHash) -> StatusCode {
        post_json(
            router,
            "/intents",
            serde_json::json!({
                "declarer": declarer.address().to_hex(),
                "intent_hash": hash.to_hex(),
            }),
        )
        .await
        .0
    }

    async fn verify(router: &Router, signer: &AgentKeypair, hash: IntentHash) -> (StatusCode, Vec<u8>) {
        let sig = sign_intent_hash(signer, hash.as_bytes());
        post_json(
            router,
            &format!("/intents/{}/verify", hash.to_hex()),
            serde_json::json!({ "signature": sig.to_hex() }),
        )
        .await
    }

    fn error_kind(body: &[u8]) -> String {
        serde_json::from_slice::<ErrorResponse>(body).unwrap().kind
    }

    // -- 1. Health endpoint --------------------------------------------------

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    // -- 2. Declare by hash, then read it back -------------------------------

    #[tokio::test]
    async fn declare_then_get_intent() {
        let router = create_router(test_app_state());
        let alice = AgentKeypair::generate();
        let hash = IntentHash::from_bytes([1; 32]);

        assert_eq!(declare(&router, &alice, hash).await, StatusCode::CREATED);

        let (status, body) = get(&router, &format!("/intents/{}", hash.to_hex())).await;
        assert_eq!(status, StatusCode::OK);
        let resp: IntentResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.status, IntentStatus::Declared);
        assert_eq!(resp.status_code, 1);
        assert_eq!(resp.declarer, alice.address().to_hex());
    }

    // -- 3. Duplicate declaration is a conflict ------------------------------

    #[tokio::test]
    async fn duplicate_declare_returns_409() {
        let router = create_router(test_app_state());
        let alice = AgentKeypair::generate();
        let hash = IntentHash::from_bytes([2; 32]);

        declare(&router, &alice, hash).await;
        assert_eq!(declare(&router, &alice, hash).await, StatusCode::CONFLICT);
    }

    // -- 4. Declare with payload retains it for the audit --------------------

    #[tokio::test]
    async fn declare_with_payload_hashes_and_retains_it() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let alice = AgentKeypair::generate();
        let payload = IntentPayload::new(500, "de", Utc::now().timestamp());
        let expected = payload.intent_hash().unwrap();

        let (status, body) = post_json(
            &router,
            "/intents",
            serde_json::json!({
                "declarer": alice.address().to_hex(),
                "payload": payload.clone(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let resp: IntentResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.intent_hash, expected.to_hex());
        assert_eq!(state.payloads.get(&expected), Some(payload));
    }

    // -- 5. Malformed declarations are 400 -----------------------------------

    #[tokio::test]
    async fn malformed_declarations_return_400() {
        let router = create_router(test_app_state());
        let alice = AgentKeypair::generate();
        let payload = IntentPayload::new(1, "US", 1_760_000_000);

        let cases = [
            serde_json::json!({ "declarer": "0x1234", "intent_hash": IntentHash::from_bytes([3; 32]).to_hex() }),
            serde_json::json!({ "declarer": alice.address().to_hex() }),
            serde_json::json!({ "declarer": alice.address().to_hex(), "intent_hash": "0xzz" }),
            serde_json::json!({
                "declarer": alice.address().to_hex(),
                "intent_hash": IntentHash::from_bytes([3; 32]).to_hex(),
                "payload": payload,
            }),
            serde_json::json!({ "intent_hash": 7 }),
        ];
        for case in cases {
            let (status, body) = post_json(&router, "/intents", case).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(error_kind(&body), "bad_request");
        }
    }

    // -- 6. Verify with the declarer's signature -----------------------------

    #[tokio::test]
    async fn verify_with_declarer_signature() {
        let router = create_router(test_app_state());
        let alice = AgentKeypair::generate();
        let hash = IntentHash::from_bytes([4; 32]);
        declare(&router, &alice, hash).await;

        let (status, body) = verify(&router, &alice, hash).await;
        assert_eq!(status, StatusCode::OK);
        let resp: IntentResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.status, IntentStatus::Verified);

        // a second verify is a state conflict
        let (status, body) = verify(&router, &alice, hash).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_kind(&body), "invalid_state_transition");
    }

    // -- 7. Signatures that do not authorize are 401 -------------------------

    #[tokio::test]
    async fn bad_signatures_return_401() {
        let router = create_router(test_app_state());
        let alice = AgentKeypair::generate();
        let bob = AgentKeypair::generate();
        let hash = IntentHash::from_bytes([5; 32]);
        declare(&router, &alice, hash).await;

        let (status, body) = verify(&router, &bob, hash).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_kind(&body), "invalid_signature");

        let path = format!("/intents/{}/verify", hash.to_hex());
        let (status, _) = post_json(&router, &path, serde_json::json!({ "signature": "0xdeadbeef" })).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = post_json(&router, &path, serde_json::json!({ "signature": "not-hex" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = get(&router, &format!("/intents/{}", hash.to_hex())).await;
        let resp: IntentResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.status, IntentStatus::Declared);
    }

    // -- 8. Full settlement through the API ----------------------------------

    #[tokio::test]
    async fn seize_pays_declarer() {
        let router = create_router(test_app_state());
        let alice = AgentKeypair::generate();
        let hash = IntentHash::from_bytes([6; 32]);

        let (status, _) = post_json(&router, "/treasury/deposit", serde_json::json!({ "amount": 5 })).await;
        assert_eq!(status, StatusCode::OK);

        declare(&router, &alice, hash).await;
        let seize_path = format!("/intents/{}/seize", hash.to_hex());

        let (status, body) = post_json(&router, &seize_path, serde_json::json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_kind(&body), "invalid_state_transition");

        verify(&router, &alice, hash).await;
        let (status, body) = post_json(&router, &seize_path, serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let resp: SeizeResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.amount, 5);

        let (_, body) = get(&router, &format!("/accounts/{}", alice.address())).await;
        let account: AccountResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(account.balance, 5);

        let (_, body) = get(&router, "/treasury").await;
        let treasury: TreasuryResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(treasury.held_balance, 0);
        assert_eq!(treasury.total_paid_out, 5);
    }

    // -- 9. Refused transfer is 422 and leaves the intent verified -----------

    #[tokio::test]
    async fn refused_transfer_returns_422() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let alice = AgentKeypair::generate();
        let hash = IntentHash::from_bytes([7; 32]);
        state.ledger.executor().deposit(3).unwrap();

        declare(&router, &alice, hash).await;
        verify(&router, &alice, hash).await;
        state.ledger.executor().freeze(alice.address());

        let (status, body) = post_json(&router, &format!("/intents/{}/seize", hash.to_hex()), serde_json::json!({})).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_kind(&body), "transfer_failure");
        assert_eq!(state.ledger.status_of(&hash).unwrap(), IntentStatus::Verified);
        assert_eq!(state.ledger.executor().held_balance(), 3);
    }

    // -- 9b. Overflowing deposit is a bad request ----------------------------

    #[tokio::test]
    async fn overflowing_deposit_is_rejected() {
        let state = test_app_state();
        let router = create_router(state.clone());

        let (status, _) = post_json(&router, "/treasury/deposit", serde_json::json!({ "amount": u64::MAX })).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = post_json(&router, "/treasury/deposit", serde_json::json!({ "amount": 1 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_kind(&body), "bad_request");
        assert_eq!(state.ledger.executor().held_balance(), u64::MAX);
    }

    // -- 10. Unknown and malformed lookups ------------------------------------

    #[tokio::test]
    async fn intent_lookups() {
        let router = create_router(test_app_state());

        let (status, body) = get(&router, &format!("/intents/{}", IntentHash::from_bytes([9; 32]).to_hex())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_kind(&body), "not_found");

        let (status, _) = get(&router, "/intents/0x1234").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get(&router, "/accounts/nobody").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // -- 11. Event polling ---------------------------------------------------

    #[tokio::test]
    async fn events_since_cursor() {
        let router = create_router(test_app_state());
        let alice = AgentKeypair::generate();
        let hash = IntentHash::from_bytes([10; 32]);
        declare(&router, &alice, hash).await;
        verify(&router, &alice, hash).await;

        let (status, body) = get(&router, "/events").await;
        assert_eq!(status, StatusCode::OK);
        let all: Vec<EventRecord> = serde_json::from_slice(&body).unwrap();
        assert_eq!(all.len(), 2);

        let (_, body) = get(&router, "/events?since=1").await;
        let tail: Vec<EventRecord> = serde_json::from_slice(&body).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].seq, 2);
        assert_eq!(
            tail[0].event,
            ghost_contracts::LedgerEvent::IntentVerified { intent_hash: hash }
        );
    }

    // -- 12. Status and metrics reflect the ledger ----------------------------

    #[tokio::test]
    async fn status_reports_ledger_state() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let alice = AgentKeypair::generate();
        declare(&router, &alice, IntentHash::from_bytes([11; 32])).await;
        declare(&router, &alice, IntentHash::from_bytes([11; 32])).await;

        let (status, body) = get(&router, "/status").await;
        assert_eq!(status, StatusCode::OK);
        let resp: StatusResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.intent_count, 1);
        assert_eq!(resp.last_event_seq, 1);
        assert!(resp.oracle.is_none());

        assert_eq!(state.metrics.intents_declared_total.get(), 1);
        assert_eq!(
            state
                .metrics
                .failed_operations_total
                .with_label_values(&["declare"])
                .get(),
            1
        );
    }
}
