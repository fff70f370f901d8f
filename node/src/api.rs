//! # REST API
//!
//! Builds the axum router that exposes the node's HTTP interface. All
//! endpoints share application state through axum's `State` extractor; the
//! pipeline sits behind a single `RwLock`, which is exactly the
//! serialization the protocol's single-writer model asks for.
//!
//! ## Endpoints
//!
//! | Method | Path                  | Description                          |
//! |--------|-----------------------|--------------------------------------|
//! | GET    | `/health`             | Liveness probe                       |
//! | GET    | `/status`             | Node status summary                  |
//! | POST   | `/transactions`       | Submit a transaction id              |
//! | GET    | `/blocks`             | All blocks, compact form             |
//! | GET    | `/blocks/:index`      | Block by index                       |
//! | GET    | `/transactions/:id`   | Containing block for a transaction   |
//! | GET    | `/dag`                | Parent-to-children adjacency map     |
//! | GET    | `/leader`             | Run an election, report the leader   |
//! | GET    | `/audit`              | Full-ledger integrity audit          |
//! | GET    | `/performance`        | Throughput and latency counters      |

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tessera_protocol::ledger::{BlockSummary, TransactionLocation};
use tessera_protocol::pipeline::{Pipeline, SubmitReceipt, SubmitStatus};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything heavy sits behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Process start time, for uptime reporting.
    pub started_at: Instant,
    /// The protocol pipeline. One lock, one writer at a time.
    pub pipeline: Arc<RwLock<Pipeline>>,
    /// Prometheus metric handles.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body for `POST /transactions`.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Opaque transaction identifier to order and store.
    pub transaction_id: String,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Blocks stored, genesis included.
    pub blocks: usize,
    /// Current leader, if one has been elected.
    pub leader: Option<String>,
    /// Validators currently blacklisted.
    pub blacklisted: usize,
    /// Seconds since process start.
    pub uptime_seconds: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /leader`.
#[derive(Debug, Serialize)]
pub struct LeaderResponse {
    /// The elected leader, absent when no candidate survived the filters.
    pub leader: Option<String>,
}

/// Response payload for `GET /audit`.
#[derive(Debug, Serialize)]
pub struct AuditResponse {
    /// Whether every digest recomputed and every parent resolved.
    pub valid: bool,
    /// The first failure, when invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
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
        .route("/transactions", post(submit_handler))
        .route("/transactions/:id", get(transaction_handler))
        .route("/blocks", get(blocks_handler))
        .route("/blocks/:index", get(block_by_index_handler))
        .route("/dag", get(dag_handler))
        .route("/leader", get(leader_handler))
        .route("/audit", get(audit_handler))
        .route("/performance", get(performance_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
///
/// Liveness probe for orchestrators. Subsystem health belongs in
/// `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — node status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pipeline = state.pipeline.read();
    let blocks = pipeline.ledger().len();
    let leader = pipeline.engine().leader().map(str::to_string);
    let blacklisted = pipeline.trust().read().blacklisted().len();
    drop(pipeline);

    state.metrics.ledger_blocks.set(blocks as i64);
    state.metrics.blacklisted_validators.set(blacklisted as i64);

    Json(StatusResponse {
        version: state.version.clone(),
        blocks,
        leader,
        blacklisted,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /transactions` — the submission contract.
///
/// Runs the full pipeline for one transaction: election, three phases,
/// block admission. Committed submissions return 200; rejections return
/// 422 with the failure in the receipt body.
async fn submit_handler(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> (StatusCode, Json<SubmitReceipt>) {
    let timer = state.metrics.submission_latency_seconds.start_timer();
    let receipt = {
        let mut pipeline = state.pipeline.write();
        let receipt = pipeline.submit(&req.transaction_id);
        state.metrics.leader_elections_total.inc();
        state
            .metrics
            .ledger_blocks
            .set(pipeline.ledger().len() as i64);
        state
            .metrics
            .blacklisted_validators
            .set(pipeline.trust().read().blacklisted().len() as i64);
        receipt
    };
    timer.observe_duration();

    match receipt.status {
        SubmitStatus::Committed => {
            state.metrics.transactions_committed_total.inc();
            state.metrics.blocks_appended_total.inc();
            (StatusCode::OK, Json(receipt))
        }
        SubmitStatus::Rejected => {
            state.metrics.transactions_rejected_total.inc();
            (StatusCode::UNPROCESSABLE_ENTITY, Json(receipt))
        }
    }
}

/// `GET /blocks` — all blocks in compact form, append order.
async fn blocks_handler(State(state): State<AppState>) -> Json<Vec<BlockSummary>> {
    Json(state.pipeline.read().ledger().list_blocks())
}

/// `GET /blocks/:index` — a single block by index.
async fn block_by_index_handler(
    Path(index): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<BlockSummary>, StatusCode> {
    let pipeline = state.pipeline.read();
    pipeline
        .ledger()
        .list_blocks()
        .into_iter()
        .find(|b| b.index == index)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// `GET /transactions/:id` — the block containing a transaction.
async fn transaction_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TransactionLocation>, StatusCode> {
    state
        .pipeline
        .read()
        .ledger()
        .find_transaction(&id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// `GET /dag` — the parent-to-children adjacency map, hex digests.
async fn dag_handler(State(state): State<AppState>) -> Json<HashMap<String, Vec<String>>> {
    Json(state.pipeline.read().ledger().dag())
}

/// `GET /leader` — runs an election and reports the result.
async fn leader_handler(State(state): State<AppState>) -> Json<LeaderResponse> {
    let leader = state.pipeline.write().elect_leader();
    state.metrics.leader_elections_total.inc();
    Json(LeaderResponse { leader })
}

/// `GET /audit` — full-ledger integrity audit.
async fn audit_handler(State(state): State<AppState>) -> Json<AuditResponse> {
    match state.pipeline.read().ledger().audit() {
        Ok(()) => Json(AuditResponse {
            valid: true,
            error: None,
        }),
        Err(e) => Json(AuditResponse {
            valid: false,
            error: Some(e.to_string()),
        }),
    }
}

/// `GET /performance` — throughput and latency counters.
async fn performance_handler(
    State(state): State<AppState>,
) -> Json<tessera_protocol::consensus::PerformanceReport> {
    Json(state.pipeline.read().performance())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NodeMetrics;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tessera_protocol::consensus::EngineConfig;
    use tessera_protocol::ledger::LedgerConfig;
    use tessera_protocol::pipeline::PipelineConfig;
    use tower::util::ServiceExt;

    fn test_state() -> AppState {
        let pipeline = Pipeline::bootstrap(
            ["NodeA", "NodeB", "NodeC", "NodeD"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            EngineConfig::default(),
            LedgerConfig::default(),
            PipelineConfig::default(),
        );
        for v in ["NodeA", "NodeB", "NodeC", "NodeD"] {
            pipeline.trust().write().set_score(v, 0.9);
        }
        AppState {
            version: "test".to_string(),
            started_at: Instant::now(),
            pipeline: Arc::new(RwLock::new(pipeline)),
            metrics: Arc::new(NodeMetrics::new()),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_reports_genesis() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["blocks"], 1);
        assert_eq!(json["blacklisted"], 0);
    }

    #[tokio::test]
    async fn submission_commits_and_is_queryable() {
        let state = test_state();
        let app = create_router(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/transactions")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"transaction_id":"Tx1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let receipt = body_json(response).await;
        assert_eq!(receipt["status"], "committed");
        let block_hash = receipt["block_hash"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/transactions/Tx1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let location = body_json(response).await;
        assert_eq!(location["containing_block_hash"], block_hash);
    }

    #[tokio::test]
    async fn duplicate_submission_is_rejected() {
        let app = create_router(test_state());

        let submit = |app: Router| async move {
            app.oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/transactions")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"transaction_id":"TxDup"}"#))
                    .unwrap(),
            )
            .await
            .unwrap()
        };

        let first = submit(app.clone()).await;
        assert_eq!(first.status(), StatusCode::OK);

        let second = submit(app).await;
        assert_eq!(second.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let receipt = body_json(second).await;
        assert_eq!(receipt["status"], "rejected");
    }

    #[tokio::test]
    async fn missing_block_is_404() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/blocks/999")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn audit_reports_valid_ledger() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/audit").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["valid"], true);
    }

    #[tokio::test]
    async fn dag_contains_genesis() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/dag").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json.as_object().unwrap().len(), 1);
    }
}
