//! Explorer HTTP API. Responses use a `{success, data}` envelope; failures
//! carry `{success: false, message}` with a matching status code.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ledger_core::{
    transaction::amount_from_i64, Block, IntegrityFault, Ledger, LedgerError, Transaction,
    TransactionLocation,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::constants::{BLOCKS_PER_PAGE, MAX_BLOCKS_PER_REQUEST};
use crate::miner::{Miner, MinerStatus};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub miners: Vec<Arc<Miner>>,
}

#[derive(Serialize)]
struct Envelope<T> {
    success: bool,
    data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        let body = serde_json::json!({ "success": false, "message": message });
        (status, Json(body)).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::TransactionNotAdmitted { .. }
            | LedgerError::InvalidAmount(_)
            | LedgerError::MissingSignature
            | LedgerError::MissingSender(_)
            | LedgerError::SignatureVerificationFailed
            | LedgerError::InsufficientBalance { .. }
            | LedgerError::DuplicateTransaction(_)
            | LedgerError::InvalidKey(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/api/chain/info", get(chain_info))
        .route("/api/chain/full", get(chain_full))
        .route("/api/blocks", get(list_blocks))
        .route("/api/blocks/{identifier}", get(get_block))
        .route("/api/transactions", post(submit_transaction))
        .route("/api/transactions/{id}", get(get_transaction))
        .route("/api/mint", post(mint))
        .route("/api/balances", get(balances))
        .route("/api/balance/{address}", get(balance))
        .route("/api/miners", get(miners))
        .route("/api/pending-transactions", get(pending))
        .route("/api/validate", get(validate))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn chain_info(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.ledger.chain_summary())
}

async fn chain_full(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.ledger.snapshot())
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<usize>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct BlockPage {
    blocks: Vec<Block>,
    total: usize,
    page: usize,
    limit: usize,
}

async fn list_blocks(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> impl IntoResponse {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(BLOCKS_PER_PAGE)
        .clamp(1, MAX_BLOCKS_PER_REQUEST);
    let (blocks, total) = state.ledger.blocks_page(page, limit);
    ok(BlockPage {
        blocks,
        total,
        page,
        limit,
    })
}

async fn get_block(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> ApiResult<Block> {
    let block = if !identifier.is_empty() && identifier.bytes().all(|b| b.is_ascii_digit()) {
        identifier
            .parse::<u64>()
            .ok()
            .and_then(|index| state.ledger.block_by_index(index))
    } else {
        state.ledger.block_by_hash(&identifier)
    };
    block
        .map(ok)
        .ok_or_else(|| ApiError::NotFound(format!("block {identifier} not found")))
}

async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<TransactionLocation> {
    state
        .ledger
        .transaction_by_id(&id)
        .map(ok)
        .ok_or_else(|| ApiError::NotFound(format!("transaction {id} not found")))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Submitted {
    id: String,
    pending_count: usize,
}

async fn submit_transaction(
    State(state): State<AppState>,
    payload: Result<Json<Transaction>, JsonRejection>,
) -> ApiResult<Submitted> {
    let Json(tx) = payload?;
    let id = tx.id().to_string();
    state.ledger.submit_transaction(tx)?;
    Ok(ok(Submitted {
        id,
        pending_count: state.ledger.pending_count(),
    }))
}

#[derive(Deserialize)]
struct MintRequest {
    address: String,
    amount: i64,
}

async fn mint(
    State(state): State<AppState>,
    payload: Result<Json<MintRequest>, JsonRejection>,
) -> ApiResult<Transaction> {
    let Json(request) = payload?;
    if request.address.trim().is_empty() {
        return Err(ApiError::BadRequest("address is required".to_string()));
    }
    let amount = amount_from_i64(request.amount)?;
    Ok(ok(state.ledger.mint(request.address, amount)))
}

async fn balances(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.ledger.all_balances())
}

#[derive(Serialize)]
struct AddressBalance {
    address: String,
    balance: i128,
}

async fn balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    let balance = state.ledger.balance_of(&address);
    ok(AddressBalance { address, balance })
}

async fn miners(State(state): State<AppState>) -> impl IntoResponse {
    let statuses: Vec<MinerStatus> = state
        .miners
        .iter()
        .map(|miner| miner.status(&state.ledger))
        .collect();
    ok(statuses)
}

async fn pending(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.ledger.pending_transactions())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Validation {
    is_valid: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    invalid_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fault: Option<IntegrityFault>,
}

async fn validate(State(state): State<AppState>) -> ApiResult<Validation> {
    match state.ledger.validate() {
        Ok(()) => Ok(ok(Validation {
            is_valid: true,
            message: "chain is valid".to_string(),
            invalid_block: None,
            fault: None,
        })),
        Err(err @ LedgerError::ChainIntegrityViolation { index, fault }) => Ok(ok(Validation {
            is_valid: false,
            message: err.to_string(),
            invalid_block: Some(index),
            fault: Some(fault),
        })),
        Err(other) => Err(ApiError::Internal(other.to_string())),
    }
}
