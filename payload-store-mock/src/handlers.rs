/// Axum HTTP handlers for the wallet API endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::store::{MockStore, StoreError};
use crate::types::*;

/// Shared application state
pub type AppState = Arc<MockStore>;

const DEFAULT_PAGE_SIZE: usize = 50;

/// Custom error type for handlers
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Forbidden(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, message).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::NotFound => ApiError::NotFound(message),
            StoreError::Unauthorized => ApiError::Forbidden(message),
            StoreError::ChecksumMismatch | StoreError::AlreadyExists => ApiError::Conflict(message),
            StoreError::Poisoned => ApiError::Internal(message),
        }
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest(format!("Missing field: {}", field)))
}

/// POST /wallet
/// Dispatches on `method`: fetch (`wallet.aes.json`), `update` or `insert`
pub async fn wallet_endpoint(
    State(store): State<AppState>,
    Form(form): Form<WalletForm>,
) -> Result<Response, ApiError> {
    match form.method.as_str() {
        "wallet.aes.json" => {
            let payload = store.fetch(&form.guid, &form.shared_key)?;
            Ok(Json(FetchResponse { payload }).into_response())
        }
        "update" | "insert" => {
            let payload = required(&form.payload, "payload")?;
            let checksum = required(&form.checksum, "checksum")?;
            if let Some(length) = form.length {
                if length != payload.len() {
                    return Err(ApiError::BadRequest("Payload length mismatch".into()));
                }
            }

            if form.method == "insert" {
                store.insert(
                    &form.guid,
                    &form.shared_key,
                    payload,
                    checksum,
                    form.active.as_deref(),
                )?;
            } else {
                let old_checksum = required(&form.old_checksum, "old_checksum")?;
                store.update(
                    &form.guid,
                    &form.shared_key,
                    payload,
                    checksum,
                    old_checksum,
                    form.active.as_deref(),
                )?;
            }
            Ok("Wallet successfully synced with server".into_response())
        }
        other => Err(ApiError::BadRequest(format!("Unknown method: {}", other))),
    }
}

/// GET /balance
/// Returns a map of requested key -> balance entry
pub async fn get_balance(
    State(store): State<AppState>,
    Query(query): Query<KeysQuery>,
) -> Result<Json<HashMap<String, BalanceEntry>>, ApiError> {
    let keys = query.keys();
    let filter = query.filter.as_deref().unwrap_or("all");
    log::debug!("Balance query for {} keys (filter: {})", keys.len(), filter);
    Ok(Json(store.balances(&keys, filter)?))
}

/// GET /multiaddr
/// Returns one page of transactions touching the requested keys
pub async fn get_multiaddr(
    State(store): State<AppState>,
    Query(query): Query<KeysQuery>,
) -> Result<Json<MultiAddressResponse>, ApiError> {
    let keys = query.keys();
    let (n_tx, txs) = store.transactions(
        &keys,
        query.n.unwrap_or(DEFAULT_PAGE_SIZE),
        query.offset.unwrap_or(0),
    )?;
    Ok(Json(MultiAddressResponse {
        wallet: MultiAddressWallet { n_tx },
        txs,
    }))
}

// ============================================================================
// MOCK HELPER ENDPOINTS (not part of the wallet API)
// ============================================================================

/// POST /mock/balance
/// Seed the balance of one xpub or address
pub async fn set_balance(
    State(store): State<AppState>,
    Json(req): Json<MockBalanceRequest>,
) -> Result<StatusCode, ApiError> {
    log::info!("Seeding balance for {}", req.key);
    store.set_balance(&req.key, req.balance)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /mock/tx
/// Attach a transaction to one xpub or address
pub async fn add_transaction(
    State(store): State<AppState>,
    Json(req): Json<MockTxRequest>,
) -> Result<StatusCode, ApiError> {
    log::info!("Seeding transaction {} for {}", req.tx.hash, req.key);
    store.add_transaction(&req.key, req.tx)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}
