//! REST API handlers for registry and wallet operations
//!
//! The caller identity is taken from a `caller` field in request bodies and
//! trusted as-is.

use crate::api::websocket::WsBroadcaster;
use crate::core::call::TxId;
use crate::core::{Address, EventRecord};
use crate::multisig::{
    CreateWallet, ExecutionOutcome, MultiSigWallet, MultisigError, Proposal, Transaction,
    TxFilter, TxQuery, TxStatus, WalletInfo,
};
use crate::runtime::{InvokeError, Receipt, Runtime, RuntimeError};
use crate::storage::Storage;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub runtime: Arc<RwLock<Runtime>>,
    pub storage: Arc<Storage>,
    pub ws_broadcaster: Arc<WsBroadcaster>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct RegistryResponse {
    pub address: Address,
    pub admin: Address,
    pub wallet_count: usize,
}

#[derive(Debug, Serialize)]
pub struct MemberWalletsResponse {
    pub member: Address,
    pub total: usize,
    pub wallets: Vec<WalletInfo>,
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub address: Address,
    pub members: Vec<Address>,
    pub required: usize,
    pub description: String,
    pub registry: Option<Address>,
    pub balance: u128,
    pub pending: usize,
    pub executed: usize,
    pub created_at: String,
}

impl WalletResponse {
    fn new(wallet: &MultiSigWallet, balance: u128) -> Self {
        Self {
            address: wallet.address.clone(),
            members: wallet.members().to_vec(),
            required: wallet.required(),
            description: wallet.description(),
            registry: wallet.registry().cloned(),
            balance,
            pending: wallet.transaction_count(TxFilter::PENDING),
            executed: wallet.transaction_count(TxFilter::EXECUTED),
            created_at: wallet.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: TxId,
    pub title: String,
    pub description: String,
    pub destination: Address,
    pub value: u128,
    /// Hex-encoded call data
    pub data: String,
    pub status: TxStatus,
    pub confirmations: Vec<Address>,
    pub confirmed: bool,
    pub submitter: Address,
    pub submitted_at: String,
    pub executed_at: Option<String>,
    pub last_failure: Option<String>,
}

impl TransactionResponse {
    fn new(tx: &Transaction, required: usize) -> Self {
        Self {
            id: tx.id,
            title: tx.title.clone(),
            description: tx.description.clone(),
            destination: tx.destination.clone(),
            value: tx.value,
            data: hex::encode(&tx.data),
            status: tx.status(),
            confirmations: tx.confirmations().to_vec(),
            confirmed: tx.confirmation_count() >= required,
            submitter: tx.submitter.clone(),
            submitted_at: tx.submitted_at.to_rfc3339(),
            executed_at: tx.executed_at.map(|t| t.to_rfc3339()),
            last_failure: tx.last_failure.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub id: TxId,
    pub executed: bool,
    pub failure: Option<String>,
}

impl From<Receipt> for ReceiptResponse {
    fn from(receipt: Receipt) -> Self {
        let failure = match &receipt.execution {
            Some(ExecutionOutcome::Failed(reason)) => Some(reason.clone()),
            _ => None,
        };
        Self {
            id: receipt.id,
            executed: receipt.executed(),
            failure,
        }
    }
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct DeployRegistryRequest {
    pub deployer: Address,
}

#[derive(Deserialize)]
pub struct CreateWalletRequest {
    pub caller: Address,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub members: Vec<Address>,
    pub required: usize,
    pub seed: Option<u64>,
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub caller: Address,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub destination: Address,
    #[serde(default)]
    pub value: u128,
    /// Hex-encoded call data
    pub data: Option<String>,
}

#[derive(Deserialize)]
pub struct TxActionRequest {
    pub caller: Address,
    pub id: TxId,
}

#[derive(Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub executed: bool,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
    pub from: Option<TxId>,
    pub to: Option<TxId>,
}

#[derive(Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: u64,
    pub limit: Option<usize>,
}

const DEFAULT_PAGE: usize = 50;

// ============================================================================
// Error mapping
// ============================================================================

fn multisig_status(e: &MultisigError) -> StatusCode {
    match e {
        MultisigError::Unauthorized(_) => StatusCode::FORBIDDEN,
        MultisigError::WalletNotFound(_) | MultisigError::TransactionNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        _ => StatusCode::BAD_REQUEST,
    }
}

fn status_of(e: &RuntimeError) -> StatusCode {
    match e {
        RuntimeError::Multisig(e) | RuntimeError::Invoke(InvokeError::Multisig(e)) => {
            multisig_status(e)
        }
        RuntimeError::RegistryNotFound(_) | RuntimeError::TokenNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn api_error(e: RuntimeError) -> (StatusCode, Json<ApiError>) {
    (
        status_of(&e),
        Json(ApiError {
            error: e.to_string(),
        }),
    )
}

fn bad_request(error: String) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError { error }))
}

/// Push events recorded after `seq` to subscribers and persist the state
fn publish(state: &ApiState, runtime: &Runtime, seq: u64) {
    for record in runtime.events_since(seq) {
        state.ws_broadcaster.publish(record.clone());
    }

    if let Err(e) = state.storage.save(runtime) {
        log::error!("Failed to save state: {}", e);
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - Health check
pub async fn health_check() -> &'static str {
    "OK"
}

/// POST /api/registries - Deploy a registry
pub async fn create_registry(
    State(state): State<ApiState>,
    Json(req): Json<DeployRegistryRequest>,
) -> ApiResult<RegistryResponse> {
    let mut runtime = state.runtime.write().await;
    let seq = runtime.events().last_seq();
    let address = runtime.deploy_registry(&req.deployer);
    publish(&state, &runtime, seq);

    Ok(Json(RegistryResponse {
        address,
        admin: req.deployer,
        wallet_count: 0,
    }))
}

/// GET /api/registries/{addr}/wallets/{wallet} - Registry entry of a wallet
pub async fn get_registry_wallet(
    State(state): State<ApiState>,
    Path((registry, wallet)): Path<(String, String)>,
) -> ApiResult<WalletInfo> {
    let runtime = state.runtime.read().await;
    let registry = runtime.registry(&Address::new(registry)).map_err(api_error)?;
    let info = registry
        .wallet_info(&Address::new(wallet))
        .map_err(|e| api_error(e.into()))?;
    Ok(Json(info.clone()))
}

/// GET /api/registries/{addr}/members/{member} - Wallets of a member
pub async fn get_member_wallets(
    State(state): State<ApiState>,
    Path((registry, member)): Path<(String, String)>,
    Query(page): Query<PageQuery>,
) -> ApiResult<MemberWalletsResponse> {
    let runtime = state.runtime.read().await;
    let registry = runtime.registry(&Address::new(registry)).map_err(api_error)?;
    let member = Address::new(member);

    Ok(Json(MemberWalletsResponse {
        total: registry.number_of_wallets_for_member(&member),
        wallets: registry.wallets_for_member(
            &member,
            page.offset,
            page.limit.unwrap_or(DEFAULT_PAGE),
        ),
        member,
    }))
}

/// POST /api/registries/{addr}/wallets - Create a wallet through a registry
pub async fn create_wallet(
    State(state): State<ApiState>,
    Path(registry): Path<String>,
    Json(req): Json<CreateWalletRequest>,
) -> ApiResult<WalletResponse> {
    let request = CreateWallet {
        name: req.name,
        description: req.description,
        members: req.members,
        required: req.required,
        seed: req.seed,
    };

    let mut runtime = state.runtime.write().await;
    let seq = runtime.events().last_seq();
    let address = runtime
        .create_wallet(&req.caller, &Address::new(registry), request)
        .map_err(api_error)?;
    publish(&state, &runtime, seq);

    let wallet = runtime.wallet(&address).map_err(api_error)?;
    Ok(Json(WalletResponse::new(wallet, runtime.balance_of(&address))))
}

/// GET /api/wallets/{addr} - Wallet details
pub async fn get_wallet(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> ApiResult<WalletResponse> {
    let runtime = state.runtime.read().await;
    let address = Address::new(address);
    let wallet = runtime.wallet(&address).map_err(api_error)?;
    Ok(Json(WalletResponse::new(wallet, runtime.balance_of(&address))))
}

/// POST /api/wallets/{addr}/submit - Submit a transaction
pub async fn submit_transaction(
    State(state): State<ApiState>,
    Path(wallet): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<ReceiptResponse> {
    let data = match req.data.as_deref() {
        Some(hex_str) => hex::decode(hex_str.trim_start_matches("0x"))
            .map_err(|e| bad_request(format!("Invalid call data: {}", e)))?,
        None => Vec::new(),
    };
    let proposal = Proposal::new(req.title, req.description, req.destination, req.value, data);

    let mut runtime = state.runtime.write().await;
    let seq = runtime.events().last_seq();
    let receipt = runtime
        .submit(&req.caller, &Address::new(wallet), proposal)
        .map_err(api_error)?;
    publish(&state, &runtime, seq);

    Ok(Json(receipt.into()))
}

/// POST /api/wallets/{addr}/confirm - Confirm a transaction
pub async fn confirm_transaction(
    State(state): State<ApiState>,
    Path(wallet): Path<String>,
    Json(req): Json<TxActionRequest>,
) -> ApiResult<ReceiptResponse> {
    let mut runtime = state.runtime.write().await;
    let seq = runtime.events().last_seq();
    let receipt = runtime
        .confirm(&req.caller, &Address::new(wallet), req.id)
        .map_err(api_error)?;
    publish(&state, &runtime, seq);

    Ok(Json(receipt.into()))
}

/// POST /api/wallets/{addr}/revoke - Revoke a confirmation
pub async fn revoke_confirmation(
    State(state): State<ApiState>,
    Path(wallet): Path<String>,
    Json(req): Json<TxActionRequest>,
) -> ApiResult<ReceiptResponse> {
    let mut runtime = state.runtime.write().await;
    let seq = runtime.events().last_seq();
    runtime
        .revoke(&req.caller, &Address::new(wallet), req.id)
        .map_err(api_error)?;
    publish(&state, &runtime, seq);

    Ok(Json(ReceiptResponse {
        id: req.id,
        executed: false,
        failure: None,
    }))
}

/// POST /api/wallets/{addr}/execute - Execute a confirmed transaction
pub async fn execute_transaction(
    State(state): State<ApiState>,
    Path(wallet): Path<String>,
    Json(req): Json<TxActionRequest>,
) -> ApiResult<ReceiptResponse> {
    let mut runtime = state.runtime.write().await;
    let seq = runtime.events().last_seq();
    let receipt = runtime
        .execute(&req.caller, &Address::new(wallet), req.id)
        .map_err(api_error)?;
    publish(&state, &runtime, seq);

    Ok(Json(receipt.into()))
}

/// GET /api/wallets/{addr}/transactions - List transactions
pub async fn list_transactions(
    State(state): State<ApiState>,
    Path(wallet): Path<String>,
    Query(params): Query<TransactionsQuery>,
) -> ApiResult<Vec<TransactionResponse>> {
    let runtime = state.runtime.read().await;
    let wallet = runtime.wallet(&Address::new(wallet)).map_err(api_error)?;

    let filter = if params.pending || params.executed {
        TxFilter::from_flags(params.pending, params.executed)
    } else {
        TxFilter::all()
    };
    let query = TxQuery::new(filter, params.offset, params.limit.unwrap_or(DEFAULT_PAGE))
        .range(params.from.unwrap_or(0), params.to.unwrap_or(TxId::MAX));

    let mut transactions = Vec::new();
    for id in wallet.transaction_ids(&query) {
        let tx = wallet.transaction(id).map_err(|e| api_error(e.into()))?;
        transactions.push(TransactionResponse::new(tx, wallet.required()));
    }

    Ok(Json(transactions))
}

/// GET /api/wallets/{addr}/transactions/{id} - Get one transaction
pub async fn get_transaction(
    State(state): State<ApiState>,
    Path((wallet, id)): Path<(String, TxId)>,
) -> ApiResult<TransactionResponse> {
    let runtime = state.runtime.read().await;
    let wallet = runtime.wallet(&Address::new(wallet)).map_err(api_error)?;
    let tx = wallet.transaction(id).map_err(|e| api_error(e.into()))?;
    Ok(Json(TransactionResponse::new(tx, wallet.required())))
}

/// GET /api/events - Events after `since`
pub async fn get_events(
    State(state): State<ApiState>,
    Query(params): Query<EventsQuery>,
) -> Json<Vec<EventRecord>> {
    let runtime = state.runtime.read().await;
    let records = runtime
        .events_since(params.since)
        .iter()
        .take(params.limit.unwrap_or(DEFAULT_PAGE))
        .cloned()
        .collect();
    Json(records)
}
