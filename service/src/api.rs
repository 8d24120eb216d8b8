//! # REST API
//!
//! Builds the axum router that exposes the payment service's HTTP
//! interface. All endpoints share application state through axum's
//! `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                               | Description                            |
//! |--------|------------------------------------|----------------------------------------|
//! | GET    | `/health`                          | Liveness probe                         |
//! | GET    | `/status`                          | Service status summary                 |
//! | POST   | `/api/accounts`                    | Provision a wallet account             |
//! | GET    | `/api/accounts/:id`                | Account by id                          |
//! | GET    | `/api/accounts/resolve`            | Account by payment address (`?address=`) |
//! | POST   | `/api/transfers`                   | Execute a transfer                     |
//! | GET    | `/api/transactions`                | History (`?account_id=&limit=`)        |
//! | POST   | `/api/recurring-instructions`      | Create a standing payment instruction  |
//! | GET    | `/api/recurring-instructions`      | List instructions (`?owner_account_id=`) |
//! | POST   | `/api/recurring-instructions/sweep`| Run a due-payment sweep now            |
//! | POST   | `/api/savings-goals`               | Create a savings goal                  |
//! | GET    | `/api/savings-goals`               | List goals (`?owner_account_id=`)      |
//!
//! ## Error Contract
//!
//! Failures return a JSON body `{ "error": "...", "code": "..." }` where
//! `code` is a stable machine-readable identifier. Validation and business
//! refusals map to 400, unknown accounts to 404, uniqueness and commit
//! conflicts to 409, and storage trouble to 503.

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use vega_ledger::account::{Account, AccountError, AccountId, AccountStore, Address, ReceiverRef};
use vega_ledger::journal::Journal;
use vega_ledger::recurring::{Frequency, RecurringScheduler, ScheduleError};
use vega_ledger::savings::{GoalError, GoalStore};
use vega_ledger::storage::db::{DbError, VegaDB};
use vega_ledger::transfer::{LedgerEngine, TransferError, TransferRequest};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything is either behind `Arc` or a handle over
/// shared storage.
#[derive(Clone)]
pub struct AppState {
    /// The service's reported version string.
    pub version: String,
    /// When this process started; `/status` reports uptime from it.
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Account provisioning and lookup.
    pub accounts: Arc<AccountStore>,
    /// Committed transfer history.
    pub journal: Arc<Journal>,
    /// The transfer engine; validates and commits balance movements.
    pub engine: LedgerEngine,
    /// Recurring payment scheduler, shared with the background sweep task.
    pub scheduler: Arc<RecurringScheduler>,
    /// Savings goal bookkeeping.
    pub goals: GoalStore,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
    /// Persistent storage engine, for whole-database figures on `/status`.
    pub db: VegaDB,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// The returned router is ready to be served on the configured HTTP port.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/api/accounts", post(create_account_handler))
        .route("/api/accounts/resolve", get(resolve_account_handler))
        .route("/api/accounts/:id", get(get_account_handler))
        .route("/api/transfers", post(create_transfer_handler))
        .route("/api/transactions", get(list_transactions_handler))
        .route(
            "/api/recurring-instructions",
            post(create_instruction_handler).get(list_instructions_handler),
        )
        .route("/api/recurring-instructions/sweep", post(sweep_handler))
        .route(
            "/api/savings-goals",
            post(create_goal_handler).get(list_goals_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

/// Request payload for `POST /api/accounts`.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    /// Optional custom payment address. Generated when omitted.
    pub address: Option<String>,
}

/// Request payload for `POST /api/transfers`.
///
/// `amount` is accepted as a signed integer so that a negative amount
/// comes back as the ledger's own refusal instead of a bare
/// deserialization error.
#[derive(Debug, Deserialize)]
pub struct CreateTransferRequest {
    /// The debited account.
    pub sender_account_id: AccountId,
    /// Where the money goes: `{"by_address": "..."}` or `{"by_id": "..."}`.
    pub receiver: ReceiverRef,
    /// Amount in minor units. Must be positive.
    pub amount: i64,
    /// Optional retry-dedup key. Same key replays the original commit.
    pub idempotency_key: Option<String>,
}

/// Request payload for `POST /api/recurring-instructions`.
#[derive(Debug, Deserialize)]
pub struct CreateInstructionRequest {
    /// The paying account.
    pub owner_account_id: AccountId,
    /// Receiver payment address, resolved and pinned at creation.
    pub receiver_address: String,
    /// Amount per execution in minor units. Must be positive.
    pub amount: i64,
    /// One of "daily", "weekly", or "monthly".
    pub frequency: String,
}

/// Request payload for `POST /api/savings-goals`.
#[derive(Debug, Deserialize)]
pub struct CreateGoalRequest {
    /// The account the goal belongs to.
    pub owner_account_id: AccountId,
    /// Display name, trimmed before storing.
    pub name: String,
    /// Target amount in minor units. Must be positive.
    pub target_amount: i64,
}

/// Query parameters for `GET /api/accounts/resolve`.
#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub address: String,
}

/// Query parameters for `GET /api/transactions`.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub account_id: AccountId,
    /// Page size; clamped server-side to the configured maximum.
    pub limit: Option<usize>,
}

/// Query parameters for owner-scoped listings.
#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner_account_id: AccountId,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Service software version.
    pub version: String,
    /// Seconds since process start.
    pub uptime_seconds: u64,
    /// Number of provisioned accounts.
    pub accounts: u64,
    /// Number of transfers committed to the journal.
    pub committed_transfers: u64,
    /// Number of standing payment instructions on the books.
    pub recurring_instructions: u64,
    /// Number of savings goals.
    pub savings_goals: u64,
    /// Sum of all balances in minor units.
    pub total_balance: u128,
    /// Approximate on-disk database footprint in bytes.
    pub db_size_bytes: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Error body returned by every endpoint on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable description of what went wrong.
    pub error: String,
    /// Stable machine-readable identifier, e.g. `insufficient_funds`.
    pub code: String,
}

// ---------------------------------------------------------------------------
// Error Mapping
// ---------------------------------------------------------------------------

fn error_body(status: StatusCode, code: &str, message: String) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message,
            code: code.to_string(),
        }),
    )
        .into_response()
}

fn account_error_response(err: AccountError) -> Response {
    let (status, code) = match &err {
        AccountError::InvalidAddress(_) => (StatusCode::BAD_REQUEST, "invalid_address"),
        AccountError::InvalidAccountId(_) => (StatusCode::BAD_REQUEST, "invalid_account_id"),
        AccountError::AddressTaken(_) => (StatusCode::CONFLICT, "address_taken"),
        AccountError::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable"),
    };
    error_body(status, code, err.to_string())
}

fn transfer_error_response(err: TransferError) -> Response {
    let (status, code) = match &err {
        TransferError::InvalidAmount => (StatusCode::BAD_REQUEST, "invalid_amount"),
        TransferError::InvalidIdempotencyKey { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_idempotency_key")
        }
        TransferError::SelfTransferRejected(_) => {
            (StatusCode::BAD_REQUEST, "self_transfer_rejected")
        }
        TransferError::InsufficientFunds { .. } => (StatusCode::BAD_REQUEST, "insufficient_funds"),
        TransferError::BalanceOverflow => (StatusCode::BAD_REQUEST, "balance_overflow"),
        TransferError::SenderNotFound(_) => (StatusCode::NOT_FOUND, "sender_not_found"),
        TransferError::ReceiverNotFound(_) => (StatusCode::NOT_FOUND, "receiver_not_found"),
        TransferError::StorageConflict { .. } => (StatusCode::CONFLICT, "storage_conflict"),
        TransferError::StorageUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable")
        }
    };
    error_body(status, code, err.to_string())
}

fn schedule_error_response(err: ScheduleError) -> Response {
    let (status, code) = match &err {
        ScheduleError::InvalidFrequency(_) => (StatusCode::BAD_REQUEST, "invalid_frequency"),
        ScheduleError::InvalidAmount => (StatusCode::BAD_REQUEST, "invalid_amount"),
        ScheduleError::SelfPaymentRejected => (StatusCode::BAD_REQUEST, "self_payment_rejected"),
        ScheduleError::OwnerNotFound(_) => (StatusCode::NOT_FOUND, "owner_not_found"),
        ScheduleError::ReceiverNotFound(_) => (StatusCode::NOT_FOUND, "receiver_not_found"),
        ScheduleError::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable"),
    };
    error_body(status, code, err.to_string())
}

fn goal_error_response(err: GoalError) -> Response {
    let (status, code) = match &err {
        GoalError::InvalidName(_) => (StatusCode::BAD_REQUEST, "invalid_goal_name"),
        GoalError::InvalidTarget => (StatusCode::BAD_REQUEST, "invalid_goal_target"),
        GoalError::OwnerNotFound(_) => (StatusCode::NOT_FOUND, "owner_not_found"),
        GoalError::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable"),
    };
    error_body(status, code, err.to_string())
}

fn storage_error_response(err: DbError) -> Response {
    error_body(
        StatusCode::SERVICE_UNAVAILABLE,
        "storage_unavailable",
        format!("storage unavailable: {}", err),
    )
}

fn account_not_found_response(id: &AccountId) -> Response {
    error_body(
        StatusCode::NOT_FOUND,
        "account_not_found",
        format!("account not found: {}", id),
    )
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the service is alive.
///
/// This is the liveness probe for orchestrators (k8s, systemd, etc.).
/// It intentionally does not check storage health — that belongs in
/// `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — returns a service status summary.
///
/// Counter reads that fail fall back to zero rather than failing the
/// whole endpoint; `/status` is for dashboards, not for correctness.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = (chrono::Utc::now() - state.started_at).num_seconds().max(0) as u64;

    let resp = StatusResponse {
        version: state.version.clone(),
        uptime_seconds: uptime,
        accounts: state.accounts.count() as u64,
        committed_transfers: state.journal.committed_count().unwrap_or(0),
        recurring_instructions: state.scheduler.instruction_count() as u64,
        savings_goals: state.goals.count() as u64,
        total_balance: state.accounts.total_balance().unwrap_or(0),
        db_size_bytes: state.db.size_on_disk().unwrap_or(0),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Json(resp)
}

/// `POST /api/accounts` — provisions a new wallet account.
///
/// The account opens with the standard starting balance. A custom
/// payment address can be supplied in the body; when omitted, one is
/// generated.
async fn create_account_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateAccountRequest>,
) -> impl IntoResponse {
    let address = match req.address.as_deref() {
        Some(raw) => match Address::parse(raw) {
            Ok(address) => Some(address),
            Err(e) => return account_error_response(e),
        },
        None => None,
    };

    match state.accounts.create(address) {
        Ok(account) => {
            state.metrics.accounts_created_total.inc();
            tracing::info!(
                account_id = %account.account_id,
                address = %account.address,
                "account provisioned"
            );
            (
                StatusCode::CREATED,
                Json(serde_json::to_value(account).unwrap()),
            )
                .into_response()
        }
        Err(e) => account_error_response(e),
    }
}

/// `GET /api/accounts/:id` — returns an account by its opaque id.
async fn get_account_handler(
    Path(id): Path<AccountId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.accounts.get(&id) {
        Ok(Some(account)) => {
            (StatusCode::OK, Json(serde_json::to_value(account).unwrap())).into_response()
        }
        Ok(None) => account_not_found_response(&id),
        Err(e) => storage_error_response(e),
    }
}

/// `GET /api/accounts/resolve?address=` — returns an account by its
/// payment address.
async fn resolve_account_handler(
    Query(query): Query<ResolveQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.accounts.get_by_address(&query.address) {
        Ok(Some(account)) => {
            (StatusCode::OK, Json(serde_json::to_value(account).unwrap())).into_response()
        }
        Ok(None) => error_body(
            StatusCode::NOT_FOUND,
            "account_not_found",
            format!("no account registered under address {:?}", query.address),
        ),
        Err(e) => storage_error_response(e),
    }
}

/// `POST /api/transfers` — validates and commits a transfer.
///
/// On success the committed journal record comes back with 201. A
/// request replayed under a known idempotency key returns the original
/// record, indistinguishable from the first response.
async fn create_transfer_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateTransferRequest>,
) -> impl IntoResponse {
    if req.amount <= 0 {
        state.metrics.transfers_rejected_total.inc();
        return transfer_error_response(TransferError::InvalidAmount);
    }

    let mut request = TransferRequest::new(req.sender_account_id, req.receiver, req.amount as u64);
    if let Some(key) = req.idempotency_key {
        request = request.with_idempotency_key(key);
    }

    let started = std::time::Instant::now();
    match state.engine.transfer(&request) {
        Ok(record) => {
            state
                .metrics
                .transfer_latency_seconds
                .observe(started.elapsed().as_secs_f64());
            state.metrics.transfers_committed_total.inc();
            (
                StatusCode::CREATED,
                Json(serde_json::to_value(record).unwrap()),
            )
                .into_response()
        }
        Err(e) => {
            if !matches!(e, TransferError::StorageUnavailable(_)) {
                state.metrics.transfers_rejected_total.inc();
            }
            transfer_error_response(e)
        }
    }
}

/// `GET /api/transactions?account_id=&limit=` — returns the account's
/// transfer history, newest first.
async fn list_transactions_handler(
    Query(query): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.accounts.get(&query.account_id) {
        Ok(Some(_)) => {}
        Ok(None) => return account_not_found_response(&query.account_id),
        Err(e) => return storage_error_response(e),
    }

    match state.journal.list_for_account(&query.account_id, query.limit) {
        Ok(records) => {
            (StatusCode::OK, Json(serde_json::to_value(records).unwrap())).into_response()
        }
        Err(e) => storage_error_response(e),
    }
}

/// `POST /api/recurring-instructions` — creates a standing payment
/// instruction. First execution lands one period after creation.
async fn create_instruction_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateInstructionRequest>,
) -> impl IntoResponse {
    if req.amount <= 0 {
        return schedule_error_response(ScheduleError::InvalidAmount);
    }
    let frequency = match req.frequency.parse::<Frequency>() {
        Ok(frequency) => frequency,
        Err(e) => return schedule_error_response(e),
    };

    match state.scheduler.create(
        &req.owner_account_id,
        &req.receiver_address,
        req.amount as u64,
        frequency,
        chrono::Utc::now(),
    ) {
        Ok(instruction) => {
            state
                .metrics
                .recurring_instructions_active
                .set(state.scheduler.instruction_count() as i64);
            (
                StatusCode::CREATED,
                Json(serde_json::to_value(instruction).unwrap()),
            )
                .into_response()
        }
        Err(e) => schedule_error_response(e),
    }
}

/// `GET /api/recurring-instructions?owner_account_id=` — lists the
/// owner's standing instructions, soonest due first.
async fn list_instructions_handler(
    Query(query): Query<OwnerQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.accounts.get(&query.owner_account_id) {
        Ok(Some(_)) => {}
        Ok(None) => return account_not_found_response(&query.owner_account_id),
        Err(e) => return storage_error_response(e),
    }

    match state.scheduler.list_for_owner(&query.owner_account_id) {
        Ok(instructions) => (
            StatusCode::OK,
            Json(serde_json::to_value(instructions).unwrap()),
        )
            .into_response(),
        Err(e) => schedule_error_response(e),
    }
}

/// `POST /api/recurring-instructions/sweep` — runs a due-payment sweep
/// immediately and returns the report.
///
/// The background task sweeps on its own timer; this endpoint exists for
/// operators and tests that don't want to wait for it.
async fn sweep_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.run_due(chrono::Utc::now()) {
        Ok(report) => {
            state.metrics.sweeps_total.inc();
            state
                .metrics
                .recurring_executed_total
                .inc_by(report.executed as u64);
            state
                .metrics
                .recurring_failed_total
                .inc_by(report.failed as u64);
            state
                .metrics
                .recurring_instructions_active
                .set(state.scheduler.instruction_count() as i64);
            (StatusCode::OK, Json(serde_json::to_value(report).unwrap())).into_response()
        }
        Err(e) => schedule_error_response(e),
    }
}

/// `POST /api/savings-goals` — creates a savings goal for an account.
///
/// Goals are bookkeeping only; they never touch the balance.
async fn create_goal_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateGoalRequest>,
) -> impl IntoResponse {
    if req.target_amount <= 0 {
        return goal_error_response(GoalError::InvalidTarget);
    }

    match state
        .goals
        .create(&req.owner_account_id, &req.name, req.target_amount as u64)
    {
        Ok(goal) => (
            StatusCode::CREATED,
            Json(serde_json::to_value(goal).unwrap()),
        )
            .into_response(),
        Err(e) => goal_error_response(e),
    }
}

/// `GET /api/savings-goals?owner_account_id=` — lists the owner's goals,
/// oldest first.
async fn list_goals_handler(
    Query(query): Query<OwnerQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.accounts.get(&query.owner_account_id) {
        Ok(Some(_)) => {}
        Ok(None) => return account_not_found_response(&query.owner_account_id),
        Err(e) => return storage_error_response(e),
    }

    match state.goals.list_for_owner(&query.owner_account_id) {
        Ok(goals) => (StatusCode::OK, Json(serde_json::to_value(goals).unwrap())).into_response(),
        Err(e) => storage_error_response(e),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
