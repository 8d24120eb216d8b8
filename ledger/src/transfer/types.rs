//! Transfer request and error types.

use thiserror::Error;

use crate::account::{AccountId, ReceiverRef};
use crate::storage::DbError;

// ---------------------------------------------------------------------------
// TransferRequest
// ---------------------------------------------------------------------------

/// A request to move `amount` minor units from a sender to a receiver.
///
/// The receiver is named through [`ReceiverRef`], so "pay this address"
/// and "pay this account id" are the same request shape. The optional
/// idempotency key makes retried submissions safe: the first commit wins
/// and replays get the original record back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferRequest {
    pub sender_account_id: AccountId,
    pub receiver: ReceiverRef,
    /// Amount in minor units. Must be positive; the engine checks.
    pub amount: u64,
    pub idempotency_key: Option<String>,
}

impl TransferRequest {
    pub fn new(sender_account_id: AccountId, receiver: ReceiverRef, amount: u64) -> Self {
        Self {
            sender_account_id,
            receiver,
            amount,
            idempotency_key: None,
        }
    }

    /// Attach an idempotency key (builder style).
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

// ---------------------------------------------------------------------------
// TransferError
// ---------------------------------------------------------------------------

/// Everything that can go wrong with a transfer.
///
/// All variants except `StorageConflict` and `StorageUnavailable` are
/// terminal verdicts about the request itself. `StorageConflict` means the
/// engine lost all of its bounded retry attempts to concurrent writers and the
/// caller may safely resubmit; `StorageUnavailable` means the storage
/// layer failed and nothing can be said about the request.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Zero, or too large for signed delta arithmetic.
    #[error("transfer amount must be positive")]
    InvalidAmount,

    /// The receiver reference did not resolve to an account.
    #[error("receiver not found: {0}")]
    ReceiverNotFound(ReceiverRef),

    /// The sender account id does not exist.
    #[error("sender not found: {0}")]
    SenderNotFound(AccountId),

    /// Sender and receiver resolved to the same account.
    #[error("self transfer rejected for account {0}")]
    SelfTransferRejected(AccountId),

    /// The sender cannot cover the amount.
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Sender balance at validation time.
        available: u64,
        /// The amount that was requested.
        requested: u64,
    },

    /// Crediting the receiver would overflow its balance.
    #[error("receiver balance would overflow")]
    BalanceOverflow,

    /// The idempotency key is empty or oversized.
    #[error("idempotency key length {length} outside 1..={max}")]
    InvalidIdempotencyKey {
        length: usize,
        max: usize,
    },

    /// The commit lost every one of its bounded retry attempts to
    /// concurrent writers. Safe to retry from the caller's side.
    #[error("transfer abandoned after {attempts} contended commit attempts")]
    StorageConflict {
        attempts: u32,
    },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] DbError),
}

pub type TransferResult<T> = Result<T, TransferError>;
