//! # LedgerEngine — The Transfer Pipeline
//!
//! Validates in a fixed order, commits atomically, retries on contention.
//!
//! ## Why optimistic retry
//!
//! Concurrent transfers touching the same account must serialize without
//! lost updates. Instead of a lock table, every account carries a
//! `version` counter: the engine validates against a snapshot, and the
//! commit scope re-verifies the snapshot versions before writing. A
//! mismatch aborts the scope, the engine re-reads, re-validates the full
//! precondition list, and tries again, up to
//! [`config::MAX_COMMIT_ATTEMPTS`] times. The loser of the last race gets
//! [`TransferError::StorageConflict`], which is explicitly safe to retry.
//!
//! The re-validation per attempt matters: a sender drained by a winning
//! race gets `InsufficientFunds` on the next attempt, not a blind replay
//! of a stale decision.

use std::sync::Arc;

use chrono::Utc;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;

use super::types::{TransferError, TransferRequest, TransferResult};
use crate::account::{Account, AccountStore, DeltaError, ReceiverRef};
use crate::config;
use crate::journal::{AppendError, Journal, TransactionId, TransactionRecord};
use crate::storage::DbError;

// ---------------------------------------------------------------------------
// Commit plumbing
// ---------------------------------------------------------------------------

/// Abort reasons inside the two-tree commit scope.
#[derive(Debug)]
enum CommitAbort {
    /// The balance primitive refused.
    Delta(DeltaError),
    /// The journal append failed.
    Append(AppendError),
    /// The idempotency key was claimed between the fast-path check and
    /// the commit. Carries the id of the transfer that won.
    Duplicate(TransactionId),
}

impl From<DeltaError> for CommitAbort {
    fn from(e: DeltaError) -> Self {
        CommitAbort::Delta(e)
    }
}

impl From<AppendError> for CommitAbort {
    fn from(e: AppendError) -> Self {
        CommitAbort::Append(e)
    }
}

/// What a single commit attempt came back with.
enum CommitOutcome {
    /// The transfer committed; here is its record.
    Committed(TransactionRecord),
    /// Someone else already committed under this idempotency key.
    Replayed(TransactionId),
    /// Lost a version race. Re-validate and try again.
    Contended,
}

// ---------------------------------------------------------------------------
// LedgerEngine
// ---------------------------------------------------------------------------

/// The transfer pipeline. Cheap to clone; both stores are behind `Arc`.
#[derive(Clone)]
pub struct LedgerEngine {
    accounts: Arc<AccountStore>,
    journal: Arc<Journal>,
}

impl LedgerEngine {
    pub fn new(accounts: Arc<AccountStore>, journal: Arc<Journal>) -> Self {
        Self { accounts, journal }
    }

    /// Execute a transfer end to end.
    ///
    /// Preconditions are checked in a fixed order and the first failure
    /// wins: positive amount, receiver resolves, not a self-transfer,
    /// sender exists and can cover the amount. On success the debit, the
    /// credit, and the journal append are one atomic commit, flushed
    /// before this returns.
    ///
    /// With an idempotency key, a replayed request returns the original
    /// record and moves nothing.
    pub fn transfer(&self, request: &TransferRequest) -> TransferResult<TransactionRecord> {
        if let Some(key) = request.idempotency_key.as_deref() {
            if key.is_empty() || key.len() > config::MAX_IDEMPOTENCY_KEY_LENGTH {
                return Err(TransferError::InvalidIdempotencyKey {
                    length: key.len(),
                    max: config::MAX_IDEMPOTENCY_KEY_LENGTH,
                });
            }
            // Fast path: the key may already be claimed, in which case
            // the whole pipeline is a read.
            if let Some(existing) = self.journal.find_by_idempotency_key(key)? {
                tracing::debug!(
                    key,
                    transaction = %existing.transaction_id,
                    "idempotent replay, returning original record"
                );
                return Ok(existing);
            }
        }

        // Positive, and small enough for signed delta arithmetic.
        if request.amount == 0 || request.amount > i64::MAX as u64 {
            return Err(TransferError::InvalidAmount);
        }

        let mut attempts = 0;
        while attempts < config::MAX_COMMIT_ATTEMPTS {
            attempts += 1;

            // Full precondition re-check on every attempt.
            let receiver = self
                .accounts
                .resolve(&request.receiver)?
                .ok_or_else(|| TransferError::ReceiverNotFound(request.receiver.clone()))?;
            if receiver.account_id == request.sender_account_id {
                return Err(TransferError::SelfTransferRejected(request.sender_account_id));
            }
            let sender = self
                .accounts
                .get(&request.sender_account_id)?
                .ok_or(TransferError::SenderNotFound(request.sender_account_id))?;
            if sender.balance < request.amount {
                return Err(TransferError::InsufficientFunds {
                    available: sender.balance,
                    requested: request.amount,
                });
            }

            match self.try_commit(
                &sender,
                &receiver,
                request.amount,
                request.idempotency_key.as_deref(),
            )? {
                CommitOutcome::Committed(record) => {
                    self.journal.flush()?;
                    tracing::info!(
                        transaction = %record.transaction_id,
                        sender = %record.sender_account_id,
                        receiver = %record.receiver_account_id,
                        amount = record.amount,
                        seq = record.seq,
                        "transfer committed"
                    );
                    return Ok(record);
                }
                CommitOutcome::Replayed(id) => {
                    let existing = self.journal.get(&id)?.ok_or_else(|| {
                        TransferError::StorageUnavailable(DbError::NotFound(format!(
                            "journal record {id} behind claimed idempotency key"
                        )))
                    })?;
                    tracing::debug!(
                        transaction = %id,
                        "lost idempotency race, returning winner's record"
                    );
                    return Ok(existing);
                }
                CommitOutcome::Contended => {
                    tracing::debug!(
                        attempt = attempts,
                        sender = %request.sender_account_id,
                        "commit contended, re-validating"
                    );
                    continue;
                }
            }
        }

        tracing::warn!(
            sender = %request.sender_account_id,
            attempts,
            "transfer abandoned after repeated commit conflicts"
        );
        Err(TransferError::StorageConflict { attempts })
    }

    /// One commit attempt: a transaction over the `accounts` and `journal`
    /// trees. The snapshots carry the versions the deltas will verify.
    fn try_commit(
        &self,
        sender: &Account,
        receiver: &Account,
        amount: u64,
        idempotency_key: Option<&str>,
    ) -> TransferResult<CommitOutcome> {
        // Fixed per attempt so a sled-internal replay of the closure
        // cannot mint two ids for one commit.
        let transaction_id = TransactionId::generate();
        let timestamp = Utc::now();
        let debit = -(amount as i64);
        let credit = amount as i64;

        let outcome = (self.accounts.tree(), self.journal.tree()).transaction(
            |(accounts_tx, journal_tx)| -> sled::transaction::ConflictableTransactionResult<
                TransactionRecord,
                CommitAbort,
            > {
                if let Some(key) = idempotency_key {
                    if let Some(winner) =
                        Journal::find_duplicate_in::<CommitAbort>(journal_tx, key)?
                    {
                        return Err(ConflictableTransactionError::Abort(CommitAbort::Duplicate(
                            winner,
                        )));
                    }
                }

                AccountStore::apply_delta_in::<CommitAbort>(accounts_tx, sender, debit)?;
                AccountStore::apply_delta_in::<CommitAbort>(accounts_tx, receiver, credit)?;

                let seq = Journal::allocate_seq_in::<CommitAbort>(journal_tx)?;
                let record = TransactionRecord {
                    transaction_id,
                    sender_account_id: sender.account_id,
                    receiver_account_id: receiver.account_id,
                    amount,
                    timestamp,
                    seq,
                    idempotency_key: idempotency_key.map(str::to_string),
                };
                Journal::append_in::<CommitAbort>(journal_tx, &record)?;
                Ok(record)
            },
        );

        match outcome {
            Ok(record) => Ok(CommitOutcome::Committed(record)),
            Err(TransactionError::Abort(CommitAbort::Duplicate(id))) => {
                Ok(CommitOutcome::Replayed(id))
            }
            Err(TransactionError::Abort(CommitAbort::Delta(DeltaError::VersionMismatch(_)))) => {
                Ok(CommitOutcome::Contended)
            }
            Err(TransactionError::Abort(CommitAbort::Delta(e))) => {
                Err(Self::map_delta_error(e, sender))
            }
            Err(TransactionError::Abort(CommitAbort::Append(AppendError::Corrupt(msg)))) => Err(
                TransferError::StorageUnavailable(DbError::Serialization(msg)),
            ),
            Err(TransactionError::Storage(e)) => {
                Err(TransferError::StorageUnavailable(DbError::Sled(e)))
            }
        }
    }

    /// Translate an in-scope delta refusal into the transfer taxonomy.
    ///
    /// With the version check shielding both accounts, most of these are
    /// unreachable from this engine (a drained sender shows up as
    /// `Contended` first), but the primitive is honest and so is the
    /// mapping.
    fn map_delta_error(e: DeltaError, sender: &Account) -> TransferError {
        match e {
            DeltaError::NotFound(id) if id == sender.account_id => {
                TransferError::SenderNotFound(id)
            }
            DeltaError::NotFound(id) => TransferError::ReceiverNotFound(ReceiverRef::ById(id)),
            DeltaError::InsufficientFunds {
                available,
                requested,
            } => TransferError::InsufficientFunds {
                available,
                requested,
            },
            DeltaError::Overflow { .. } => TransferError::BalanceOverflow,
            DeltaError::Corrupt(msg) => {
                TransferError::StorageUnavailable(DbError::Serialization(msg))
            }
            // Handled by the Contended arm before this function is called.
            DeltaError::VersionMismatch(id) => {
                TransferError::StorageUnavailable(DbError::NotFound(format!(
                    "unexpected version mismatch for {id} outside retry path"
                )))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
