//! # AccountStore — Provisioning, Lookup, and the Balance Primitive
//!
//! Owns the `accounts` and `addresses` trees. Provisioning writes both in
//! one transaction so address uniqueness and account existence can never
//! disagree. The star of the file is [`AccountStore::apply_delta_in`]: the
//! single primitive through which every balance in the system changes,
//! only ever inside a transactional scope supplied by the caller.

use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Transactional, Tree};
use thiserror::Error;

use super::types::{Account, AccountError, AccountId, AccountResult, Address, ReceiverRef};
use crate::config;
use crate::storage::db::{decode, encode};
use crate::storage::{DbError, DbResult, VegaDB};

// ---------------------------------------------------------------------------
// DeltaError
// ---------------------------------------------------------------------------

/// Refusals from the balance delta primitive.
///
/// These abort the surrounding transactional scope; nothing is written.
/// `VersionMismatch` is the optimistic-concurrency signal: the caller's
/// snapshot went stale between validation and commit, and the whole
/// operation should be re-validated and re-attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeltaError {
    /// The account does not exist in the `accounts` tree.
    #[error("account not found: {0}")]
    NotFound(AccountId),

    /// The stored version moved past the caller's snapshot.
    #[error("account {0} was modified concurrently")]
    VersionMismatch(AccountId),

    /// A debit would take the balance below zero.
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Balance at the moment the debit was refused.
        available: u64,
        /// The debit that was requested.
        requested: u64,
    },

    /// A credit would overflow `u64`.
    ///
    /// If you're hitting this, someone holds more than 18.4 quintillion
    /// minor units. That's either a bug or an attack.
    #[error("balance overflow: current {current}, credit {credit}")]
    Overflow {
        /// Balance before the refused credit.
        current: u64,
        /// The credit that caused the overflow.
        credit: u64,
    },

    /// The stored account record failed to decode or re-encode.
    #[error("corrupt account record: {0}")]
    Corrupt(String),
}

fn abort_with<E: From<DeltaError>>(e: DeltaError) -> ConflictableTransactionError<E> {
    ConflictableTransactionError::Abort(E::from(e))
}

// ---------------------------------------------------------------------------
// AccountStore
// ---------------------------------------------------------------------------

/// Typed operations over the `accounts` and `addresses` trees.
///
/// Cheap to clone; both fields are sled tree handles.
#[derive(Debug, Clone)]
pub struct AccountStore {
    /// `account_id` (16B) -> `bincode(Account)`.
    accounts: Tree,
    /// `address` (UTF-8) -> `account_id` (16B).
    addresses: Tree,
}

impl AccountStore {
    pub fn new(db: &VegaDB) -> Self {
        Self {
            accounts: db.accounts_tree(),
            addresses: db.addresses_tree(),
        }
    }

    /// The underlying accounts tree, for pairing into the engine's
    /// two-tree commit transaction.
    pub(crate) fn tree(&self) -> &Tree {
        &self.accounts
    }

    // -- Provisioning -------------------------------------------------------

    /// Provision a new account with the standard starting balance.
    ///
    /// `address` may be caller-supplied (already validated via
    /// [`Address::parse`]) or `None` for a generated `vega-` address.
    pub fn create(&self, address: Option<Address>) -> AccountResult<Account> {
        self.create_funded(address, config::STARTING_BALANCE)
    }

    /// Provision a new account with an explicit starting balance.
    ///
    /// The account record and the address index entry are written in one
    /// transaction over both trees: either the address is claimed and the
    /// account exists, or neither happened. A lost race for the address
    /// surfaces as [`AccountError::AddressTaken`].
    pub fn create_funded(
        &self,
        address: Option<Address>,
        starting_balance: u64,
    ) -> AccountResult<Account> {
        let address = address.unwrap_or_else(Address::generate);
        let account = Account::new(AccountId::generate(), address, starting_balance);
        let value = encode(&account)?;
        let id_key: &[u8] = account.account_id.as_bytes();
        let addr_key = account.address.as_str().as_bytes();

        let outcome = (&self.accounts, &self.addresses).transaction(|(accounts, addresses)| {
            if addresses.get(addr_key)?.is_some() {
                // Unit abort: the only business refusal on this path.
                return Err(ConflictableTransactionError::Abort(()));
            }
            addresses.insert(addr_key, id_key)?;
            accounts.insert(id_key, value.clone())?;
            Ok(())
        });

        match outcome {
            Ok(()) => {
                self.accounts.flush().map_err(DbError::Sled)?;
                tracing::debug!(
                    account = %account.account_id,
                    address = %account.address,
                    balance = account.balance,
                    "account provisioned"
                );
                Ok(account)
            }
            Err(TransactionError::Abort(())) => {
                Err(AccountError::AddressTaken(account.address.to_string()))
            }
            Err(TransactionError::Storage(e)) => Err(AccountError::Storage(DbError::Sled(e))),
        }
    }

    // -- Lookup -------------------------------------------------------------

    /// Fetch an account by id. `None` if it was never provisioned.
    pub fn get(&self, id: &AccountId) -> DbResult<Option<Account>> {
        let key: &[u8] = id.as_bytes();
        match self.accounts.get(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fetch an account by payment address.
    ///
    /// Two-step lookup: address -> id (from `addresses`), then id ->
    /// account (from `accounts`).
    pub fn get_by_address(&self, address: &str) -> DbResult<Option<Account>> {
        match self.addresses.get(address.as_bytes())? {
            Some(id_bytes) => {
                let id = AccountId::from_slice(&id_bytes).ok_or_else(|| {
                    DbError::Serialization("corrupt address index entry".to_string())
                })?;
                self.get(&id)
            }
            None => Ok(None),
        }
    }

    /// The single receiver-resolution function. Both transfer paths
    /// ("pay an address", "pay an id") and the scheduler go through here.
    pub fn resolve(&self, receiver: &ReceiverRef) -> DbResult<Option<Account>> {
        match receiver {
            ReceiverRef::ByAddress(address) => self.get_by_address(address),
            ReceiverRef::ById(id) => self.get(id),
        }
    }

    /// Number of provisioned accounts.
    pub fn count(&self) -> usize {
        self.accounts.len()
    }

    /// Sum of all balances, in minor units.
    ///
    /// Returned as u128 so the sum itself cannot overflow. Under the
    /// conservation invariant this changes only at provisioning time,
    /// which makes it a cheap whole-system sanity probe.
    pub fn total_balance(&self) -> DbResult<u128> {
        let mut total: u128 = 0;
        for entry in self.accounts.iter() {
            let (_key, value) = entry?;
            let account: Account = decode(&value)?;
            total += u128::from(account.balance);
        }
        Ok(total)
    }

    // -- The balance primitive ----------------------------------------------

    /// Apply a signed delta to one account inside a caller-supplied
    /// transactional scope over the `accounts` tree.
    ///
    /// This is the only code path that writes a balance. The caller passes
    /// the snapshot (`expected`) it validated against; the primitive
    /// re-reads the account inside the scope and:
    ///
    /// - aborts with [`DeltaError::NotFound`] if the account vanished,
    /// - aborts with [`DeltaError::VersionMismatch`] if another commit got
    ///   there first (the caller should re-validate and retry),
    /// - aborts with [`DeltaError::InsufficientFunds`] if a debit would go
    ///   below zero, or [`DeltaError::Overflow`] if a credit would wrap,
    /// - otherwise writes the new balance with `version + 1` and returns
    ///   the updated record.
    ///
    /// An abort rolls back every write in the surrounding scope, which is
    /// what makes a transfer's debit + credit + journal append
    /// all-or-nothing.
    pub fn apply_delta_in<E: From<DeltaError>>(
        scope: &TransactionalTree,
        expected: &Account,
        delta: i64,
    ) -> Result<Account, ConflictableTransactionError<E>> {
        let key: &[u8] = expected.account_id.as_bytes();

        let current: Account = match scope.get(key)? {
            Some(bytes) => match decode(&bytes) {
                Ok(account) => account,
                Err(e) => return Err(abort_with(DeltaError::Corrupt(e.to_string()))),
            },
            None => return Err(abort_with(DeltaError::NotFound(expected.account_id))),
        };

        if current.version != expected.version {
            return Err(abort_with(DeltaError::VersionMismatch(expected.account_id)));
        }

        let balance = if delta < 0 {
            let debit = delta.unsigned_abs();
            match current.balance.checked_sub(debit) {
                Some(b) => b,
                None => {
                    return Err(abort_with(DeltaError::InsufficientFunds {
                        available: current.balance,
                        requested: debit,
                    }))
                }
            }
        } else {
            let credit = delta as u64;
            match current.balance.checked_add(credit) {
                Some(b) => b,
                None => {
                    return Err(abort_with(DeltaError::Overflow {
                        current: current.balance,
                        credit,
                    }))
                }
            }
        };

        let updated = Account {
            balance,
            version: current.version + 1,
            ..current
        };
        let bytes = match encode(&updated) {
            Ok(b) => b,
            Err(e) => return Err(abort_with(DeltaError::Corrupt(e.to_string()))),
        };
        scope.insert(key, bytes)?;
        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
