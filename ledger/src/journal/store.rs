//! # Journal — Storage for the Transaction Log
//!
//! One sled tree, four keyspaces behind short prefixes (layout documented
//! in [`crate::storage::db`]). Keeping the record, its per-account recency
//! index, the idempotency index, and the sequence counter in a single tree
//! means a transfer commit spans exactly two trees (`accounts` + `journal`),
//! which is the shape sled's transactions handle natively.
//!
//! Appends happen only through [`Journal::append_in`], inside the engine's
//! commit scope. The public surface of this type is read-only.

use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use sled::Tree;
use thiserror::Error;

use super::record::{TransactionId, TransactionRecord};
use crate::account::AccountId;
use crate::config;
use crate::storage::db::{decode, encode};
use crate::storage::{DbError, DbResult, VegaDB};

// ---------------------------------------------------------------------------
// Key layout
// ---------------------------------------------------------------------------

/// `r/` ++ transaction id (16B) -> bincode(TransactionRecord)
const RECORD_PREFIX: &[u8] = b"r/";

/// `a/` ++ account id (16B) ++ seq (8B BE) -> transaction id (16B)
const ACCOUNT_INDEX_PREFIX: &[u8] = b"a/";

/// `k/` ++ idempotency key (UTF-8) -> transaction id (16B)
const IDEMPOTENCY_PREFIX: &[u8] = b"k/";

/// `m/next_seq` -> last allocated sequence number (8B BE)
const SEQ_KEY: &[u8] = b"m/next_seq";

fn record_key(id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(RECORD_PREFIX.len() + 16);
    key.extend_from_slice(RECORD_PREFIX);
    key.extend_from_slice(id.as_bytes());
    key
}

fn account_index_prefix(account: &AccountId) -> Vec<u8> {
    let mut key = Vec::with_capacity(ACCOUNT_INDEX_PREFIX.len() + 16);
    key.extend_from_slice(ACCOUNT_INDEX_PREFIX);
    key.extend_from_slice(account.as_bytes());
    key
}

fn account_index_key(account: &AccountId, seq: u64) -> Vec<u8> {
    let mut key = account_index_prefix(account);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn idempotency_key(key: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(IDEMPOTENCY_PREFIX.len() + key.len());
    k.extend_from_slice(IDEMPOTENCY_PREFIX);
    k.extend_from_slice(key.as_bytes());
    k
}

// ---------------------------------------------------------------------------
// AppendError
// ---------------------------------------------------------------------------

/// Failures while reading or writing journal entries inside a commit scope.
/// Always aborts the surrounding transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppendError {
    /// A journal entry failed to decode or encode. Committed data should
    /// never do this; treat it as storage corruption.
    #[error("corrupt journal entry: {0}")]
    Corrupt(String),
}

fn abort_with<E: From<AppendError>>(e: AppendError) -> ConflictableTransactionError<E> {
    ConflictableTransactionError::Abort(E::from(e))
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// Typed operations over the `journal` tree.
#[derive(Debug, Clone)]
pub struct Journal {
    tree: Tree,
}

impl Journal {
    pub fn new(db: &VegaDB) -> Self {
        Self {
            tree: db.journal_tree(),
        }
    }

    /// The underlying tree, for pairing into the engine's two-tree
    /// transaction.
    pub(crate) fn tree(&self) -> &Tree {
        &self.tree
    }

    pub(crate) fn flush(&self) -> DbResult<()> {
        self.tree.flush().map_err(DbError::Sled)?;
        Ok(())
    }

    // -- In-scope operations (called from the engine's commit) --------------

    /// Allocate the next global commit sequence number inside the scope.
    ///
    /// Sequence numbers start at 1, so the counter doubles as the count of
    /// committed records.
    pub(crate) fn allocate_seq_in<E: From<AppendError>>(
        scope: &TransactionalTree,
    ) -> Result<u64, ConflictableTransactionError<E>> {
        let last = match scope.get(SEQ_KEY)? {
            Some(bytes) => match <[u8; 8]>::try_from(bytes.as_ref()) {
                Ok(raw) => u64::from_be_bytes(raw),
                Err(_) => {
                    return Err(abort_with(AppendError::Corrupt(
                        "sequence counter has wrong width".to_string(),
                    )))
                }
            },
            None => 0,
        };
        let seq = last + 1;
        scope.insert(SEQ_KEY, &seq.to_be_bytes())?;
        Ok(seq)
    }

    /// Look up an idempotency key inside the scope.
    ///
    /// Returns the id of the transfer that already claimed the key, if
    /// any. The engine calls this before touching balances so a replayed
    /// request aborts cleanly instead of double-spending.
    pub(crate) fn find_duplicate_in<E: From<AppendError>>(
        scope: &TransactionalTree,
        key: &str,
    ) -> Result<Option<TransactionId>, ConflictableTransactionError<E>> {
        match scope.get(idempotency_key(key))? {
            Some(bytes) => match TransactionId::from_slice(&bytes) {
                Some(id) => Ok(Some(id)),
                None => Err(abort_with(AppendError::Corrupt(
                    "corrupt idempotency index entry".to_string(),
                ))),
            },
            None => Ok(None),
        }
    }

    /// Append a record and its indexes inside the commit scope.
    ///
    /// Writes the record itself, one recency-index entry for the sender,
    /// one for the receiver, and (when present) the idempotency claim.
    /// All of it commits or none of it does, together with the balance
    /// writes in the paired `accounts` scope.
    pub(crate) fn append_in<E: From<AppendError>>(
        scope: &TransactionalTree,
        record: &TransactionRecord,
    ) -> Result<(), ConflictableTransactionError<E>> {
        let bytes = match encode(record) {
            Ok(b) => b,
            Err(e) => return Err(abort_with(AppendError::Corrupt(e.to_string()))),
        };
        let id_bytes: &[u8] = record.transaction_id.as_bytes();

        scope.insert(record_key(&record.transaction_id), bytes)?;
        scope.insert(
            account_index_key(&record.sender_account_id, record.seq),
            id_bytes,
        )?;
        scope.insert(
            account_index_key(&record.receiver_account_id, record.seq),
            id_bytes,
        )?;
        if let Some(key) = record.idempotency_key.as_deref() {
            scope.insert(idempotency_key(key), id_bytes)?;
        }
        Ok(())
    }

    // -- Reads --------------------------------------------------------------

    /// Fetch a record by id. `None` if no such transfer ever committed.
    pub fn get(&self, id: &TransactionId) -> DbResult<Option<TransactionRecord>> {
        match self.tree.get(record_key(id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// History for an account: every record where it was sender or
    /// receiver, newest first.
    ///
    /// `limit` is clamped via [`config::clamp_history_limit`]. An account
    /// with no history (or one that never existed) returns an empty list;
    /// "no transactions" is an answer, not an error.
    pub fn list_for_account(
        &self,
        account: &AccountId,
        limit: Option<usize>,
    ) -> DbResult<Vec<TransactionRecord>> {
        let limit = config::clamp_history_limit(limit);
        let prefix = account_index_prefix(account);

        let mut records = Vec::new();
        for entry in self.tree.scan_prefix(&prefix).rev().take(limit) {
            let (index_key, id_bytes) = entry?;
            let id = TransactionId::from_slice(&id_bytes).ok_or_else(|| {
                DbError::Serialization("corrupt recency index entry".to_string())
            })?;
            match self.get(&id)? {
                Some(record) => records.push(record),
                // An index entry without its record means a torn write,
                // which the commit scope exists to prevent.
                None => {
                    return Err(DbError::NotFound(format!(
                        "journal record for index key {:?}",
                        index_key
                    )))
                }
            }
        }
        Ok(records)
    }

    /// Look up the transfer that claimed an idempotency key, if any.
    pub fn find_by_idempotency_key(&self, key: &str) -> DbResult<Option<TransactionRecord>> {
        match self.tree.get(idempotency_key(key))? {
            Some(bytes) => {
                let id = TransactionId::from_slice(&bytes).ok_or_else(|| {
                    DbError::Serialization("corrupt idempotency index entry".to_string())
                })?;
                self.get(&id)
            }
            None => Ok(None),
        }
    }

    /// Number of committed transfers (the last allocated sequence number).
    pub fn committed_count(&self) -> DbResult<u64> {
        match self.tree.get(SEQ_KEY)? {
            Some(bytes) => {
                let raw = <[u8; 8]>::try_from(bytes.as_ref()).map_err(|_| {
                    DbError::Serialization("sequence counter has wrong width".to_string())
                })?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sled::transaction::TransactionError;

    // -- Helpers ------------------------------------------------------------

    fn setup() -> (VegaDB, Journal) {
        let db = VegaDB::open_temporary().expect("temp db");
        let journal = Journal::new(&db);
        (db, journal)
    }

    /// Commit a record through a real transaction, the way the engine does.
    fn commit(
        journal: &Journal,
        sender: AccountId,
        receiver: AccountId,
        amount: u64,
        key: Option<&str>,
    ) -> TransactionRecord {
        let result = journal.tree.transaction(|tx| {
            let seq = Journal::allocate_seq_in::<AppendError>(tx)?;
            let record = TransactionRecord {
                transaction_id: TransactionId::generate(),
                sender_account_id: sender,
                receiver_account_id: receiver,
                amount,
                timestamp: Utc::now(),
                seq,
                idempotency_key: key.map(str::to_string),
            };
            Journal::append_in::<AppendError>(tx, &record)?;
            Ok(record)
        });
        match result {
            Ok(record) => record,
            Err(TransactionError::Abort(e)) => panic!("append aborted in test: {e}"),
            Err(TransactionError::Storage(e)) => panic!("storage failure in test: {e}"),
        }
    }

    // -- Tests --------------------------------------------------------------

    #[test]
    fn append_and_get_roundtrip() {
        let (_db, journal) = setup();
        let record = commit(
            &journal,
            AccountId::generate(),
            AccountId::generate(),
            500,
            None,
        );

        let fetched = journal.get(&record.transaction_id).unwrap().expect("stored");
        assert_eq!(fetched, record);
        assert_eq!(fetched.seq, 1);
    }

    #[test]
    fn sequence_numbers_are_monotonic() {
        let (_db, journal) = setup();
        let a = AccountId::generate();
        let b = AccountId::generate();

        let seqs: Vec<u64> = (0..3).map(|_| commit(&journal, a, b, 10, None).seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(journal.committed_count().unwrap(), 3);
    }

    #[test]
    fn history_covers_sent_and_received() {
        let (_db, journal) = setup();
        let a = AccountId::generate();
        let b = AccountId::generate();
        let c = AccountId::generate();

        let r1 = commit(&journal, a, b, 10, None);
        let r2 = commit(&journal, b, c, 20, None);
        let r3 = commit(&journal, c, a, 30, None);

        let for_a = journal.list_for_account(&a, None).unwrap();
        let ids: Vec<_> = for_a.iter().map(|r| r.transaction_id).collect();
        // Newest first: the transfer a received, then the one it sent.
        assert_eq!(ids, vec![r3.transaction_id, r1.transaction_id]);

        let for_b = journal.list_for_account(&b, None).unwrap();
        let ids: Vec<_> = for_b.iter().map(|r| r.transaction_id).collect();
        assert_eq!(ids, vec![r2.transaction_id, r1.transaction_id]);
    }

    #[test]
    fn history_respects_limit_newest_first() {
        let (_db, journal) = setup();
        let a = AccountId::generate();
        let b = AccountId::generate();
        for amount in 1..=5 {
            commit(&journal, a, b, amount, None);
        }

        let page = journal.list_for_account(&a, Some(2)).unwrap();
        let seqs: Vec<_> = page.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![5, 4]);

        // Absurd limits are clamped, not rejected.
        let all = journal.list_for_account(&a, Some(1_000_000)).unwrap();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn history_for_unknown_account_is_empty() {
        let (_db, journal) = setup();
        let none = journal.list_for_account(&AccountId::generate(), None).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn idempotency_key_lookup() {
        let (_db, journal) = setup();
        let record = commit(
            &journal,
            AccountId::generate(),
            AccountId::generate(),
            77,
            Some("pay-once-4411"),
        );

        let found = journal
            .find_by_idempotency_key("pay-once-4411")
            .unwrap()
            .expect("key claimed");
        assert_eq!(found.transaction_id, record.transaction_id);
        assert!(journal.find_by_idempotency_key("never-seen").unwrap().is_none());
    }

    #[test]
    fn in_scope_duplicate_check_sees_claimed_key() {
        let (_db, journal) = setup();
        let record = commit(
            &journal,
            AccountId::generate(),
            AccountId::generate(),
            77,
            Some("claimed"),
        );

        let result: Result<Option<TransactionId>, TransactionError<AppendError>> =
            journal.tree.transaction(|tx| {
                Journal::find_duplicate_in::<AppendError>(tx, "claimed")
            });
        assert_eq!(result.unwrap(), Some(record.transaction_id));

        let result: Result<Option<TransactionId>, TransactionError<AppendError>> =
            journal.tree.transaction(|tx| {
                Journal::find_duplicate_in::<AppendError>(tx, "unclaimed")
            });
        assert_eq!(result.unwrap(), None);
    }

    #[test]
    fn get_unknown_record_is_none() {
        let (_db, journal) = setup();
        assert!(journal.get(&TransactionId::generate()).unwrap().is_none());
    }

    #[test]
    fn empty_journal_counts_zero() {
        let (_db, journal) = setup();
        assert_eq!(journal.committed_count().unwrap(), 0);
    }
}
