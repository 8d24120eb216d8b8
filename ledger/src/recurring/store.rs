//! # InstructionStore — Storage for Recurring Instructions
//!
//! One sled tree, three keyspaces (layout documented in
//! [`crate::storage::db`]): the instruction record, an owner index for
//! listings, and a due-time index whose big-endian millisecond keys make
//! "everything due by now" a single bounded range scan.
//!
//! Writes are single-tree batches: the record and its index entries move
//! together or not at all.

use chrono::{DateTime, Utc};
use sled::{Batch, Tree};

use super::instruction::{InstructionId, RecurringInstruction};
use crate::account::AccountId;
use crate::storage::db::{decode, encode};
use crate::storage::{DbError, DbResult, VegaDB};

// ---------------------------------------------------------------------------
// Key layout
// ---------------------------------------------------------------------------

/// `i/` ++ instruction id (16B) -> bincode(RecurringInstruction)
const RECORD_PREFIX: &[u8] = b"i/";

/// `o/` ++ owner id (16B) ++ instruction id (16B) -> instruction id (16B)
const OWNER_INDEX_PREFIX: &[u8] = b"o/";

/// `d/` ++ due millis (8B BE) ++ instruction id (16B) -> instruction id (16B)
const DUE_INDEX_PREFIX: &[u8] = b"d/";

fn record_key(id: &InstructionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(RECORD_PREFIX.len() + 16);
    key.extend_from_slice(RECORD_PREFIX);
    key.extend_from_slice(id.as_bytes());
    key
}

fn owner_index_prefix(owner: &AccountId) -> Vec<u8> {
    let mut key = Vec::with_capacity(OWNER_INDEX_PREFIX.len() + 16);
    key.extend_from_slice(OWNER_INDEX_PREFIX);
    key.extend_from_slice(owner.as_bytes());
    key
}

fn owner_index_key(owner: &AccountId, id: &InstructionId) -> Vec<u8> {
    let mut key = owner_index_prefix(owner);
    key.extend_from_slice(id.as_bytes());
    key
}

fn due_index_key(millis: u64, id: &InstructionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(DUE_INDEX_PREFIX.len() + 8 + 16);
    key.extend_from_slice(DUE_INDEX_PREFIX);
    key.extend_from_slice(&millis.to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

/// Due times as index-key material. Due times in this system are always at
/// least one period after some creation time, so the sign clamp never
/// fires on real data.
pub(crate) fn due_millis(at: DateTime<Utc>) -> u64 {
    at.timestamp_millis().max(0) as u64
}

// ---------------------------------------------------------------------------
// InstructionStore
// ---------------------------------------------------------------------------

/// Typed operations over the `instructions` tree.
#[derive(Debug, Clone)]
pub struct InstructionStore {
    tree: Tree,
}

impl InstructionStore {
    pub fn new(db: &VegaDB) -> Self {
        Self {
            tree: db.instructions_tree(),
        }
    }

    pub(crate) fn flush(&self) -> DbResult<()> {
        self.tree.flush().map_err(DbError::Sled)?;
        Ok(())
    }

    // -- Writes -------------------------------------------------------------

    /// Store a freshly created instruction: record, owner index entry,
    /// and due index entry in one batch.
    pub(crate) fn put_new(&self, instruction: &RecurringInstruction) -> DbResult<()> {
        let bytes = encode(instruction)?;
        let id_bytes: &[u8] = instruction.instruction_id.as_bytes();

        let mut batch = Batch::default();
        batch.insert(record_key(&instruction.instruction_id), bytes);
        batch.insert(
            owner_index_key(&instruction.owner_account_id, &instruction.instruction_id),
            id_bytes,
        );
        batch.insert(
            due_index_key(due_millis(instruction.next_due_at), &instruction.instruction_id),
            id_bytes,
        );
        self.tree.apply_batch(batch)?;
        self.tree.flush().map_err(DbError::Sled)?;
        Ok(())
    }

    /// Advance an executed instruction to its next due time.
    ///
    /// Rewrites the record and moves the due index entry in one batch,
    /// so the index can never point at a due time the record disagrees
    /// with. Returns the updated instruction.
    pub(crate) fn rearm(
        &self,
        instruction: &RecurringInstruction,
        next_due_at: DateTime<Utc>,
    ) -> DbResult<RecurringInstruction> {
        let updated = RecurringInstruction {
            next_due_at,
            ..instruction.clone()
        };
        let bytes = encode(&updated)?;
        let id_bytes: &[u8] = updated.instruction_id.as_bytes();

        let mut batch = Batch::default();
        batch.remove(due_index_key(
            due_millis(instruction.next_due_at),
            &instruction.instruction_id,
        ));
        batch.insert(
            due_index_key(due_millis(next_due_at), &updated.instruction_id),
            id_bytes,
        );
        batch.insert(record_key(&updated.instruction_id), bytes);
        self.tree.apply_batch(batch)?;
        Ok(updated)
    }

    /// Drop a due index entry that no longer matches its record.
    pub(crate) fn remove_due_entry(&self, millis: u64, id: &InstructionId) -> DbResult<()> {
        self.tree.remove(due_index_key(millis, id))?;
        Ok(())
    }

    // -- Reads --------------------------------------------------------------

    /// Fetch an instruction by id.
    pub fn get(&self, id: &InstructionId) -> DbResult<Option<RecurringInstruction>> {
        match self.tree.get(record_key(id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All instructions owned by an account, soonest due first.
    pub fn list_for_owner(&self, owner: &AccountId) -> DbResult<Vec<RecurringInstruction>> {
        let prefix = owner_index_prefix(owner);
        let mut instructions = Vec::new();
        for entry in self.tree.scan_prefix(&prefix) {
            let (_key, id_bytes) = entry?;
            let id = InstructionId::from_slice(&id_bytes).ok_or_else(|| {
                DbError::Serialization("corrupt owner index entry".to_string())
            })?;
            match self.get(&id)? {
                Some(instruction) => instructions.push(instruction),
                None => {
                    return Err(DbError::NotFound(format!(
                        "instruction {id} behind owner index entry"
                    )))
                }
            }
        }
        instructions.sort_by(|a, b| {
            a.next_due_at
                .cmp(&b.next_due_at)
                .then(a.instruction_id.cmp(&b.instruction_id))
        });
        Ok(instructions)
    }

    /// Every due index entry with `due <= now`, soonest first.
    ///
    /// Returns `(entry_millis, id)` pairs so the sweep can both verify the
    /// entry against the record and clear it if it turned out stale.
    pub fn due_before(&self, now: DateTime<Utc>) -> DbResult<Vec<(u64, InstructionId)>> {
        // Exclusive upper bound one millisecond past `now` makes the scan
        // inclusive of entries at exactly `now`.
        let mut end = Vec::with_capacity(DUE_INDEX_PREFIX.len() + 8);
        end.extend_from_slice(DUE_INDEX_PREFIX);
        end.extend_from_slice(&(due_millis(now) + 1).to_be_bytes());

        let mut due = Vec::new();
        for entry in self.tree.range(DUE_INDEX_PREFIX.to_vec()..end) {
            let (key, id_bytes) = entry?;
            let raw_millis = key
                .get(DUE_INDEX_PREFIX.len()..DUE_INDEX_PREFIX.len() + 8)
                .and_then(|slice| <[u8; 8]>::try_from(slice).ok())
                .ok_or_else(|| {
                    DbError::Serialization("corrupt due index key".to_string())
                })?;
            let id = InstructionId::from_slice(&id_bytes).ok_or_else(|| {
                DbError::Serialization("corrupt due index entry".to_string())
            })?;
            due.push((u64::from_be_bytes(raw_millis), id));
        }
        Ok(due)
    }

    /// Number of stored instructions.
    pub fn count(&self) -> usize {
        self.tree.scan_prefix(RECORD_PREFIX).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recurring::instruction::Frequency;
    use chrono::{Duration, TimeZone};

    // -- Helpers ------------------------------------------------------------

    fn setup() -> (VegaDB, InstructionStore) {
        let db = VegaDB::open_temporary().expect("temp db");
        let store = InstructionStore::new(&db);
        (db, store)
    }

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn make_instruction(owner: AccountId, due: DateTime<Utc>) -> RecurringInstruction {
        RecurringInstruction {
            instruction_id: InstructionId::generate(),
            owner_account_id: owner,
            receiver_account_id: AccountId::generate(),
            amount: 500,
            frequency: Frequency::Weekly,
            next_due_at: due,
            created_at: due - Duration::days(7),
        }
    }

    // -- Tests --------------------------------------------------------------

    #[test]
    fn put_and_get_roundtrip() {
        let (_db, store) = setup();
        let instruction = make_instruction(AccountId::generate(), utc(2025, 7, 1));
        store.put_new(&instruction).unwrap();

        let fetched = store.get(&instruction.instruction_id).unwrap().expect("stored");
        assert_eq!(fetched, instruction);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn get_unknown_is_none() {
        let (_db, store) = setup();
        assert!(store.get(&InstructionId::generate()).unwrap().is_none());
    }

    #[test]
    fn list_for_owner_is_scoped_and_sorted() {
        let (_db, store) = setup();
        let owner = AccountId::generate();
        let other = AccountId::generate();

        let late = make_instruction(owner, utc(2025, 9, 1));
        let early = make_instruction(owner, utc(2025, 7, 1));
        let foreign = make_instruction(other, utc(2025, 8, 1));
        for i in [&late, &early, &foreign] {
            store.put_new(i).unwrap();
        }

        let listed = store.list_for_owner(&owner).unwrap();
        let ids: Vec<_> = listed.iter().map(|i| i.instruction_id).collect();
        assert_eq!(ids, vec![early.instruction_id, late.instruction_id]);

        assert!(store.list_for_owner(&AccountId::generate()).unwrap().is_empty());
    }

    #[test]
    fn due_before_is_inclusive_and_ordered() {
        let (_db, store) = setup();
        let now = utc(2025, 7, 15);
        let owner = AccountId::generate();

        let past = make_instruction(owner, now - Duration::hours(1));
        let exact = make_instruction(owner, now);
        let future = make_instruction(owner, now + Duration::seconds(1));
        for i in [&past, &exact, &future] {
            store.put_new(i).unwrap();
        }

        let due = store.due_before(now).unwrap();
        let ids: Vec<_> = due.iter().map(|(_, id)| *id).collect();
        assert_eq!(ids, vec![past.instruction_id, exact.instruction_id]);
        assert_eq!(due[0].0, due_millis(past.next_due_at));
    }

    #[test]
    fn rearm_moves_the_due_entry() {
        let (_db, store) = setup();
        let due = utc(2025, 7, 1);
        let instruction = make_instruction(AccountId::generate(), due);
        store.put_new(&instruction).unwrap();

        let next = due + Duration::days(7);
        let updated = store.rearm(&instruction, next).unwrap();
        assert_eq!(updated.next_due_at, next);

        // Old entry gone, record updated, new entry present.
        assert!(store.due_before(due).unwrap().is_empty());
        let at_next = store.due_before(next).unwrap();
        assert_eq!(at_next, vec![(due_millis(next), instruction.instruction_id)]);
        assert_eq!(
            store.get(&instruction.instruction_id).unwrap().unwrap().next_due_at,
            next
        );
    }

    #[test]
    fn remove_due_entry_clears_exactly_one() {
        let (_db, store) = setup();
        let now = utc(2025, 7, 15);
        let a = make_instruction(AccountId::generate(), now);
        let b = make_instruction(AccountId::generate(), now);
        store.put_new(&a).unwrap();
        store.put_new(&b).unwrap();

        store
            .remove_due_entry(due_millis(now), &a.instruction_id)
            .unwrap();
        let due = store.due_before(now).unwrap();
        assert_eq!(due, vec![(due_millis(now), b.instruction_id)]);
    }
}
