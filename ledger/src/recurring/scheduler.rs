//! # RecurringScheduler — Standing Payment Orders
//!
//! The scheduler owns the lifecycle of [`RecurringInstruction`]s: creation
//! with the same resolution rules as a one-off transfer, owner listings,
//! and the periodic sweep that turns due instructions into real transfers
//! through the [`LedgerEngine`].
//!
//! ## Sweep semantics
//!
//! | Rule | Behaviour |
//! |---------|-----------------------------------------------------------|
//! | Due     | `next_due_at <= now`, boundary inclusive                  |
//! | Cadence | one period per sweep, even when badly overdue             |
//! | Advance | from the previous due time, never from execution time     |
//! | Failure | schedule untouched, retried on the next sweep             |
//! | Overlap | a sweep that meets a running sweep reports back and leaves|
//!
//! Every execution carries an idempotency key derived from the instruction
//! and its due time, so a sweep that commits the transfer and then dies
//! before re-arming cannot pay twice: the rerun replays the committed
//! record and re-arms as if nothing had gone wrong.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::instruction::{
    Frequency, InstructionId, RecurringInstruction, ScheduleError, ScheduleResult,
};
use super::store::{due_millis, InstructionStore};
use crate::account::{AccountId, AccountStore, ReceiverRef};
use crate::storage::VegaDB;
use crate::transfer::{LedgerEngine, TransferRequest};

// ---------------------------------------------------------------------------
// SweepReport
// ---------------------------------------------------------------------------

/// What one sweep did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Due index entries considered this sweep.
    pub examined: usize,
    /// Instructions that produced a committed (or replayed) transfer.
    pub executed: usize,
    /// Instructions whose transfer was refused; they stay due.
    pub failed: usize,
    /// True when the sweep yielded to one already in flight.
    pub overlapped: bool,
}

impl SweepReport {
    fn overlapped() -> Self {
        Self {
            overlapped: true,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// RecurringScheduler
// ---------------------------------------------------------------------------

/// Creates standing instructions and executes the ones that have come due.
pub struct RecurringScheduler {
    store: InstructionStore,
    accounts: Arc<AccountStore>,
    engine: LedgerEngine,
    /// Held for the duration of a sweep; a second caller yields instead of
    /// queueing behind it.
    sweep_gate: Mutex<()>,
}

impl RecurringScheduler {
    pub fn new(db: &VegaDB, accounts: Arc<AccountStore>, engine: LedgerEngine) -> Self {
        Self {
            store: InstructionStore::new(db),
            accounts,
            engine,
            sweep_gate: Mutex::new(()),
        }
    }

    /// Register a standing instruction.
    ///
    /// The receiver is resolved by address at creation time and pinned by
    /// account id from then on. The first execution is one full period
    /// after `now`; nothing is paid at creation.
    pub fn create(
        &self,
        owner: &AccountId,
        receiver_address: &str,
        amount: u64,
        frequency: Frequency,
        now: DateTime<Utc>,
    ) -> ScheduleResult<RecurringInstruction> {
        if amount == 0 || amount > i64::MAX as u64 {
            return Err(ScheduleError::InvalidAmount);
        }
        let receiver = self
            .accounts
            .get_by_address(receiver_address)?
            .ok_or_else(|| ScheduleError::ReceiverNotFound(receiver_address.to_string()))?;
        let owner_account = self
            .accounts
            .get(owner)?
            .ok_or(ScheduleError::OwnerNotFound(*owner))?;
        if owner_account.account_id == receiver.account_id {
            return Err(ScheduleError::SelfPaymentRejected);
        }

        let instruction = RecurringInstruction {
            instruction_id: InstructionId::generate(),
            owner_account_id: owner_account.account_id,
            receiver_account_id: receiver.account_id,
            amount,
            frequency,
            next_due_at: frequency.advance_from(now),
            created_at: now,
        };
        self.store.put_new(&instruction)?;
        tracing::debug!(
            instruction = %instruction.instruction_id,
            owner = %instruction.owner_account_id,
            frequency = %frequency,
            next_due = %instruction.next_due_at,
            "recurring instruction created"
        );
        Ok(instruction)
    }

    /// All instructions owned by an account, soonest due first.
    pub fn list_for_owner(&self, owner: &AccountId) -> ScheduleResult<Vec<RecurringInstruction>> {
        Ok(self.store.list_for_owner(owner)?)
    }

    /// Number of standing instructions on the books.
    pub fn instruction_count(&self) -> usize {
        self.store.count()
    }

    /// Execute everything due at `now` and advance each executed schedule
    /// by one period.
    ///
    /// A refused transfer leaves its schedule untouched; the instruction
    /// is simply due again on the next sweep. Storage trouble aborts the
    /// sweep instead, so a partial report is never silently final.
    pub fn run_due(&self, now: DateTime<Utc>) -> ScheduleResult<SweepReport> {
        let Some(_gate) = self.sweep_gate.try_lock() else {
            tracing::debug!("sweep already running, yielding");
            return Ok(SweepReport::overlapped());
        };

        let due = self.store.due_before(now)?;
        let mut report = SweepReport {
            examined: due.len(),
            ..SweepReport::default()
        };

        for (entry_millis, id) in due {
            let Some(instruction) = self.store.get(&id)? else {
                self.store.remove_due_entry(entry_millis, &id)?;
                continue;
            };
            if entry_millis != due_millis(instruction.next_due_at) {
                // The record has moved on; the entry is leftover.
                self.store.remove_due_entry(entry_millis, &id)?;
                continue;
            }

            let request = TransferRequest::new(
                instruction.owner_account_id,
                ReceiverRef::ById(instruction.receiver_account_id),
                instruction.amount,
            )
            .with_idempotency_key(execution_key(&instruction));

            match self.engine.transfer(&request) {
                Ok(record) => {
                    let next = instruction.frequency.advance_from(instruction.next_due_at);
                    self.store.rearm(&instruction, next)?;
                    report.executed += 1;
                    tracing::info!(
                        instruction = %instruction.instruction_id,
                        transaction = %record.transaction_id,
                        amount = instruction.amount,
                        next_due = %next,
                        "recurring payment executed"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        instruction = %instruction.instruction_id,
                        error = %e,
                        "recurring payment refused, schedule unchanged"
                    );
                }
            }
        }

        self.store.flush()?;
        Ok(report)
    }
}

/// One key per instruction per due period. A crashed sweep that already
/// committed re-derives the same key on rerun and replays instead of
/// paying again.
fn execution_key(instruction: &RecurringInstruction) -> String {
    format!(
        "recurring:{}:{}",
        instruction.instruction_id,
        due_millis(instruction.next_due_at)
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::journal::Journal;
    use chrono::{Duration, TimeZone};

    // -- Helpers ------------------------------------------------------------

    fn setup() -> (VegaDB, Arc<AccountStore>, LedgerEngine, RecurringScheduler) {
        let db = VegaDB::open_temporary().expect("temp db");
        let accounts = Arc::new(AccountStore::new(&db));
        let journal = Arc::new(Journal::new(&db));
        let engine = LedgerEngine::new(Arc::clone(&accounts), Arc::clone(&journal));
        let scheduler = RecurringScheduler::new(&db, Arc::clone(&accounts), engine.clone());
        (db, accounts, engine, scheduler)
    }

    fn funded(accounts: &AccountStore, balance: u64) -> Account {
        accounts.create_funded(None, balance).expect("create account")
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn balance(accounts: &AccountStore, account: &Account) -> u64 {
        accounts
            .get(&account.account_id)
            .unwrap()
            .expect("account exists")
            .balance
    }

    // -- Tests --------------------------------------------------------------

    #[test]
    fn create_schedules_one_period_ahead() {
        let (_db, accounts, _engine, scheduler) = setup();
        let owner = funded(&accounts, 10_000);
        let receiver = funded(&accounts, 0);
        let now = utc(2025, 7, 1, 9);

        let instruction = scheduler
            .create(
                &owner.account_id,
                receiver.address.as_str(),
                250,
                Frequency::Weekly,
                now,
            )
            .unwrap();

        assert_eq!(instruction.owner_account_id, owner.account_id);
        assert_eq!(instruction.receiver_account_id, receiver.account_id);
        assert_eq!(instruction.created_at, now);
        assert_eq!(instruction.next_due_at, utc(2025, 7, 8, 9));
        assert_eq!(scheduler.instruction_count(), 1);
        // Creation never moves money.
        assert_eq!(balance(&accounts, &owner), 10_000);
        assert_eq!(balance(&accounts, &receiver), 0);
    }

    #[test]
    fn create_rejects_a_zero_amount() {
        let (_db, accounts, _engine, scheduler) = setup();
        let owner = funded(&accounts, 10_000);
        let receiver = funded(&accounts, 0);

        let err = scheduler
            .create(
                &owner.account_id,
                receiver.address.as_str(),
                0,
                Frequency::Daily,
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidAmount));
        assert_eq!(scheduler.instruction_count(), 0);
    }

    #[test]
    fn unknown_receiver_is_reported_before_unknown_owner() {
        let (_db, _accounts, _engine, scheduler) = setup();

        let err = scheduler
            .create(
                &AccountId::generate(),
                "vega-nobody",
                100,
                Frequency::Weekly,
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, ScheduleError::ReceiverNotFound(ref a) if a == "vega-nobody"));
    }

    #[test]
    fn create_rejects_an_unknown_owner() {
        let (_db, accounts, _engine, scheduler) = setup();
        let receiver = funded(&accounts, 0);
        let ghost = AccountId::generate();

        let err = scheduler
            .create(
                &ghost,
                receiver.address.as_str(),
                100,
                Frequency::Weekly,
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, ScheduleError::OwnerNotFound(id) if id == ghost));
    }

    #[test]
    fn create_rejects_paying_yourself() {
        let (_db, accounts, _engine, scheduler) = setup();
        let owner = funded(&accounts, 10_000);

        let err = scheduler
            .create(
                &owner.account_id,
                owner.address.as_str(),
                100,
                Frequency::Monthly,
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, ScheduleError::SelfPaymentRejected));
    }

    #[test]
    fn listing_is_scoped_to_the_owner() {
        let (_db, accounts, _engine, scheduler) = setup();
        let alice = funded(&accounts, 10_000);
        let bob = funded(&accounts, 10_000);
        let carol = funded(&accounts, 0);
        let now = utc(2025, 7, 1, 9);

        let a = scheduler
            .create(
                &alice.account_id,
                carol.address.as_str(),
                100,
                Frequency::Weekly,
                now,
            )
            .unwrap();
        scheduler
            .create(
                &bob.account_id,
                carol.address.as_str(),
                200,
                Frequency::Daily,
                now,
            )
            .unwrap();

        let listed = scheduler.list_for_owner(&alice.account_id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].instruction_id, a.instruction_id);
        assert!(scheduler
            .list_for_owner(&AccountId::generate())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn sweep_before_the_due_time_is_a_no_op() {
        let (_db, accounts, _engine, scheduler) = setup();
        let owner = funded(&accounts, 10_000);
        let receiver = funded(&accounts, 0);
        let now = utc(2025, 7, 1, 9);

        scheduler
            .create(
                &owner.account_id,
                receiver.address.as_str(),
                250,
                Frequency::Weekly,
                now,
            )
            .unwrap();

        let report = scheduler.run_due(now + Duration::days(6)).unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(balance(&accounts, &owner), 10_000);
        assert_eq!(balance(&accounts, &receiver), 0);
    }

    #[test]
    fn sweep_executes_at_the_due_boundary_and_rearms() {
        let (_db, accounts, _engine, scheduler) = setup();
        let owner = funded(&accounts, 10_000);
        let receiver = funded(&accounts, 0);
        let now = utc(2025, 7, 1, 9);

        let instruction = scheduler
            .create(
                &owner.account_id,
                receiver.address.as_str(),
                250,
                Frequency::Weekly,
                now,
            )
            .unwrap();

        // Exactly at the boundary counts as due.
        let report = scheduler.run_due(utc(2025, 7, 8, 9)).unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.executed, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(balance(&accounts, &owner), 9_750);
        assert_eq!(balance(&accounts, &receiver), 250);

        let rearmed = scheduler.list_for_owner(&owner.account_id).unwrap();
        assert_eq!(rearmed[0].instruction_id, instruction.instruction_id);
        assert_eq!(rearmed[0].next_due_at, utc(2025, 7, 15, 9));
    }

    #[test]
    fn refused_execution_keeps_the_schedule_and_retries() {
        let (_db, accounts, engine, scheduler) = setup();
        let owner = funded(&accounts, 100);
        let receiver = funded(&accounts, 0);
        let whale = funded(&accounts, 10_000);
        let now = utc(2025, 7, 1, 9);
        let due = utc(2025, 7, 8, 9);

        scheduler
            .create(
                &owner.account_id,
                receiver.address.as_str(),
                250,
                Frequency::Weekly,
                now,
            )
            .unwrap();

        // Owner cannot cover it: the sweep refuses and changes nothing.
        let report = scheduler.run_due(due).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.executed, 0);
        let listed = scheduler.list_for_owner(&owner.account_id).unwrap();
        assert_eq!(listed[0].next_due_at, due);
        assert_eq!(balance(&accounts, &receiver), 0);

        // Fund the owner; the very next sweep clears the backlog entry.
        engine
            .transfer(&TransferRequest::new(
                whale.account_id,
                ReceiverRef::ById(owner.account_id),
                500,
            ))
            .unwrap();
        let report = scheduler.run_due(due).unwrap();
        assert_eq!(report.executed, 1);
        assert_eq!(balance(&accounts, &owner), 350);
        assert_eq!(balance(&accounts, &receiver), 250);
        let listed = scheduler.list_for_owner(&owner.account_id).unwrap();
        assert_eq!(listed[0].next_due_at, due + Duration::days(7));
    }

    #[test]
    fn overdue_instruction_catches_up_one_period_per_sweep() {
        let (_db, accounts, _engine, scheduler) = setup();
        let owner = funded(&accounts, 10_000);
        let receiver = funded(&accounts, 0);
        let now = utc(2025, 8, 1, 9);

        // Created three weeks ago and never swept: two periods in arrears,
        // a third due exactly now.
        scheduler
            .create(
                &owner.account_id,
                receiver.address.as_str(),
                100,
                Frequency::Weekly,
                now - Duration::days(21),
            )
            .unwrap();

        for expected_paid in [100, 200, 300] {
            let report = scheduler.run_due(now).unwrap();
            assert_eq!(report.executed, 1);
            assert_eq!(balance(&accounts, &receiver), expected_paid);
        }

        // Caught up: the schedule is back in the future.
        let report = scheduler.run_due(now).unwrap();
        assert_eq!(report.examined, 0);
        let listed = scheduler.list_for_owner(&owner.account_id).unwrap();
        assert_eq!(listed[0].next_due_at, now + Duration::days(7));
    }

    #[test]
    fn replayed_execution_does_not_pay_twice() {
        let (db, accounts, _engine, scheduler) = setup();
        let owner = funded(&accounts, 10_000);
        let receiver = funded(&accounts, 0);
        let created = utc(2025, 7, 1, 9);
        let due = utc(2025, 7, 8, 9);

        let instruction = scheduler
            .create(
                &owner.account_id,
                receiver.address.as_str(),
                250,
                Frequency::Weekly,
                created,
            )
            .unwrap();
        assert_eq!(scheduler.run_due(due).unwrap().executed, 1);

        // Rewind the schedule as if the sweep died after committing the
        // transfer but before re-arming.
        let store = InstructionStore::new(&db);
        let current = store
            .get(&instruction.instruction_id)
            .unwrap()
            .expect("instruction exists");
        store.rearm(&current, due).unwrap();

        // The rerun replays the committed transfer instead of paying again.
        let report = scheduler.run_due(due).unwrap();
        assert_eq!(report.executed, 1);
        assert_eq!(balance(&accounts, &owner), 9_750);
        assert_eq!(balance(&accounts, &receiver), 250);

        let journal = Journal::new(&db);
        assert_eq!(journal.committed_count().unwrap(), 1);
        let listed = scheduler.list_for_owner(&owner.account_id).unwrap();
        assert_eq!(listed[0].next_due_at, due + Duration::days(7));
    }

    #[test]
    fn sweep_yields_when_one_is_already_running() {
        let (_db, accounts, _engine, scheduler) = setup();
        let owner = funded(&accounts, 10_000);
        let receiver = funded(&accounts, 0);
        let now = utc(2025, 7, 1, 9);
        let due = utc(2025, 7, 8, 9);

        scheduler
            .create(
                &owner.account_id,
                receiver.address.as_str(),
                250,
                Frequency::Weekly,
                now,
            )
            .unwrap();

        let held = scheduler.sweep_gate.lock();
        let report = scheduler.run_due(due).unwrap();
        assert!(report.overlapped);
        assert_eq!(report.examined, 0);
        assert_eq!(balance(&accounts, &receiver), 0);
        drop(held);

        let report = scheduler.run_due(due).unwrap();
        assert!(!report.overlapped);
        assert_eq!(report.executed, 1);
    }
}
