//! Recurring instruction types and the calendar arithmetic behind them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::account::AccountId;
use crate::storage::DbError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from instruction creation and scheduling.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The frequency string is not one of the supported periods.
    #[error("invalid frequency {0:?}: expected daily, weekly, or monthly")]
    InvalidFrequency(String),

    /// Zero-amount instructions are refused at creation; they could never
    /// execute.
    #[error("instruction amount must be positive")]
    InvalidAmount,

    /// The owner account does not exist.
    #[error("owner account not found: {0}")]
    OwnerNotFound(AccountId),

    /// The receiver address did not resolve.
    #[error("receiver address not found: {0:?}")]
    ReceiverNotFound(String),

    /// Owner and receiver are the same account. Such an instruction would
    /// fail every single sweep, so it is refused up front.
    #[error("recurring payment to self is not permitted")]
    SelfPaymentRejected,

    #[error("storage unavailable: {0}")]
    Storage(#[from] DbError),
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;

// ---------------------------------------------------------------------------
// InstructionId
// ---------------------------------------------------------------------------

/// Opaque unique identifier for a recurring instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstructionId(Uuid);

impl InstructionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The 16-byte form used as key material in storage.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub(crate) fn from_slice(bytes: &[u8]) -> Option<Self> {
        Uuid::from_slice(bytes).ok().map(Self)
    }
}

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Frequency
// ---------------------------------------------------------------------------

/// How often a recurring instruction fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    /// The next due time, one period after `from`.
    ///
    /// Daily and weekly are fixed spans. Monthly is calendar-aware: the
    /// day-of-month is kept where possible and clamped to the last day of
    /// the target month otherwise (Jan 31 advances to Feb 28, or Feb 29
    /// in a leap year). After clamping, the clamped day is the new anchor:
    /// Feb 28 advances to Mar 28, not back to the 31st.
    pub fn advance_from(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Frequency::Daily => from
                .checked_add_signed(Duration::days(1))
                .expect("due date within supported time range"),
            Frequency::Weekly => from
                .checked_add_signed(Duration::days(7))
                .expect("due date within supported time range"),
            Frequency::Monthly => from
                .checked_add_months(Months::new(1))
                .expect("due date within supported time range"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            _ => Err(ScheduleError::InvalidFrequency(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// RecurringInstruction
// ---------------------------------------------------------------------------

/// A standing payment order.
///
/// `next_due_at` is the only mutable field over the instruction's life,
/// and only the scheduler's re-arm path writes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringInstruction {
    pub instruction_id: InstructionId,

    /// The paying account.
    pub owner_account_id: AccountId,

    /// The receiving account, resolved from an address at creation time
    /// and pinned by id from then on. A receiver renaming its address
    /// does not redirect existing instructions.
    pub receiver_account_id: AccountId,

    /// Amount per execution, in minor units. Always positive.
    pub amount: u64,

    pub frequency: Frequency,

    /// When this instruction should next execute. Set to one period after
    /// creation, then advanced from its previous value on each success.
    pub next_due_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
