//! # Savings Goals — Named Ambitions
//!
//! A goal is bookkeeping, not money: it names a target amount for an owner
//! and never touches a balance. `saved_amount` starts at zero and is
//! reported as-is; funding a goal is an ordinary transfer like any other.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Tree;
use thiserror::Error;
use uuid::Uuid;

use crate::account::{AccountId, AccountStore};
use crate::config;
use crate::storage::db::{decode, encode};
use crate::storage::{DbError, DbResult, VegaDB};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything that can go wrong while managing goals.
#[derive(Debug, Error)]
pub enum GoalError {
    /// The goal name is unusable; the payload explains how.
    #[error("invalid goal name: {0}")]
    InvalidName(String),

    /// A goal needs a positive target to aim for.
    #[error("goal target must be positive")]
    InvalidTarget,

    /// No account exists under the given owner id.
    #[error("owner account {0} not found")]
    OwnerNotFound(AccountId),

    /// The storage layer failed underneath us.
    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

pub type GoalResult<T> = Result<T, GoalError>;

/// Unique identifier for a savings goal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoalId(Uuid);

impl GoalId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A savings target owned by one account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingsGoal {
    pub goal_id: GoalId,
    pub owner_account_id: AccountId,
    pub name: String,
    /// What the owner is aiming for, in minor units.
    pub target_amount: u64,
    /// Progress so far. Starts at zero.
    pub saved_amount: u64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// GoalStore
// ---------------------------------------------------------------------------

/// Typed operations over the `goals` tree.
///
/// Keys are owner id (16B) ++ goal id (16B), so one prefix scan lists an
/// owner's goals and nothing else.
#[derive(Clone)]
pub struct GoalStore {
    tree: Tree,
    accounts: Arc<AccountStore>,
}

fn goal_key(owner: &AccountId, goal: &GoalId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(owner.as_bytes());
    key.extend_from_slice(goal.as_bytes());
    key
}

impl GoalStore {
    pub fn new(db: &VegaDB, accounts: Arc<AccountStore>) -> Self {
        Self {
            tree: db.goals_tree(),
            accounts,
        }
    }

    /// Register a goal for an existing owner. Moves no money.
    pub fn create(
        &self,
        owner: &AccountId,
        name: &str,
        target_amount: u64,
    ) -> GoalResult<SavingsGoal> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GoalError::InvalidName("name is empty".to_string()));
        }
        if name.chars().count() > config::MAX_GOAL_NAME_LENGTH {
            return Err(GoalError::InvalidName(format!(
                "name exceeds {} characters",
                config::MAX_GOAL_NAME_LENGTH
            )));
        }
        if target_amount == 0 {
            return Err(GoalError::InvalidTarget);
        }
        let owner_account = self
            .accounts
            .get(owner)?
            .ok_or(GoalError::OwnerNotFound(*owner))?;

        let goal = SavingsGoal {
            goal_id: GoalId::generate(),
            owner_account_id: owner_account.account_id,
            name: name.to_string(),
            target_amount,
            saved_amount: 0,
            created_at: Utc::now(),
        };
        self.tree
            .insert(goal_key(&goal.owner_account_id, &goal.goal_id), encode(&goal)?)
            .map_err(DbError::Sled)?;
        self.tree.flush().map_err(DbError::Sled)?;
        tracing::debug!(
            goal = %goal.goal_id,
            owner = %goal.owner_account_id,
            target = goal.target_amount,
            "savings goal created"
        );
        Ok(goal)
    }

    /// All goals owned by an account, oldest first.
    pub fn list_for_owner(&self, owner: &AccountId) -> DbResult<Vec<SavingsGoal>> {
        let prefix: &[u8] = owner.as_bytes();
        let mut goals = Vec::new();
        for entry in self.tree.scan_prefix(prefix) {
            let (_key, bytes) = entry?;
            goals.push(decode::<SavingsGoal>(&bytes)?);
        }
        goals.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.goal_id.cmp(&b.goal_id))
        });
        Ok(goals)
    }

    /// Number of goals across all owners.
    pub fn count(&self) -> usize {
        self.tree.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
