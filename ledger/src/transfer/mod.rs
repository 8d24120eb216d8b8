//! # Transfer Module — Validation, Commit, Retry
//!
//! The only way money moves. A transfer is validated in a fixed order,
//! committed atomically (debit + credit + journal append in one scope),
//! and retried a bounded number of times when it loses an optimistic
//! concurrency race. Everything else in the system that moves value,
//! including the recurring scheduler, calls into here.
//!
//! ## Architecture
//!
//! ```text
//! types.rs  — TransferRequest, TransferError
//! engine.rs — LedgerEngine: the validate/commit/retry pipeline
//! ```
//!
//! ## Commit Protocol
//!
//! 1. **Validate** against a snapshot: amount positive, receiver resolves,
//!    no self-transfer, sender balance sufficient. First failure wins.
//! 2. **Commit** in a two-tree sled transaction: re-check the idempotency
//!    key, apply both deltas (which re-verify the snapshot versions),
//!    allocate a sequence number, append the record.
//! 3. **Retry** from step 1 if a version check failed, up to
//!    [`crate::config::MAX_COMMIT_ATTEMPTS`] times, then surface
//!    `StorageConflict`. Every retry re-runs the full validation; a
//!    request that became invalid mid-race gets the right error, not a
//!    stale one.

pub mod engine;
pub mod types;

pub use engine::LedgerEngine;
pub use types::{TransferError, TransferRequest, TransferResult};
