//! # Account Module — Identity & Balance Custody
//!
//! The account is the unit of custody in VEGA. Every user holds exactly one
//! balance, addressed two ways: an opaque `AccountId` for machines and a
//! human-shareable payment `Address` for people. This module owns both,
//! plus the one primitive through which every balance in the system is
//! allowed to change.
//!
//! ## Architecture
//!
//! ```text
//! types.rs — AccountId, Address, Account, ReceiverRef, error type
//! store.rs — AccountStore: provisioning, lookup, the balance delta primitive
//! ```
//!
//! ## Design Principles
//!
//! 1. **All amounts are `u64` in minor units.** No floating point. No
//!    decimals in arithmetic. Display formatting is a front-end problem.
//!
//! 2. **One mutation path.** Balances change only through
//!    [`AccountStore::apply_delta_in`], and only inside a transactional
//!    scope supplied by the caller. There is no separate credit path, no
//!    separate debit path, and therefore no pair of paths to drift apart.
//!
//! 3. **Optimistic concurrency.** Every account carries a `version`
//!    counter. The delta primitive compares it against the caller's
//!    snapshot and aborts the scope on a mismatch, which is what makes
//!    concurrent transfers serialize without a lock table.

pub mod store;
pub mod types;

pub use store::{AccountStore, DeltaError};
pub use types::{Account, AccountError, AccountId, AccountResult, Address, ReceiverRef};
