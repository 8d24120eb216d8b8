//! # Storage Module
//!
//! Persistence for the VEGA ledger. Everything the system knows lives in
//! one embedded sled database; this module owns the handle and the tree
//! layout, and the domain stores build their typed operations on top.
//!
//! ## Architecture
//!
//! ```text
//! db.rs — VegaDB: sled handle, named trees, error type, flush
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! AccountStore   Journal   InstructionStore   GoalStore
//!       \           |            |               /
//!        +----------+------------+--------------+
//!                        |
//!                      VegaDB
//!                   (named trees)
//! ```
//!
//! ## Design Decisions
//!
//! 1. **One sled database, one tree per domain.** Accounts, the address
//!    index, the journal, recurring instructions, and savings goals each
//!    get their own keyspace. Cross-tree atomicity comes from sled's
//!    transactions, and every atomic scope in the ledger spans at most
//!    two trees.
//!
//! 2. **Bincode for on-disk values.** Compact, fast, deterministic. JSON
//!    is for APIs and debugging; bincode is for storage.
//!
//! 3. **Big-endian integer key suffixes.** Commit sequence numbers and
//!    due timestamps are encoded big-endian so sled's lexicographic
//!    ordering matches numeric ordering and range scans come back in the
//!    order the domain wants them.

pub mod db;

pub use db::{DbError, DbResult, VegaDB};
