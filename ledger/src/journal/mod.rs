//! # Journal Module — The Append-Only Transaction Log
//!
//! Every committed transfer leaves exactly one [`TransactionRecord`] here,
//! written in the same transactional scope as the balance changes it
//! describes. There is no update and no delete: the journal is the audit
//! trail, and audit trails that can be edited are called fiction.
//!
//! ## Architecture
//!
//! ```text
//! record.rs — TransactionId, TransactionRecord
//! store.rs  — Journal: in-scope append, recency-ordered history, idempotency lookup
//! ```
//!
//! ## Ordering
//!
//! Records carry a global commit sequence number (`seq`) allocated inside
//! the commit scope. Per-account index keys end in the big-endian `seq`,
//! so a reverse prefix scan returns history newest-first without sorting.

pub mod record;
pub mod store;

pub use record::{TransactionId, TransactionRecord};
pub use store::{AppendError, Journal};
