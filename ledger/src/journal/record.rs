//! The transaction record and its identifier.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::AccountId;

// ---------------------------------------------------------------------------
// TransactionId
// ---------------------------------------------------------------------------

/// Opaque unique identifier for a committed transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
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

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ---------------------------------------------------------------------------
// TransactionRecord
// ---------------------------------------------------------------------------

/// One committed transfer, exactly as it happened.
///
/// Immutable once written. `sender_account_id != receiver_account_id` and
/// `amount > 0` are guaranteed by the engine before the record is ever
/// constructed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: TransactionId,

    /// The debited account.
    pub sender_account_id: AccountId,

    /// The credited account.
    pub receiver_account_id: AccountId,

    /// Transferred amount in minor units. Always positive.
    pub amount: u64,

    /// Wall-clock time of the commit attempt that succeeded.
    pub timestamp: DateTime<Utc>,

    /// Global commit sequence number. Strictly increasing across the whole
    /// journal; the authoritative recency order (timestamps can collide,
    /// sequence numbers can't).
    pub seq: u64,

    /// Client-supplied idempotency key, if the transfer carried one.
    pub idempotency_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountId;

    fn sample() -> TransactionRecord {
        TransactionRecord {
            transaction_id: TransactionId::generate(),
            sender_account_id: AccountId::generate(),
            receiver_account_id: AccountId::generate(),
            amount: 4_000,
            timestamp: Utc::now(),
            seq: 7,
            idempotency_key: Some("order-1129".to_string()),
        }
    }

    #[test]
    fn transaction_id_display_roundtrip() {
        let id = TransactionId::generate();
        let back: TransactionId = id.to_string().parse().unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn record_bincode_roundtrip() {
        let record = sample();
        let bytes = bincode::serialize(&record).unwrap();
        let back: TransactionRecord = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn record_bincode_roundtrip_without_key() {
        let record = TransactionRecord {
            idempotency_key: None,
            ..sample()
        };
        let bytes = bincode::serialize(&record).unwrap();
        let back: TransactionRecord = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.idempotency_key, None);
    }

    #[test]
    fn record_json_uses_string_ids() {
        let record = sample();
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["transaction_id"].is_string());
        assert!(json["sender_account_id"].is_string());
        assert_eq!(json["amount"], 4_000);
    }
}
