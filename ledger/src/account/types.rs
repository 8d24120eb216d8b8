//! Core account types: identifiers, addresses, the account record, and the
//! receiver reference used by everything that needs to say "pay this one".

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config;
use crate::storage::DbError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from account provisioning and identifier parsing.
#[derive(Debug, Error)]
pub enum AccountError {
    /// The supplied address failed validation. The payload says why.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Another account already claimed this address. Addresses are
    /// globally unique; first writer wins.
    #[error("address already registered: {0}")]
    AddressTaken(String),

    /// The string was not a well-formed account id.
    #[error("invalid account id: {0}")]
    InvalidAccountId(String),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

pub type AccountResult<T> = Result<T, AccountError>;

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// Opaque unique identifier for an account.
///
/// A v4 UUID under the hood. Serializes as the hyphenated string in JSON
/// and as 16 raw bytes in bincode; the byte form doubles as the storage
/// key for the account record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Mint a fresh id. Collisions are a lottery nobody wins.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The 16-byte form used as key material in storage.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Rebuild an id from stored key bytes. `None` if the slice isn't
    /// exactly 16 bytes, which means the index entry is corrupt.
    pub(crate) fn from_slice(bytes: &[u8]) -> Option<Self> {
        Uuid::from_slice(bytes).ok().map(Self)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| AccountError::InvalidAccountId(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Human-usable payment handle, unique across the whole ledger.
///
/// Server-generated addresses look like `vega-<32 hex chars>`. Callers may
/// also bring their own (a phone number, a username), subject to the
/// validation rules in [`Address::parse`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Generate a fresh `vega-` address.
    pub fn generate() -> Self {
        Self(format!("{}{}", config::ADDRESS_PREFIX, Uuid::new_v4().simple()))
    }

    /// Validate a caller-supplied address.
    ///
    /// Rules: length within [`config::MIN_ADDRESS_LENGTH`] and
    /// [`config::MAX_ADDRESS_LENGTH`], no whitespace, and only ASCII
    /// alphanumerics plus `- _ . @ +`. That set covers phone numbers,
    /// emails, and handles without letting control characters or emoji
    /// into a keyspace people grep through.
    pub fn parse(raw: &str) -> AccountResult<Self> {
        if raw.len() < config::MIN_ADDRESS_LENGTH {
            return Err(AccountError::InvalidAddress(format!(
                "shorter than {} characters",
                config::MIN_ADDRESS_LENGTH
            )));
        }
        if raw.len() > config::MAX_ADDRESS_LENGTH {
            return Err(AccountError::InvalidAddress(format!(
                "longer than {} characters",
                config::MAX_ADDRESS_LENGTH
            )));
        }
        if let Some(bad) = raw.chars().find(|c| !Self::is_allowed_char(*c)) {
            return Err(AccountError::InvalidAddress(format!(
                "unsupported character {bad:?}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    fn is_allowed_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | '+')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ReceiverRef
// ---------------------------------------------------------------------------

/// How a caller names the receiving account.
///
/// Everything that pays someone goes through one resolution function
/// ([`super::AccountStore::resolve`]) taking this union, so "pay an
/// address" and "pay an account id" can never diverge in behavior.
///
/// Serializes externally tagged: `{"by_address": "vega-..."}` or
/// `{"by_id": "<uuid>"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverRef {
    /// Look up by payment address. Unknown or malformed addresses simply
    /// fail to resolve; there is no separate validation error on this path.
    ByAddress(String),
    /// Look up by opaque account id.
    ById(AccountId),
}

impl fmt::Display for ReceiverRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverRef::ByAddress(addr) => write!(f, "address {addr:?}"),
            ReceiverRef::ById(id) => write!(f, "account {id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// A custodial account record.
///
/// The `version` field is a per-account write counter: every committed
/// balance change increments it, and the delta primitive refuses to apply
/// against a stale snapshot. Callers outside this crate can read it but
/// never set it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Opaque unique id; the storage key.
    pub account_id: AccountId,

    /// Unique human-shareable payment handle.
    pub address: Address,

    /// Current balance in minor units. Never negative by construction:
    /// the type can't express it and the delta primitive won't allow it.
    pub balance: u64,

    /// Monotonic write counter backing optimistic concurrency.
    pub version: u64,

    /// When the account was provisioned.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Build a fresh account record at version zero.
    pub fn new(account_id: AccountId, address: Address, balance: u64) -> Self {
        Self {
            account_id,
            address,
            balance,
            version: 0,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_address_passes_its_own_validation() {
        let addr = Address::generate();
        assert!(addr.as_str().starts_with(config::ADDRESS_PREFIX));
        let reparsed = Address::parse(addr.as_str()).expect("generated address must be valid");
        assert_eq!(reparsed, addr);
    }

    #[test]
    fn generated_addresses_are_unique() {
        let a = Address::generate();
        let b = Address::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn address_accepts_phone_numbers_and_handles() {
        assert!(Address::parse("+919876543210").is_ok());
        assert!(Address::parse("maya.k@upi").is_ok());
        assert!(Address::parse("team_lunch-fund").is_ok());
    }

    #[test]
    fn address_rejects_short_long_and_weird() {
        assert!(matches!(
            Address::parse("ab"),
            Err(AccountError::InvalidAddress(_))
        ));
        let long = "x".repeat(config::MAX_ADDRESS_LENGTH + 1);
        assert!(matches!(
            Address::parse(&long),
            Err(AccountError::InvalidAddress(_))
        ));
        assert!(matches!(
            Address::parse("has space"),
            Err(AccountError::InvalidAddress(_))
        ));
        assert!(matches!(
            Address::parse("tab\there"),
            Err(AccountError::InvalidAddress(_))
        ));
        assert!(matches!(
            Address::parse("emoji-💸"),
            Err(AccountError::InvalidAddress(_))
        ));
    }

    #[test]
    fn account_id_display_roundtrip() {
        let id = AccountId::generate();
        let text = id.to_string();
        let back: AccountId = text.parse().expect("display form must parse");
        assert_eq!(back, id);
    }

    #[test]
    fn account_id_rejects_garbage() {
        let result: Result<AccountId, _> = "not-a-uuid".parse();
        assert!(matches!(result, Err(AccountError::InvalidAccountId(_))));
    }

    #[test]
    fn account_id_from_slice_checks_length() {
        let id = AccountId::generate();
        assert_eq!(AccountId::from_slice(id.as_bytes()), Some(id));
        assert_eq!(AccountId::from_slice(&[1, 2, 3]), None);
    }

    #[test]
    fn receiver_ref_json_shape() {
        let by_addr = ReceiverRef::ByAddress("vega-abc".to_string());
        let json = serde_json::to_string(&by_addr).unwrap();
        assert_eq!(json, r#"{"by_address":"vega-abc"}"#);

        let id = AccountId::generate();
        let by_id = ReceiverRef::ById(id);
        let json = serde_json::to_string(&by_id).unwrap();
        assert_eq!(json, format!(r#"{{"by_id":"{id}"}}"#));

        let back: ReceiverRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, by_id);
    }

    #[test]
    fn new_account_starts_at_version_zero() {
        let account = Account::new(AccountId::generate(), Address::generate(), 100_000);
        assert_eq!(account.version, 0);
        assert_eq!(account.balance, 100_000);
    }

    #[test]
    fn account_bincode_roundtrip() {
        let account = Account::new(AccountId::generate(), Address::generate(), 42);
        let bytes = bincode::serialize(&account).unwrap();
        let back: Account = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, account);
    }
}
