//! # Ledger Configuration & Constants
//!
//! Every magic number in VEGA lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! These values define how the ledger behaves for every wallet it holds.
//! Changing them on a live deployment is somewhere between "risky" and
//! "career-ending", so choose wisely while the data is still disposable.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Monetary Units
// ---------------------------------------------------------------------------

/// All balances and amounts are u64 minor units (cents, paise, satoshi-like,
/// pick your jurisdiction). The ledger never divides and never touches a
/// float. Display formatting is strictly a front-end problem.
pub const MINOR_UNITS_PER_UNIT: u64 = 100;

/// Starting balance granted to every freshly provisioned account, in minor
/// units. 100 000 = 1 000.00 in display units. Custodial demo-money
/// semantics: the grant is the only mint this system ever performs, so the
/// conservation invariant holds from the first transfer onward.
pub const STARTING_BALANCE: u64 = 100_000;

// ---------------------------------------------------------------------------
// Transfer Engine
// ---------------------------------------------------------------------------

/// How many times the engine will re-validate and re-attempt a transfer
/// commit after losing an optimistic-concurrency race before giving up with
/// `StorageConflict`. Eight attempts survives pathological contention in
/// every load test we've run; if a workload exhausts this, the caller gets
/// a clean retryable error instead of an unbounded spin.
pub const MAX_COMMIT_ATTEMPTS: u32 = 8;

// ---------------------------------------------------------------------------
// Transaction History
// ---------------------------------------------------------------------------

/// Default page size for transaction history queries when the caller does
/// not ask for one. A phone screen of activity, roughly.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Hard cap on a single history query. Anything bigger is an export job,
/// not an API call.
pub const MAX_HISTORY_LIMIT: usize = 1_000;

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// Prefix for server-generated payment addresses. Short enough to type,
/// distinctive enough to spot in a log line.
pub const ADDRESS_PREFIX: &str = "vega-";

/// Minimum length for a caller-supplied address. Three characters keeps
/// out the empty string and the inevitable "a" test account.
pub const MIN_ADDRESS_LENGTH: usize = 3;

/// Maximum address length. Generated addresses are 37 characters
/// ("vega-" plus a 32-hex UUID); 64 leaves headroom for phone numbers,
/// handles, and whatever else people route money at.
pub const MAX_ADDRESS_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// Idempotency
// ---------------------------------------------------------------------------

/// Maximum length of a client-supplied idempotency key. 128 characters fits
/// a UUID, a ULID, or a reasonable composite key. It does not fit a JSON
/// payload, which is the point.
pub const MAX_IDEMPOTENCY_KEY_LENGTH: usize = 128;

// ---------------------------------------------------------------------------
// Recurring Payments
// ---------------------------------------------------------------------------

/// How often the service sweeps for due recurring instructions. Thirty
/// seconds keeps "due" and "executed" close enough that nobody notices the
/// gap, without hammering the store.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Sweep interval as seconds, because clap and tokio want a u64, not a
/// Duration. Keep this in sync with DEFAULT_SWEEP_INTERVAL or face the
/// wrath of the config sanity tests.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Savings Goals
// ---------------------------------------------------------------------------

/// Maximum goal name length. Enough for "Emergency fund (do not touch)",
/// not enough for your novel.
pub const MAX_GOAL_NAME_LENGTH: usize = 80;

// ---------------------------------------------------------------------------
// Service Defaults
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_HTTP_PORT: u16 = 8686;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 8687;

/// Ledger version string, assembled at compile time so we don't allocate
/// for something this trivial at runtime.
pub const LEDGER_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Clamps a requested history page size into the allowed range, applying
/// the default when the caller didn't specify one. Zero is treated as
/// "use the default" rather than "give me nothing", because every client
/// that has ever sent limit=0 meant the former.
pub fn clamp_history_limit(requested: Option<usize>) -> usize {
    match requested {
        None | Some(0) => DEFAULT_HISTORY_LIMIT,
        Some(n) => n.min(MAX_HISTORY_LIMIT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starting_balance_is_positive() {
        // A wallet provisioned with zero would make half the test suite
        // meaningless and all of the demos depressing.
        assert!(STARTING_BALANCE > 0);
    }

    #[test]
    fn test_commit_attempts_bounded() {
        // One attempt means no retry at all; a thousand means we've built
        // a spin loop with extra steps.
        assert!(MAX_COMMIT_ATTEMPTS >= 2);
        assert!(MAX_COMMIT_ATTEMPTS <= 64);
    }

    #[test]
    fn test_history_limits_ordered() {
        assert!(DEFAULT_HISTORY_LIMIT <= MAX_HISTORY_LIMIT);
        assert!(DEFAULT_HISTORY_LIMIT > 0);
    }

    #[test]
    fn test_address_length_bounds() {
        // Generated addresses must fit their own validation rules.
        let generated_len = ADDRESS_PREFIX.len() + 32;
        assert!(generated_len <= MAX_ADDRESS_LENGTH);
        assert!(MIN_ADDRESS_LENGTH < MAX_ADDRESS_LENGTH);
    }

    #[test]
    fn test_sweep_interval_twins_in_sync() {
        assert_eq!(DEFAULT_SWEEP_INTERVAL.as_secs(), DEFAULT_SWEEP_INTERVAL_SECS);
    }

    #[test]
    fn test_service_ports_distinct() {
        // If these collide, someone has been editing ports while
        // sleep-deprived.
        assert_ne!(DEFAULT_HTTP_PORT, DEFAULT_METRICS_PORT);
    }

    #[test]
    fn test_clamp_history_limit() {
        assert_eq!(clamp_history_limit(None), DEFAULT_HISTORY_LIMIT);
        assert_eq!(clamp_history_limit(Some(0)), DEFAULT_HISTORY_LIMIT);
        assert_eq!(clamp_history_limit(Some(5)), 5);
        assert_eq!(clamp_history_limit(Some(10_000)), MAX_HISTORY_LIMIT);
    }
}
