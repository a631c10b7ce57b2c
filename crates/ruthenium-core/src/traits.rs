//! Trait interfaces for the Ruthenium protocol.
//!
//! These traits define the contracts between the engine and its
//! collaborators:
//! - [`Clock`] — wall-clock source injected wherever timestamps are compared
//! - [`ValueModel`] — decay/income policy (ruthenium-decay implements)
//! - [`Neighbor`] / [`Neighborhood`] — peers and their reputation (ruthenium-node implements)
//! - [`HumanityOracle`] — external address eligibility registry
//!
//! In-memory doubles for all of them live in [`crate::testing`] behind the
//! `testing` feature.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{NetworkError, RegistryError};
use crate::types::Address;

/// Source of the current time in Unix nanoseconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
    }
}

/// Pure function giving the spendable value of an output.
///
/// Every node must use the same implementation: fee validity, and therefore
/// block validity, depends on it.
///
/// Implementations must be deterministic, non-increasing in `elapsed` for
/// non-yielding outputs, and must saturate rather than overflow.
pub trait ValueModel: Send + Sync {
    /// Value of an output of `initial_value` after `elapsed` nanoseconds.
    /// `elapsed <= 0` returns `initial_value`.
    fn value(&self, initial_value: u64, is_yielding: bool, elapsed: i64) -> u64;
}

/// A remote node. Every answer is untrusted.
#[async_trait]
pub trait Neighbor: Send + Sync {
    /// Stable identifier of the neighbor, usually `ip:port`.
    fn target(&self) -> &str;

    /// JSON-encoded blocks starting at `starting_height`.
    async fn get_blocks(&self, starting_height: u64) -> Result<Vec<u8>, NetworkError>;

    /// Relay a JSON-encoded [`TransactionRequest`](crate::types::TransactionRequest).
    async fn add_transaction(&self, request: Vec<u8>) -> Result<(), NetworkError>;
}

/// The set of known neighbors and their reputation.
pub trait Neighborhood: Send + Sync {
    /// Neighbors to talk to, best first.
    fn neighbors(&self) -> Vec<Arc<dyn Neighbor>>;

    /// Credit a neighbor that relayed valid data.
    fn incentive(&self, target: &str);

    /// Debit a neighbor that relayed invalid data.
    fn penalize(&self, target: &str);
}

/// External registry deciding which addresses may hold a yielding output.
///
/// Slow and unreliable: callers treat errors as "unknown for now".
#[async_trait]
pub trait HumanityOracle: Send + Sync {
    async fn is_registered(&self, address: &Address) -> Result<bool, RegistryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z in nanoseconds.
        assert!(SystemClock.now() > 1_577_836_800_000_000_000);
    }

    #[test]
    fn system_clock_does_not_go_backwards() {
        let first = SystemClock.now();
        let second = SystemClock.now();
        assert!(second >= first);
    }

    struct Flat;

    impl ValueModel for Flat {
        fn value(&self, initial_value: u64, _is_yielding: bool, _elapsed: i64) -> u64 {
            initial_value
        }
    }

    #[test]
    fn value_model_is_object_safe() {
        let model: Arc<dyn ValueModel> = Arc::new(Flat);
        assert_eq!(model.value(5, false, 10), 5);
    }
}
