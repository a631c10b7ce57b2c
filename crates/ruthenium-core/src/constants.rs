//! Protocol constants. All monetary values in the smallest unit
//! (1 coin = 10^8 units).

pub const COIN: u64 = 100_000_000;

pub const NANOSECONDS_PER_SECOND: i64 = 1_000_000_000;

pub const NANOSECONDS_PER_DAY: f64 = 86_400.0 * 1e9;

/// Default number of blocks kept in memory.
pub const DEFAULT_BLOCKS_COUNT_LIMIT: u64 = 1_008;

/// Amount paid to the first validator by the genesis block.
pub const DEFAULT_GENESIS_AMOUNT: u64 = 100_000 * COIN;

/// Time for a non-yielding balance to lose half of its value.
pub const DEFAULT_HALF_LIFE_IN_DAYS: f64 = 373.59;

/// Shapes the start of the income curve of yielding outputs.
pub const DEFAULT_INCOME_BASE: u64 = 500 * COIN;

/// Value a yielding output converges to.
pub const DEFAULT_INCOME_LIMIT: u64 = 100_000 * COIN;

pub const DEFAULT_MINIMAL_TRANSACTION_FEE: u64 = 1_000;

pub const DEFAULT_VALIDATION_INTERVAL_IN_SECONDS: i64 = 60;

pub const DEFAULT_VALIDATION_TIMEOUT_IN_SECONDS: i64 = 5;

pub const DEFAULT_VERIFICATIONS_COUNT_PER_VALIDATION: u32 = 6;

/// Number of already-known blocks a neighbor is asked to resend.
pub const DEFAULT_VERIFICATION_OVERLAP: u64 = 1;

pub const DEFAULT_PORT: u16 = 8106;

pub const DEFAULT_MAX_OUTBOUNDS_COUNT: usize = 8;

pub const DEFAULT_SYNCHRONIZATION_INTERVAL_IN_SECONDS: u64 = 10;

pub const DEFAULT_REGISTRY_SYNCHRONIZATION_INTERVAL_IN_SECONDS: u64 = 3_600;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn income_limit_above_base() {
        assert!(DEFAULT_INCOME_LIMIT > DEFAULT_INCOME_BASE);
    }

    #[test]
    fn timeout_shorter_than_interval() {
        assert!(DEFAULT_VALIDATION_TIMEOUT_IN_SECONDS < DEFAULT_VALIDATION_INTERVAL_IN_SECONDS);
    }

    #[test]
    fn verification_overlap_is_at_least_one_block() {
        assert!(DEFAULT_VERIFICATION_OVERLAP >= 1);
    }
}
