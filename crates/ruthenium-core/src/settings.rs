//! Protocol settings shared by every node of a network.
//!
//! Two nodes disagreeing on any of these values will reject each other's
//! blocks. Durations are stored in seconds (as in the settings file) and
//! exposed in nanoseconds for timestamp arithmetic.
//!
//! # Examples
//!
//! ```
//! use ruthenium_core::settings::ProtocolSettings;
//! let settings = ProtocolSettings {
//!     validation_interval_in_seconds: 2,
//!     ..ProtocolSettings::default()
//! };
//! assert_eq!(settings.validation_timestamp(), 2_000_000_000);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    /// Maximum number of blocks retained in memory.
    pub blocks_count_limit: u64,
    pub genesis_amount: u64,
    pub half_life_in_days: f64,
    pub income_base: u64,
    pub income_limit: u64,
    pub minimal_transaction_fee: u64,
    pub validation_interval_in_seconds: i64,
    /// Per-neighbor bound on a chain fetch.
    pub validation_timeout_in_seconds: i64,
    /// Chain verifications per validation interval.
    pub verifications_count_per_validation: u32,
    /// Number of trailing local blocks a neighbor may replace.
    pub verification_overlap: u64,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            blocks_count_limit: DEFAULT_BLOCKS_COUNT_LIMIT,
            genesis_amount: DEFAULT_GENESIS_AMOUNT,
            half_life_in_days: DEFAULT_HALF_LIFE_IN_DAYS,
            income_base: DEFAULT_INCOME_BASE,
            income_limit: DEFAULT_INCOME_LIMIT,
            minimal_transaction_fee: DEFAULT_MINIMAL_TRANSACTION_FEE,
            validation_interval_in_seconds: DEFAULT_VALIDATION_INTERVAL_IN_SECONDS,
            validation_timeout_in_seconds: DEFAULT_VALIDATION_TIMEOUT_IN_SECONDS,
            verifications_count_per_validation: DEFAULT_VERIFICATIONS_COUNT_PER_VALIDATION,
            verification_overlap: DEFAULT_VERIFICATION_OVERLAP,
        }
    }
}

impl ProtocolSettings {
    /// Validation interval in nanoseconds: the exact gap between two blocks.
    pub fn validation_timestamp(&self) -> i64 {
        self.validation_interval_in_seconds
            .saturating_mul(NANOSECONDS_PER_SECOND)
    }

    pub fn validation_timer(&self) -> Duration {
        Duration::from_secs(self.validation_interval_in_seconds.max(0) as u64)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_in_seconds.max(0) as u64)
    }

    pub fn half_life_in_nanoseconds(&self) -> f64 {
        self.half_life_in_days * NANOSECONDS_PER_DAY
    }

    pub fn value_parameters(&self) -> ValueParameters {
        ValueParameters {
            half_life_in_nanoseconds: self.half_life_in_nanoseconds(),
            income_base: self.income_base,
            income_limit: self.income_limit,
        }
    }
}

/// The three economic constants of the value model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueParameters {
    pub half_life_in_nanoseconds: f64,
    pub income_base: u64,
    pub income_limit: u64,
}
