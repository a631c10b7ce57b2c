//! Shape coefficients of the income curve.
//!
//! Income follows `l - l * exp(-(t / (k2 * h))^k1)` where `l` is the income
//! limit and `h` the half-life. `k1` bends the curve so small balances grow
//! faster; `k2` pins the value reached after one half-life to the income
//! base.

use std::f64::consts::LN_2;

/// Coefficients derived from the income base and limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IncomeCurve {
    pub k1: f64,
    pub k2: f64,
}

impl IncomeCurve {
    pub fn new(income_base: u64, income_limit: u64) -> Self {
        if income_limit <= income_base || income_base == 0 {
            return Self { k1: 1.0, k2: 1.0 };
        }
        let base = income_base as f64;
        let limit = income_limit as f64;
        let k1 = 3.0 - 2.0 * (2.0 * base).ln() / limit.ln();
        let k2 = LN_2 / (-(1.0 - base / limit).ln()).powf(1.0 / k1);
        Self { k1, k2 }
    }
}
