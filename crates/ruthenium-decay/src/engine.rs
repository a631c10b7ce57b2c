//! Half-life model implementing the [`ValueModel`] trait.
//!
//! Floating-point results are floored and cast back with Rust's saturating
//! `as` semantics, so a value never overflows and never goes negative.

use std::f64::consts::LN_2;

use ruthenium_core::settings::{ProtocolSettings, ValueParameters};
use ruthenium_core::traits::ValueModel;

use crate::curve::IncomeCurve;

/// The production value model.
///
/// Implements [`ValueModel`] with:
/// - exponential decay of non-yielding outputs
/// - bounded income for yielding outputs, converging to the income limit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfLifeModel {
    half_life: f64,
    income_limit: u64,
    curve: IncomeCurve,
}

impl HalfLifeModel {
    pub fn new(parameters: ValueParameters) -> Self {
        Self {
            half_life: parameters.half_life_in_nanoseconds,
            income_limit: parameters.income_limit,
            curve: IncomeCurve::new(parameters.income_base, parameters.income_limit),
        }
    }

    pub fn from_settings(settings: &ProtocolSettings) -> Self {
        Self::new(settings.value_parameters())
    }

    fn decay(&self, initial_value: u64, x: f64) -> u64 {
        let y = initial_value as f64;
        (y * (-x * LN_2 / self.half_life).exp()).floor() as u64
    }

    fn income(&self, initial_value: u64, x: f64) -> u64 {
        let limit = self.income_limit;
        if initial_value < limit {
            let y = initial_value as f64;
            let l = limit as f64;
            let IncomeCurve { k1, k2 } = self.curve;
            let exponent = -(x * LN_2 / (k2 * self.half_life) + (-((l - y) / l).ln()).powf(1.0 / k1))
                .powf(k1);
            let value = ((-l * exponent.exp()).floor() + l) as u64;
            value.clamp(initial_value, limit)
        } else if initial_value > limit {
            self.decay(initial_value - limit, x).saturating_add(limit)
        } else {
            limit
        }
    }
}

impl ValueModel for HalfLifeModel {
    fn value(&self, initial_value: u64, is_yielding: bool, elapsed: i64) -> u64 {
        if elapsed <= 0 || !(self.half_life.is_finite() && self.half_life > 0.0) {
            return initial_value;
        }
        let x = elapsed as f64;
        if is_yielding {
            self.income(initial_value, x)
        } else {
            self.decay(initial_value, x)
        }
    }
}
