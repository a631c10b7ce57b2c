//! # ruthenium-decay — Half-life value model.
//!
//! The production [`ValueModel`](ruthenium_core::traits::ValueModel):
//! - **Decay**: a non-yielding output loses half of its value every half-life.
//! - **Income**: a yielding output below the income limit grows toward it
//!   along a Weibull-shaped curve; one above the limit decays toward it.
//! - **Income base**: a yielding output created empty is worth exactly the
//!   income base after one half-life.
//!
//! Values are computed in `f64` and floored back to integer units. Every node
//! must run this same code for fees to agree.

pub mod curve;
pub mod engine;

pub use curve::IncomeCurve;
pub use engine::HalfLifeModel;
