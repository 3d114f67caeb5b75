//! Two distinct heuristics live here.
//!
//! * [`composite::ScoringEngine`] blends five weighted sub-scores into a
//!   fractional total with a confidence level.
//! * [`holding::HoldingScorer`] is the simpler integer score the daily
//!   portfolio report uses, with its own recommendation cut-offs.

pub mod composite;
pub mod holding;

pub use composite::ScoringEngine;
pub use holding::HoldingScorer;

pub(crate) fn clamp_score(v: f64) -> f64 {
    v.clamp(0.0, 100.0)
}
