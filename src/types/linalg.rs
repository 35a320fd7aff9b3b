//! Vector aliases used by the fusion filters.
//!
//! Raw register triples are widened to `f64` once, at the filter boundary,
//! so every pipeline stage after that works on `Axis3`.

use nalgebra::Vector3;

use super::RawAxes;

pub type Axis3 = Vector3<f64>;

impl From<RawAxes> for Axis3 {
    fn from(raw: RawAxes) -> Self {
        Vector3::new(raw.x as f64, raw.y as f64, raw.z as f64)
    }
}

/// Per-axis exponential low-pass: `prev * (1 - factor) + sample * factor`.
pub fn low_pass(prev: &Axis3, sample: &Axis3, factor: f64) -> Axis3 {
    prev * (1.0 - factor) + sample * factor
}
