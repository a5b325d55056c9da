//! Page confidence as a percentage.

use super::engines::PageResult;
use crate::prelude::*;

/// Convert the engine's mean confidence to a percentage.
///
/// Values outside [0, 1] break the engine's contract. We log them and clamp,
/// so the result is always in [0, 100].
pub fn score(page: &PageResult) -> f32 {
    let mean = page.mean_confidence;
    if mean.is_nan() {
        warn!("engine reported a NaN confidence, using 0");
        return 0.0;
    }
    if !(0.0..=1.0).contains(&mean) {
        warn!(mean_confidence = mean, "engine confidence outside [0, 1], clamping");
    }
    mean.clamp(0.0, 1.0) * 100.0
}
