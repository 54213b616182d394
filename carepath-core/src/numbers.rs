//! Count and feature conversions used by the metrics and model encoders.

use num_traits::cast::cast;

/// `value / scale` narrowed to an `f32` model feature. Non-finite results
/// (zero scale, NaN input) encode as 0.0.
#[must_use]
pub fn scaled_feature(value: f64, scale: f64) -> f32 {
    let scaled = value / scale;
    if !scaled.is_finite() {
        return 0.0;
    }
    let limit = f64::from(f32::MAX);
    cast::<f64, f32>(scaled.clamp(-limit, limit)).unwrap_or(0.0)
}

/// Convert a count to f64 while allowing precision loss in a single location.
#[must_use]
pub fn count_to_f64(value: usize) -> f64 {
    cast::<usize, f64>(value).unwrap_or(0.0)
}

/// `numerator / denominator`, or 0.0 when the denominator is zero.
#[must_use]
pub fn ratio(numerator: f64, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / count_to_f64(denominator)
    }
}
