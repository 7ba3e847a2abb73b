//! # Delta Prediction
//!
//! Reconstructs a plausible quantized value for a tick that has no
//! snapshot, by linear extrapolation from two historical baselines.
//!
//! ```text
//!   value
//!     │            ● v1 (t1)
//!     │        ○ predicted (target)
//!     │    ● v2 (t2)
//!     └──────────────────────── tick
//!
//!   predicted = v1 + (v1 - v2) * (target - t1) / (t1 - t2)
//! ```
//!
//! Works on the integer domain only; dequantize after predicting. Results
//! saturate at the `i32` range rather than wrapping, so a runaway rate
//! pins to the edge instead of snapping to the opposite sign. The division
//! rounds to nearest.

use crate::tick::Tick;

/// One historical sample of a quantized field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sample {
    /// Tick the value was observed at.
    pub tick: Tick,
    /// Quantized value.
    pub value: i32,
}

impl Sample {
    /// Creates a sample.
    #[inline]
    #[must_use]
    pub const fn new(tick: Tick, value: i32) -> Self {
        Self { tick, value }
    }
}

/// Predicts the value of a field at `target`.
///
/// - Both samples present with distinct ticks: linear extrapolation.
/// - One usable sample: that sample's value (zero-order hold).
/// - None: `current`.
#[must_use]
pub fn predict_value(
    target: Tick,
    current: i32,
    first: Option<Sample>,
    second: Option<Sample>,
) -> i32 {
    match (first, second) {
        (Some(a), Some(b)) if a.tick != b.tick => extrapolate(target, a, b),
        (Some(a), _) => a.value,
        (None, Some(b)) => b.value,
        (None, None) => current,
    }
}

/// Predicts every field of a group in one go.
#[must_use]
pub fn predict_fields<const N: usize>(
    target: Tick,
    current: [i32; N],
    first: Option<(Tick, [i32; N])>,
    second: Option<(Tick, [i32; N])>,
) -> [i32; N] {
    let mut out = current;
    for (i, value) in out.iter_mut().enumerate() {
        *value = predict_value(
            target,
            current[i],
            first.map(|(tick, fields)| Sample::new(tick, fields[i])),
            second.map(|(tick, fields)| Sample::new(tick, fields[i])),
        );
    }
    out
}

fn extrapolate(target: Tick, first: Sample, second: Sample) -> i32 {
    let span = i128::from(first.tick.diff(second.tick));
    let ahead = i128::from(target.diff(first.tick));
    let rate_num = (i128::from(first.value) - i128::from(second.value)) * ahead;
    let predicted = i128::from(first.value) + div_round(rate_num, span);

    #[allow(clippy::cast_possible_truncation)]
    let clamped = predicted.clamp(i128::from(i32::MIN), i128::from(i32::MAX)) as i32;
    clamped
}

/// Integer division rounding half away from zero.
fn div_round(numerator: i128, denominator: i128) -> i128 {
    let (n, d) = if denominator < 0 {
        (-numerator, -denominator)
    } else {
        (numerator, denominator)
    };
    if n >= 0 {
        (n + d / 2) / d
    } else {
        -((-n + d / 2) / d)
    }
}
