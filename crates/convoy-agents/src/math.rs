//! Small numeric helpers shared by the decision modules.

/// Clamp a value into `[0, 1]`.
pub(crate) fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// A collection size as a float divisor.
pub(crate) fn count_f64(n: usize) -> f64 {
    f64::from(u32::try_from(n).unwrap_or(u32::MAX))
}

/// Map a signed difference in `[-span, span]` onto `[0, 1]` around 0.5.
///
/// A zero span means there is nothing to compare, which is neutral.
pub(crate) fn relative_to_half(difference: f64, span: f64) -> f64 {
    if span <= 0.0 {
        0.5
    } else {
        clamp01(0.5 + difference / (2.0 * span))
    }
}
