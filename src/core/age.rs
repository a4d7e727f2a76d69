//! The 40Ar/39Ar age equation
//!
//! t = ln(1 + J·R) / λ, with R = 40Ar*/39ArK

use crate::core::config::ArArConstants;
use crate::core::uvalue::UValue;

/// Age for a radiogenic ratio `r` and irradiation parameter `j`, in the
/// configured age units.
///
/// Errors in `r` and `j` are propagated to first order as independent
/// contributions. The decay-constant error is added only when
/// `include_decay_error` is set. Returns `None` when `1 + J·R ≤ 0`.
pub fn age_equation(r: UValue, j: UValue, constants: &ArArConstants) -> Option<UValue> {
    let lambda = constants.lambda_k.nominal;
    if lambda <= 0.0 {
        return None;
    }

    let arg = 1.0 + j.nominal * r.nominal;
    if arg <= 0.0 || !arg.is_finite() {
        return None;
    }

    let age = arg.ln() / lambda;

    let d_r = j.nominal / (lambda * arg);
    let d_j = r.nominal / (lambda * arg);
    let mut variance = (d_r * r.std_dev).powi(2) + (d_j * j.std_dev).powi(2);
    if constants.include_decay_error {
        let d_lambda = -age / lambda;
        variance += (d_lambda * constants.lambda_k.std_dev).powi(2);
    }

    let scale = constants.age_units.years();
    Some(UValue::new(age / scale, variance.sqrt() / scale).sanitize())
}

/// Radiogenic ratio R that yields `age` (in the configured units) for irradiation parameter `j`
pub fn ratio_for_age(age: f64, j: f64, constants: &ArArConstants) -> f64 {
    let years = age * constants.age_units.years();
    ((constants.lambda_k.nominal * years).exp() - 1.0) / j
}
