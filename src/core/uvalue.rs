//! Uncertain values - (nominal, standard deviation) pairs
//!
//! Arithmetic uses first-order propagation and treats operands as
//! independent:
//! - a ± b: σ = √(σa² + σb²)
//! - a × b, a / b: σ = |result| × √((σa/a)² + (σb/b)²)
//! - f(x): σ = |f'(x)| × σx

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A nominal value with a one-sigma uncertainty
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UValue {
    /// Nominal (central) value
    pub nominal: f64,

    /// One-sigma standard deviation
    #[serde(default)]
    pub std_dev: f64,
}

impl UValue {
    /// Create a new uncertain value. Negative errors are folded to their magnitude.
    pub fn new(nominal: f64, std_dev: f64) -> Self {
        Self {
            nominal,
            std_dev: std_dev.abs(),
        }
    }

    /// An exact value (zero uncertainty)
    pub fn exact(nominal: f64) -> Self {
        Self::new(nominal, 0.0)
    }

    /// 0 ± 0, the degenerate result of every reduction
    pub fn zero() -> Self {
        Self::default()
    }

    /// True when both the nominal value and the error are zero
    pub fn is_zero(&self) -> bool {
        self.nominal == 0.0 && self.std_dev == 0.0
    }

    /// Fractional error σ/|x|, 0 when the nominal value is 0
    pub fn relative_error(&self) -> f64 {
        if self.nominal == 0.0 {
            0.0
        } else {
            self.std_dev / self.nominal.abs()
        }
    }

    /// Replace a non-finite error with 0 and a non-finite nominal value with 0 ± 0
    pub fn sanitize(self) -> Self {
        if !self.nominal.is_finite() {
            return Self::zero();
        }
        let std_dev = if self.std_dev.is_finite() {
            self.std_dev.max(0.0)
        } else {
            0.0
        };
        Self {
            nominal: self.nominal,
            std_dev,
        }
    }

    /// Combine this value's relative error in quadrature with an additional
    /// fractional uncertainty, keeping the nominal value.
    pub fn combine_quadrature(self, fractional: f64) -> Self {
        if self.nominal == 0.0 {
            return self;
        }
        let rel = self.relative_error().hypot(fractional);
        Self::new(self.nominal, rel * self.nominal.abs())
    }

    /// Evaluate `f(x)` and propagate the error through its derivative `df(x)`
    pub fn map(self, f: impl Fn(f64) -> f64, df: impl Fn(f64) -> f64) -> Self {
        Self::new(f(self.nominal), df(self.nominal).abs() * self.std_dev)
    }

    /// Divide, returning `None` when the divisor's nominal value is zero
    pub fn checked_div(self, rhs: UValue) -> Option<UValue> {
        if rhs.nominal == 0.0 {
            None
        } else {
            Some(self / rhs)
        }
    }

    /// Reciprocal, `None` for a zero nominal value
    pub fn recip(self) -> Option<UValue> {
        UValue::exact(1.0).checked_div(self)
    }
}

impl From<f64> for UValue {
    fn from(v: f64) -> Self {
        Self::exact(v)
    }
}

impl From<(f64, f64)> for UValue {
    fn from((v, e): (f64, f64)) -> Self {
        Self::new(v, e)
    }
}

impl fmt::Display for UValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match f.precision() {
            Some(p) => write!(f, "{:.*} ± {:.*}", p, self.nominal, p, self.std_dev),
            None => write!(f, "{} ± {}", self.nominal, self.std_dev),
        }
    }
}

impl Add for UValue {
    type Output = UValue;

    fn add(self, rhs: UValue) -> UValue {
        UValue::new(self.nominal + rhs.nominal, self.std_dev.hypot(rhs.std_dev))
    }
}

impl Sub for UValue {
    type Output = UValue;

    fn sub(self, rhs: UValue) -> UValue {
        UValue::new(self.nominal - rhs.nominal, self.std_dev.hypot(rhs.std_dev))
    }
}

impl Neg for UValue {
    type Output = UValue;

    fn neg(self) -> UValue {
        UValue::new(-self.nominal, self.std_dev)
    }
}

impl Mul for UValue {
    type Output = UValue;

    fn mul(self, rhs: UValue) -> UValue {
        // Written in absolute terms so a zero operand does not poison the error
        let std_dev = (rhs.nominal * self.std_dev).hypot(self.nominal * rhs.std_dev);
        UValue::new(self.nominal * rhs.nominal, std_dev)
    }
}

impl Mul<f64> for UValue {
    type Output = UValue;

    fn mul(self, rhs: f64) -> UValue {
        UValue::new(self.nominal * rhs, self.std_dev * rhs)
    }
}

impl Div for UValue {
    type Output = UValue;

    /// Division by a zero nominal value yields non-finite parts; callers that
    /// can see a zero divisor use [`UValue::checked_div`].
    fn div(self, rhs: UValue) -> UValue {
        let q = self.nominal / rhs.nominal;
        let std_dev = (self.std_dev / rhs.nominal).hypot(q * rhs.std_dev / rhs.nominal);
        UValue::new(q, std_dev)
    }
}

impl Div<f64> for UValue {
    type Output = UValue;

    fn div(self, rhs: f64) -> UValue {
        UValue::new(self.nominal / rhs, self.std_dev / rhs)
    }
}

impl Sum for UValue {
    fn sum<I: Iterator<Item = UValue>>(iter: I) -> UValue {
        iter.fold(UValue::zero(), |acc, v| acc + v)
    }
}

impl<'a> Sum<&'a UValue> for UValue {
    fn sum<I: Iterator<Item = &'a UValue>>(iter: I) -> UValue {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_addition_adds_errors_in_quadrature() {
        let r = UValue::new(1.0, 0.3) + UValue::new(2.0, 0.4);
        assert!(close(r.nominal, 3.0));
        assert!(close(r.std_dev, 0.5));

        let d = UValue::new(1.0, 0.3) - UValue::new(2.0, 0.4);
        assert!(close(d.nominal, -1.0));
        assert!(close(d.std_dev, 0.5));
    }

    #[test]
    fn test_multiplication_relative_errors() {
        // 10 ± 1 (10%) × 2 ± 0.2 (10%) = 20 ± 20·√0.02
        let r = UValue::new(10.0, 1.0) * UValue::new(2.0, 0.2);
        assert!(close(r.nominal, 20.0));
        assert!(close(r.std_dev, 20.0 * 0.02_f64.sqrt()));
    }

    #[test]
    fn test_multiplication_by_zero_keeps_error_finite() {
        let r = UValue::new(0.0, 0.1) * UValue::new(3.0, 0.0);
        assert!(close(r.nominal, 0.0));
        assert!(close(r.std_dev, 0.3));
    }

    #[test]
    fn test_division() {
        let r = UValue::new(10.0, 1.0) / UValue::new(2.0, 0.2);
        assert!(close(r.nominal, 5.0));
        assert!(close(r.std_dev, 5.0 * 0.02_f64.sqrt()));
    }

    #[test]
    fn test_checked_div_by_zero() {
        assert!(UValue::new(1.0, 0.1).checked_div(UValue::zero()).is_none());
        assert!(UValue::zero().recip().is_none());
        let r = UValue::new(4.0, 0.4).recip().unwrap();
        assert!(close(r.nominal, 0.25));
        assert!(close(r.std_dev, 0.025));
    }

    #[test]
    fn test_map_uses_derivative() {
        // ln(x) at 2 ± 0.1 → σ = 0.1 / 2
        let r = UValue::new(2.0, 0.1).map(f64::ln, |x| 1.0 / x);
        assert!(close(r.nominal, 2.0_f64.ln()));
        assert!(close(r.std_dev, 0.05));
    }

    #[test]
    fn test_combine_quadrature() {
        // 3% and 4% combine to 5%
        let r = UValue::new(100.0, 3.0).combine_quadrature(0.04);
        assert!(close(r.nominal, 100.0));
        assert!(close(r.std_dev, 5.0));

        assert_eq!(UValue::zero().combine_quadrature(0.5), UValue::zero());
    }

    #[test]
    fn test_sanitize_clamps_nan_error() {
        let v = UValue {
            nominal: 1.0,
            std_dev: f64::NAN,
        }
        .sanitize();
        assert_eq!(v, UValue::exact(1.0));

        let v = UValue {
            nominal: f64::INFINITY,
            std_dev: 1.0,
        }
        .sanitize();
        assert!(v.is_zero());
    }

    #[test]
    fn test_sum() {
        let vs = [UValue::new(1.0, 0.3), UValue::new(1.0, 0.4)];
        let s: UValue = vs.iter().sum();
        assert!(close(s.nominal, 2.0));
        assert!(close(s.std_dev, 0.5));

        let empty: UValue = Vec::<UValue>::new().into_iter().sum();
        assert!(empty.is_zero());
    }

    #[test]
    fn test_display_with_precision() {
        assert_eq!(format!("{:.2}", UValue::new(10.123, 0.0456)), "10.12 ± 0.05");
    }

    #[test]
    fn test_yaml_roundtrip_defaults_error() {
        let v: UValue = serde_yml::from_str("nominal: 3.5").unwrap();
        assert_eq!(v, UValue::exact(3.5));
    }
}
