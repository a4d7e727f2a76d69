//! Weighted statistics - inverse-variance means, MSWD and its acceptance envelope

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Confidence level of the reduced chi-square envelope used by [`validate_mswd`]
pub const DEFAULT_MSWD_CONFIDENCE: f64 = 0.95;

/// Glyph prefixed to an MSWD that falls outside its acceptance envelope
pub const INVALID_MSWD_CHR: char = '*';

/// How the error of a mean is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ErrorKind {
    /// SEM, but if MSWD > 1 use SEM × √MSWD
    #[default]
    #[serde(rename = "MSEM", alias = "msem", alias = "MSE")]
    Msem,
    /// Standard error of the weighted mean
    #[serde(rename = "SEM", alias = "sem", alias = "SE")]
    Sem,
    /// Standard deviation of the values about the mean
    #[serde(rename = "SD", alias = "sd")]
    Sd,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 3] = [ErrorKind::Msem, ErrorKind::Sem, ErrorKind::Sd];

    /// Long label as shown to operators
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Msem => "SEM, but if MSWD>1 use SEM * sqrt(MSWD)",
            ErrorKind::Sem => "SEM",
            ErrorKind::Sd => "SD",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Msem => write!(f, "MSEM"),
            ErrorKind::Sem => write!(f, "SEM"),
            ErrorKind::Sd => write!(f, "SD"),
        }
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MSEM" | "MSE" => Ok(ErrorKind::Msem),
            "SEM" | "SE" => Ok(ErrorKind::Sem),
            "SD" => Ok(ErrorKind::Sd),
            _ if s == ErrorKind::Msem.label() => Ok(ErrorKind::Msem),
            _ => Err(format!("unknown error kind '{}'", s)),
        }
    }
}

/// Weighted mean together with both of its error estimates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct WeightedStats {
    /// Inverse-variance weighted mean
    pub mean: f64,
    /// Standard error of the weighted mean, 1/√Σw
    pub sem: f64,
    /// Spread of the values about the weighted mean
    pub sd: f64,
    /// Number of values
    pub n: usize,
}

impl WeightedStats {
    /// Error reported for the given kind, before any MSWD inflation
    pub fn error(&self, kind: ErrorKind) -> f64 {
        match kind {
            ErrorKind::Sd => self.sd,
            ErrorKind::Sem | ErrorKind::Msem => self.sem,
        }
    }
}

/// Weighted mean plus SEM and SD in one pass. Empty input gives all zeros.
pub fn weighted_stats(values: &[f64], errors: &[f64]) -> WeightedStats {
    let n = values.len().min(errors.len());
    if n == 0 {
        return WeightedStats::default();
    }

    let (values, errors) = (&values[..n], &errors[..n]);
    let mut sum_w = 0.0;
    let mut sum_wv = 0.0;
    for (v, e) in values.iter().zip(errors) {
        let w = 1.0 / (e * e);
        sum_w += w;
        sum_wv += w * v;
    }

    let mean = sum_wv / sum_w;
    let sem = 1.0 / sum_w.sqrt();

    // n = 1 has no spread, so the point's own error stands in
    let sd = if n == 1 {
        errors[0]
    } else {
        let ss: f64 = values.iter().map(|v| (mean - v).powi(2)).sum();
        (ss / (n as f64 - 1.0)).sqrt()
    };

    WeightedStats { mean, sem, sd, n }
}

/// Inverse-variance weighted mean and its standard error. Empty input gives (0, 0).
pub fn weighted_mean(values: &[f64], errors: &[f64]) -> (f64, f64) {
    let s = weighted_stats(values, errors);
    (s.mean, s.sem)
}

/// Weighted mean with the error chosen by `kind` (no MSWD inflation applied)
pub fn weighted_mean_with(values: &[f64], errors: &[f64], kind: ErrorKind) -> (f64, f64) {
    let s = weighted_stats(values, errors);
    (s.mean, s.error(kind))
}

/// Arithmetic mean and sample standard deviation (ddof = 1, 0 when n < 2)
pub fn arithmetic_mean(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let sd = if n < 2 {
        0.0
    } else {
        let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n as f64 - 1.0)).sqrt()
    };
    (mean, sd)
}

/// Population standard deviation (ddof = 0)
pub fn population_sd(values: &[f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64).sqrt()
}

/// Mean square weighted deviation about `wm`, or about the weighted mean of the
/// values when `wm` is `None`. Defined for n ≥ 2, otherwise 0.
pub fn mswd(values: &[f64], errors: &[f64], wm: Option<f64>) -> f64 {
    let n = values.len().min(errors.len());
    if n < 2 {
        return 0.0;
    }
    let wm = wm.unwrap_or_else(|| weighted_mean(values, errors).0);
    let chi2: f64 = values
        .iter()
        .zip(errors)
        .map(|(v, e)| ((v - wm) / e).powi(2))
        .sum();
    chi2 / (n as f64 - 1.0)
}

/// Reduced chi-square interval `(low, high)` for `dof` degrees of freedom at `confidence`
pub fn mswd_limits(dof: usize, confidence: f64) -> Option<(f64, f64)> {
    if dof == 0 {
        return None;
    }
    let chi2 = ChiSquared::new(dof as f64).ok()?;
    let tail = (1.0 - confidence.clamp(0.0, 1.0)) / 2.0;
    let k = dof as f64;
    Some((chi2.inverse_cdf(tail) / k, chi2.inverse_cdf(1.0 - tail) / k))
}

/// Whether an MSWD is acceptable for `dof` degrees of freedom.
/// Zero degrees of freedom carry no evidence against the fit.
pub fn validate_mswd_dof(mswd: f64, dof: usize, confidence: f64) -> bool {
    if dof == 0 {
        return true;
    }
    if !mswd.is_finite() {
        return false;
    }
    match mswd_limits(dof, confidence) {
        Some((low, high)) => low <= mswd && mswd <= high,
        None => true,
    }
}

/// Whether the MSWD of `n` values lies inside the 95% reduced chi-square
/// envelope for `n - 1` degrees of freedom. n < 2 is always valid.
pub fn validate_mswd(mswd: f64, n: usize) -> bool {
    validate_mswd_at(mswd, n, DEFAULT_MSWD_CONFIDENCE)
}

/// [`validate_mswd`] at an explicit confidence level
pub fn validate_mswd_at(mswd: f64, n: usize, confidence: f64) -> bool {
    validate_mswd_dof(mswd, n.saturating_sub(1), confidence)
}

/// Inflate an error by √MSWD when the kind is MSEM and MSWD > 1
pub fn modify_error(error: f64, kind: ErrorKind, mswd: f64) -> f64 {
    if kind == ErrorKind::Msem && mswd > 1.0 {
        error * mswd.sqrt()
    } else {
        error
    }
}

/// Format an MSWD for display, prefixing [`INVALID_MSWD_CHR`] when invalid
pub fn format_mswd(mswd: f64, valid: bool, digits: usize) -> String {
    let tag = if valid {
        String::new()
    } else {
        INVALID_MSWD_CHR.to_string()
    };
    format!("{}{:.*}", tag, digits, mswd)
}
