//! Inverse isochron regression
//!
//! Fits 36Ar/40Ar (y) against 39Ar/40Ar (x) with the York et al. (2004)
//! bivariate regression, which weights both axes and accounts for the error
//! correlation introduced by the shared 40Ar denominator.
//!
//! - x-intercept = (39Ar/40Ar*) → R = 1/x-intercept → age
//! - y-intercept = (36Ar/40Ar)trapped → 1/y-intercept = trapped 40Ar/36Ar

use nalgebra::Matrix2;
use serde::Serialize;

use crate::core::age::age_equation;
use crate::core::analysis::{Analysis, Isotope};
use crate::core::config::ArArConstants;
use crate::core::stats::{self, ErrorKind};
use crate::core::uvalue::UValue;

const MAX_ITERATIONS: usize = 200;
const TOLERANCE: f64 = 1e-15;

/// One point on the correlation diagram
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IsochronPoint {
    pub x: f64,
    pub sx: f64,
    pub y: f64,
    pub sy: f64,
    /// Correlation coefficient of the x and y errors
    pub rho: f64,
}

impl IsochronPoint {
    /// Inverse-isochron coordinates from 40Ar, 39Ar and 36Ar intensities
    pub fn from_intensities(ar40: UValue, ar39: UValue, ar36: UValue) -> Option<Self> {
        if ar40.nominal == 0.0 || ar39.nominal == 0.0 || ar36.nominal == 0.0 {
            return None;
        }
        let r40 = ar40.relative_error().powi(2);
        let r39 = ar39.relative_error().powi(2);
        let r36 = ar36.relative_error().powi(2);

        let x = ar39.nominal / ar40.nominal;
        let y = ar36.nominal / ar40.nominal;
        let rel_x = r39 + r40;
        let rel_y = r36 + r40;
        let rho = if rel_x > 0.0 && rel_y > 0.0 {
            r40 / (rel_x * rel_y).sqrt()
        } else {
            0.0
        };

        Some(Self {
            x,
            sx: x.abs() * rel_x.sqrt(),
            y,
            sy: y.abs() * rel_y.sqrt(),
            rho,
        })
    }

    /// Point for an analysis, `None` when an intensity is missing
    pub fn from_analysis(analysis: &dyn Analysis) -> Option<Self> {
        Self::from_intensities(
            analysis.isotope(Isotope::Ar40)?,
            analysis.isotope(Isotope::Ar39)?,
            analysis.isotope(Isotope::Ar36)?,
        )
    }
}

/// Straight-line fit with errors in both coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IsochronRegressor {
    pub slope: f64,
    pub slope_err: f64,
    pub intercept: f64,
    pub intercept_err: f64,
    /// Covariance of (intercept, slope)
    pub covariance: Matrix2<f64>,
    pub mswd: f64,
    pub valid_mswd: bool,
    pub n: usize,
    /// Number of iterations to converge
    pub iterations: usize,
}

impl IsochronRegressor {
    /// x at y = 0 with its propagated error
    pub fn x_intercept(&self) -> UValue {
        if self.slope == 0.0 {
            return UValue::zero();
        }
        let a = self.intercept;
        let b = self.slope;
        let xint = -a / b;
        let cov_ab = self.covariance[(0, 1)];
        let mut rel2 = (self.slope_err / b).powi(2);
        if a != 0.0 {
            rel2 += (self.intercept_err / a).powi(2) - 2.0 * cov_ab / (a * b);
        }
        UValue::new(xint, xint.abs() * rel2.max(0.0).sqrt())
    }

    /// y at x = 0
    pub fn y_intercept(&self) -> UValue {
        UValue::new(self.intercept, self.intercept_err)
    }

    /// Fitted y at `x`
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Regression outcome consumed by groups
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IsochronResult {
    /// Age from the x-intercept, error already MSWD-modified
    pub age: UValue,
    /// Trapped 40Ar/36Ar from the y-intercept
    pub trapped_4036: UValue,
    pub regressor: IsochronRegressor,
}

/// York (2004) regression. Needs at least two points with non-zero errors.
pub fn york_fit(points: &[IsochronPoint], confidence: f64) -> Option<IsochronRegressor> {
    let n = points.len();
    if n < 2 || points.iter().any(|p| !(p.sx > 0.0 && p.sy > 0.0)) {
        return None;
    }

    let wx: Vec<f64> = points.iter().map(|p| 1.0 / (p.sx * p.sx)).collect();
    let wy: Vec<f64> = points.iter().map(|p| 1.0 / (p.sy * p.sy)).collect();

    // Ordinary least squares for a starting slope
    let nf = n as f64;
    let mx = points.iter().map(|p| p.x).sum::<f64>() / nf;
    let my = points.iter().map(|p| p.y).sum::<f64>() / nf;
    let sxx: f64 = points.iter().map(|p| (p.x - mx).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = points.iter().map(|p| (p.x - mx) * (p.y - my)).sum();
    let mut b = sxy / sxx;

    let mut state = YorkState::compute(points, &wx, &wy, b);
    let mut iterations = 0;
    while iterations < MAX_ITERATIONS {
        iterations += 1;
        let next = state.next_slope(points);
        if !next.is_finite() {
            return None;
        }
        let converged = (next - b).abs() <= TOLERANCE * next.abs().max(f64::MIN_POSITIVE);
        b = next;
        state = YorkState::compute(points, &wx, &wy, b);
        if converged {
            break;
        }
    }
    tracing::trace!(iterations, slope = b, "york regression converged");

    let a = state.y_bar - b * state.x_bar;

    // Adjusted x values and their weighted mean
    let x_adj: Vec<f64> = state.beta.iter().map(|beta| state.x_bar + beta).collect();
    let x_adj_bar = x_adj
        .iter()
        .zip(&state.w)
        .map(|(x, w)| w * x)
        .sum::<f64>()
        / state.sum_w;
    let sum_wu2: f64 = x_adj
        .iter()
        .zip(&state.w)
        .map(|(x, w)| w * (x - x_adj_bar).powi(2))
        .sum();
    if sum_wu2 <= 0.0 {
        return None;
    }

    let var_b = 1.0 / sum_wu2;
    let var_a = 1.0 / state.sum_w + x_adj_bar * x_adj_bar * var_b;
    let cov_ab = -x_adj_bar * var_b;

    let mswd = if n > 2 {
        let chi2: f64 = points
            .iter()
            .zip(&state.w)
            .map(|(p, w)| w * (p.y - b * p.x - a).powi(2))
            .sum();
        chi2 / (nf - 2.0)
    } else {
        0.0
    };

    Some(IsochronRegressor {
        slope: b,
        slope_err: var_b.sqrt(),
        intercept: a,
        intercept_err: var_a.sqrt(),
        covariance: Matrix2::new(var_a, cov_ab, cov_ab, var_b),
        mswd,
        valid_mswd: stats::validate_mswd_dof(mswd, n - 2, confidence),
        n,
        iterations,
    })
}

/// Per-iteration York quantities for a trial slope
struct YorkState {
    w: Vec<f64>,
    sum_w: f64,
    x_bar: f64,
    y_bar: f64,
    beta: Vec<f64>,
}

impl YorkState {
    fn compute(points: &[IsochronPoint], wx: &[f64], wy: &[f64], b: f64) -> Self {
        let w: Vec<f64> = points
            .iter()
            .zip(wx.iter().zip(wy))
            .map(|(p, (&wxi, &wyi))| {
                let alpha = (wxi * wyi).sqrt();
                wxi * wyi / (wxi + b * b * wyi - 2.0 * b * p.rho * alpha)
            })
            .collect();
        let sum_w: f64 = w.iter().sum();
        let x_bar = points.iter().zip(&w).map(|(p, w)| w * p.x).sum::<f64>() / sum_w;
        let y_bar = points.iter().zip(&w).map(|(p, w)| w * p.y).sum::<f64>() / sum_w;

        let beta = points
            .iter()
            .zip(&w)
            .zip(wx.iter().zip(wy))
            .map(|((p, wi), (&wxi, &wyi))| {
                let u = p.x - x_bar;
                let v = p.y - y_bar;
                let alpha = (wxi * wyi).sqrt();
                wi * (u / wyi + b * v / wxi - (b * u + v) * p.rho / alpha)
            })
            .collect();

        Self {
            w,
            sum_w,
            x_bar,
            y_bar,
            beta,
        }
    }

    fn next_slope(&self, points: &[IsochronPoint]) -> f64 {
        let mut num = 0.0;
        let mut den = 0.0;
        for ((p, w), beta) in points.iter().zip(&self.w).zip(&self.beta) {
            let u = p.x - self.x_bar;
            let v = p.y - self.y_bar;
            num += w * beta * v;
            den += w * beta * u;
        }
        num / den
    }
}

/// Regress the non-excluded analyses and derive the isochron age.
///
/// Nested groups and analyses without the needed intensities are skipped.
/// The J of the first analysis defines the age. The age error is passed
/// through the MSEM rule using the regression's own MSWD.
pub fn regress_isochron(
    analyses: &[&dyn Analysis],
    error_kind: ErrorKind,
    excluded: &[usize],
    constants: &ArArConstants,
    confidence: f64,
) -> Option<IsochronResult> {
    let reference = analyses.iter().find(|a| a.as_group().is_none())?;
    let points: Vec<IsochronPoint> = analyses
        .iter()
        .enumerate()
        .filter(|(i, a)| !excluded.contains(i) && a.as_group().is_none())
        .filter_map(|(_, a)| IsochronPoint::from_analysis(*a))
        .collect();

    let regressor = york_fit(&points, confidence)?;

    let age = match regressor.x_intercept().recip() {
        Some(r) if r.nominal > 0.0 => age_equation(r, reference.j(), constants)
            .map(|age| {
                let err = stats::modify_error(age.std_dev, error_kind, regressor.mswd);
                UValue::new(age.nominal, err).sanitize()
            })
            .unwrap_or_default(),
        _ => UValue::zero(),
    };
    let trapped_4036 = regressor.y_intercept().recip().unwrap_or_default();

    Some(IsochronResult {
        age,
        trapped_4036,
        regressor,
    })
}
