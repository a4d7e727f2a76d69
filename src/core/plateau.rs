//! Plateau search over step-heating increments
//!
//! A plateau is a run of contiguous steps whose ages agree within
//! `overlap_sigma` and which together release at least `gas_fraction` percent
//! of the total gas. Excluded (omitted) steps are transparent: they neither
//! break a run nor count towards it.
//!
//! Among all acceptable windows the search prefers, in order:
//! 1. the most included steps
//! 2. the largest gas fraction
//! 3. the earliest start
//!
//! A window of a single step is never reported as a plateau.

use serde::{Deserialize, Serialize};

use crate::core::stats::{self, DEFAULT_MSWD_CONFIDENCE};

pub const FLECK_PLATEAU_DEFINITION: &str =
    "X contiguous Steps, Representing >Y% of the gas, Overlapping at 2 sigma";
pub const MAHON_PLATEAU_DEFINITION: &str =
    "X contiguous Steps, Representing >Y% of the gas, with all plateau steps yielding a valid MSWD";

/// Named plateau acceptance definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlateauDefinition {
    /// Fleck 1977: step count, gas fraction and pairwise overlap
    #[default]
    #[serde(alias = "Fleck 1977")]
    Fleck,
    /// Mahon 1996: Fleck plus a valid MSWD over the plateau steps
    #[serde(alias = "Mahon 1996")]
    Mahon,
}

impl PlateauDefinition {
    pub fn description(&self) -> &'static str {
        match self {
            PlateauDefinition::Fleck => FLECK_PLATEAU_DEFINITION,
            PlateauDefinition::Mahon => MAHON_PLATEAU_DEFINITION,
        }
    }
}

impl std::fmt::Display for PlateauDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlateauDefinition::Fleck => write!(f, "Fleck 1977"),
            PlateauDefinition::Mahon => write!(f, "Mahon 1996"),
        }
    }
}

/// Step letter for an index: A..Z, then AA, AB, ..., AZ, BA, ...
pub fn step_letter(idx: usize) -> String {
    if idx < 26 {
        char::from(b'A' + idx as u8).to_string()
    } else {
        let rest = idx - 26;
        let first = rest / 26;
        let second = rest % 26;
        if first >= 26 {
            return idx.to_string();
        }
        format!(
            "{}{}",
            char::from(b'A' + first as u8),
            char::from(b'A' + second as u8)
        )
    }
}

/// Index for a step letter, the inverse of [`step_letter`]
pub fn step_index(letter: &str) -> Option<usize> {
    let letter = letter.trim().to_ascii_uppercase();
    let bytes = letter.as_bytes();
    let value = |b: u8| b.is_ascii_uppercase().then(|| (b - b'A') as usize);
    match bytes {
        [a] => value(*a),
        [a, b] => Some(26 + value(*a)? * 26 + value(*b)?),
        _ => None,
    }
}

/// Per-step inputs to the search
#[derive(Debug, Clone, Copy)]
pub struct PlateauInput<'a> {
    pub ages: &'a [f64],
    pub errors: &'a [f64],
    /// Gas released by each step (e.g. 39ArK), any positive scale
    pub gas: &'a [f64],
    /// Indices of excluded steps
    pub excluded: &'a [usize],
}

/// Acceptance criteria for a search
#[derive(Debug, Clone, PartialEq)]
pub struct PlateauCriteria {
    pub definition: PlateauDefinition,
    /// Minimum number of included steps
    pub nsteps: usize,
    /// Minimum gas percentage of the total
    pub gas_fraction: f64,
    /// Overlap tolerance in sigma
    pub overlap_sigma: f64,
    /// Restrict the search to exactly this inclusive index range
    pub fixed_bounds: Option<(usize, usize)>,
    /// Confidence level for the Mahon MSWD check
    pub mswd_confidence: f64,
}

impl Default for PlateauCriteria {
    fn default() -> Self {
        Self {
            definition: PlateauDefinition::Fleck,
            nsteps: 3,
            gas_fraction: 50.0,
            overlap_sigma: 2.0,
            fixed_bounds: None,
            mswd_confidence: DEFAULT_MSWD_CONFIDENCE,
        }
    }
}

/// An accepted plateau window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateauWindow {
    /// First included step index
    pub start: usize,
    /// Last included step index
    pub end: usize,
    /// Included step indices (excluded steps inside the range are skipped)
    pub steps: Vec<usize>,
    /// Inverse-variance weighted age of the included steps
    pub age: f64,
    /// Standard error of the weighted age
    pub error: f64,
    /// Percentage of the total gas in the included steps
    pub gas_fraction: f64,
    pub mswd: f64,
    pub valid_mswd: bool,
}

impl PlateauWindow {
    pub fn nsteps(&self) -> usize {
        self.steps.len()
    }

    /// Human label such as "B-F"
    pub fn label(&self) -> String {
        format!("{}-{}", step_letter(self.start), step_letter(self.end))
    }
}

/// Running state of a candidate window
#[derive(Debug, Clone)]
struct Accumulator {
    max_low: f64,
    min_high: f64,
    gas: f64,
    ages: Vec<f64>,
    errors: Vec<f64>,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            max_low: f64::NEG_INFINITY,
            min_high: f64::INFINITY,
            gas: 0.0,
            ages: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn count(&self) -> usize {
        self.ages.len()
    }

    /// Add a step; false when it no longer overlaps every step already in the window
    fn push(&mut self, age: f64, error: f64, gas: f64, sigma: f64) -> bool {
        self.max_low = self.max_low.max(age - sigma * error);
        self.min_high = self.min_high.min(age + sigma * error);
        if self.max_low > self.min_high {
            return false;
        }
        self.gas += gas;
        self.ages.push(age);
        self.errors.push(error);
        true
    }

    /// Deviations are taken about the window's weighted mean, not from raw sums
    fn mswd(&self) -> f64 {
        stats::mswd(&self.ages, &self.errors, None)
    }
}

struct Candidate {
    start: usize,
    end: usize,
    count: usize,
    gas_pct: f64,
}

/// Find the preferred plateau, or `None` when no window satisfies the criteria
pub fn find_plateau(input: &PlateauInput<'_>, criteria: &PlateauCriteria) -> Option<PlateauWindow> {
    let n = input
        .ages
        .len()
        .min(input.errors.len())
        .min(input.gas.len());
    if n == 0 {
        return None;
    }

    let mut excluded = vec![false; n];
    for &i in input.excluded {
        if i < n {
            excluded[i] = true;
        }
    }

    let total_gas: f64 = input.gas[..n].iter().sum();
    let gas_pct = |gas: f64| {
        if total_gas > 0.0 {
            gas / total_gas * 100.0
        } else {
            0.0
        }
    };

    let best = match criteria.fixed_bounds {
        Some((low, high)) => fixed_window(input, criteria, &excluded, low, high, &gas_pct),
        None => search(input, criteria, &excluded, &gas_pct),
    }?;

    if best.count < 2 || best.start == best.end {
        tracing::debug!(start = best.start, "single-step window is not a plateau");
        return None;
    }

    let steps: Vec<usize> = (best.start..=best.end).filter(|&i| !excluded[i]).collect();
    let ages: Vec<f64> = steps.iter().map(|&i| input.ages[i]).collect();
    let errors: Vec<f64> = steps.iter().map(|&i| input.errors[i]).collect();
    let (age, error) = stats::weighted_mean(&ages, &errors);
    // A zero-error step leaves the weighted age undefined
    if !age.is_finite() || !error.is_finite() {
        tracing::debug!(start = best.start, end = best.end, "plateau age is not finite");
        return None;
    }
    let mswd = stats::mswd(&ages, &errors, Some(age));
    let valid_mswd = stats::validate_mswd_at(mswd, steps.len(), criteria.mswd_confidence);

    let window = PlateauWindow {
        start: best.start,
        end: best.end,
        steps,
        age,
        error,
        gas_fraction: best.gas_pct,
        mswd,
        valid_mswd,
    };
    tracing::debug!(
        label = %window.label(),
        nsteps = window.nsteps(),
        gas = window.gas_fraction,
        mswd = window.mswd,
        "plateau found"
    );
    Some(window)
}

fn search(
    input: &PlateauInput<'_>,
    criteria: &PlateauCriteria,
    excluded: &[bool],
    gas_pct: &dyn Fn(f64) -> f64,
) -> Option<Candidate> {
    let n = excluded.len();
    let mut best: Option<Candidate> = None;

    for start in (0..n).filter(|&i| !excluded[i]) {
        let mut acc = Accumulator::new();
        for end in (start..n).filter(|&i| !excluded[i]) {
            // Overlap only tightens as the window grows
            if !acc.push(
                input.ages[end],
                input.errors[end],
                input.gas[end],
                criteria.overlap_sigma,
            ) {
                break;
            }
            let pct = gas_pct(acc.gas);
            if acc.count() < criteria.nsteps || pct < criteria.gas_fraction {
                continue;
            }
            if criteria.definition == PlateauDefinition::Mahon
                && !stats::validate_mswd_at(acc.mswd(), acc.count(), criteria.mswd_confidence)
            {
                continue;
            }

            let better = match &best {
                None => true,
                Some(b) => acc.count() > b.count || (acc.count() == b.count && pct > b.gas_pct),
            };
            if better {
                best = Some(Candidate {
                    start,
                    end,
                    count: acc.count(),
                    gas_pct: pct,
                });
            }
        }
    }
    best
}

fn fixed_window(
    input: &PlateauInput<'_>,
    criteria: &PlateauCriteria,
    excluded: &[bool],
    low: usize,
    high: usize,
    gas_pct: &dyn Fn(f64) -> f64,
) -> Option<Candidate> {
    let n = excluded.len();
    let (low, high) = (low.min(high), high.max(low).min(n - 1));
    if low >= n {
        return None;
    }

    let steps: Vec<usize> = (low..=high).filter(|&i| !excluded[i]).collect();
    let mut acc = Accumulator::new();
    for &i in &steps {
        if !acc.push(
            input.ages[i],
            input.errors[i],
            input.gas[i],
            criteria.overlap_sigma,
        ) {
            tracing::debug!(low, high, "fixed steps do not overlap");
            return None;
        }
    }
    if criteria.definition == PlateauDefinition::Mahon
        && !stats::validate_mswd_at(acc.mswd(), acc.count(), criteria.mswd_confidence)
    {
        return None;
    }

    let (&start, &end) = (steps.first()?, steps.last()?);
    Some(Candidate {
        start,
        end,
        count: acc.count(),
        gas_pct: gas_pct(acc.gas),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria(nsteps: usize, gas: f64) -> PlateauCriteria {
        PlateauCriteria {
            nsteps,
            gas_fraction: gas,
            ..Default::default()
        }
    }

    fn run(ages: &[f64], errors: &[f64], gas: &[f64], excluded: &[usize], c: &PlateauCriteria) -> Option<PlateauWindow> {
        find_plateau(
            &PlateauInput {
                ages,
                errors,
                gas,
                excluded,
            },
            c,
        )
    }

    #[test]
    fn test_identical_ages_span_everything() {
        let ages = [10.0; 6];
        let errors = [0.1; 6];
        let gas = [100.0 / 6.0; 6];
        let p = run(&ages, &errors, &gas, &[], &criteria(3, 50.0)).unwrap();
        assert_eq!((p.start, p.end), (0, 5));
        assert_eq!(p.nsteps(), 6);
        assert!((p.gas_fraction - 100.0).abs() < 1e-9);
        assert_eq!(p.label(), "A-F");
    }

    #[test]
    fn test_two_step_scenario() {
        let p = run(&[10.0, 10.2], &[0.1, 0.1], &[50.0, 50.0], &[], &criteria(2, 50.0)).unwrap();
        assert_eq!((p.start, p.end), (0, 1));
        assert!((p.age - 10.1).abs() < 1e-9);
        assert!((p.error - 0.1 / 2.0_f64.sqrt()).abs() < 1e-9);
        assert!((p.mswd - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_outlier_step_is_excluded() {
        let ages = [10.0, 10.0, 10.0, 10.0, 15.0];
        let errors = [0.1; 5];
        let gas = [20.0; 5];
        let p = run(&ages, &errors, &gas, &[], &criteria(3, 50.0)).unwrap();
        assert_eq!((p.start, p.end), (0, 3));
    }

    #[test]
    fn test_outlier_leaves_too_few_steps() {
        let ages = [10.0, 10.0, 15.0, 10.0];
        let errors = [0.1; 4];
        let gas = [25.0; 4];
        assert!(run(&ages, &errors, &gas, &[], &criteria(3, 50.0)).is_none());
    }

    #[test]
    fn test_gas_fraction_required() {
        let ages = [10.0, 10.0, 10.0, 20.0];
        let errors = [0.1; 4];
        let gas = [10.0, 10.0, 10.0, 70.0];
        assert!(run(&ages, &errors, &gas, &[], &criteria(3, 50.0)).is_none());
        assert!(run(&ages, &errors, &gas, &[], &criteria(3, 30.0)).is_some());
    }

    #[test]
    fn test_excluded_steps_are_transparent() {
        let ages = [10.0, 30.0, 10.0, 10.0];
        let errors = [0.1; 4];
        let gas = [25.0; 4];
        let p = run(&ages, &errors, &gas, &[1], &criteria(3, 50.0)).unwrap();
        assert_eq!((p.start, p.end), (0, 3));
        assert_eq!(p.steps, vec![0, 2, 3]);
        assert!((p.gas_fraction - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_tie_break_prefers_more_gas() {
        // Two disjoint 3-step runs; the second carries more gas
        let ages = [10.0, 10.0, 10.0, 20.0, 20.0, 20.0];
        let errors = [0.1; 6];
        let gas = [10.0, 10.0, 10.0, 20.0, 25.0, 25.0];
        let p = run(&ages, &errors, &gas, &[], &criteria(3, 10.0)).unwrap();
        assert_eq!((p.start, p.end), (3, 5));
    }

    #[test]
    fn test_tie_break_prefers_earliest_on_equal_gas() {
        let ages = [10.0, 10.0, 10.0, 20.0, 20.0, 20.0];
        let errors = [0.1; 6];
        let gas = [1.0; 6];
        let p = run(&ages, &errors, &gas, &[], &criteria(3, 10.0)).unwrap();
        assert_eq!((p.start, p.end), (0, 2));
    }

    #[test]
    fn test_more_steps_beats_more_gas() {
        let ages = [10.0, 10.0, 10.0, 10.0, 20.0, 20.0, 20.0];
        let errors = [0.1; 7];
        let gas = [1.0, 1.0, 1.0, 1.0, 30.0, 30.0, 30.0];
        let p = run(&ages, &errors, &gas, &[], &criteria(3, 1.0)).unwrap();
        assert_eq!((p.start, p.end), (0, 3));
    }

    #[test]
    fn test_single_step_is_not_a_plateau() {
        let ages = [10.0, 20.0, 30.0];
        let errors = [0.1; 3];
        let gas = [80.0, 10.0, 10.0];
        assert!(run(&ages, &errors, &gas, &[], &criteria(1, 50.0)).is_none());
    }

    #[test]
    fn test_mahon_rejects_invalid_mswd() {
        // Overlapping at 2σ but with a large scatter for 4 steps
        let ages = [10.0, 10.35, 10.0, 10.35];
        let errors = [0.1; 4];
        let gas = [25.0; 4];
        let fleck = run(&ages, &errors, &gas, &[], &criteria(4, 50.0)).unwrap();
        assert!(!fleck.valid_mswd);

        let mahon = PlateauCriteria {
            definition: PlateauDefinition::Mahon,
            ..criteria(4, 50.0)
        };
        assert!(run(&ages, &errors, &gas, &[], &mahon).is_none());
    }

    #[test]
    fn test_fixed_bounds_restrict_search() {
        let ages = [10.0; 6];
        let errors = [0.1; 6];
        let gas = [1.0; 6];
        let c = PlateauCriteria {
            fixed_bounds: Some((1, 3)),
            ..criteria(3, 50.0)
        };
        // Fixed bounds are not held to the step count or gas criteria
        let p = run(&ages, &errors, &gas, &[], &c).unwrap();
        assert_eq!((p.start, p.end), (1, 3));
        assert_eq!(p.label(), "B-D");
    }

    #[test]
    fn test_fixed_bounds_still_checked_for_overlap() {
        let ages = [10.0, 10.0, 12.0, 10.0];
        let errors = [0.1; 4];
        let gas = [1.0; 4];
        let c = PlateauCriteria {
            fixed_bounds: Some((0, 3)),
            ..criteria(2, 0.0)
        };
        assert!(run(&ages, &errors, &gas, &[], &c).is_none());
    }

    #[test]
    fn test_zero_error_step_yields_no_plateau() {
        let ages = [10.0, 10.0, 10.0];
        let errors = [0.1, 0.0, 0.1];
        let gas = [1.0; 3];
        assert!(run(&ages, &errors, &gas, &[], &criteria(3, 50.0)).is_none());
    }

    #[test]
    fn test_mswd_stable_for_old_precise_ages() {
        // Raw-sum χ² cancels catastrophically at this magnitude
        let ages = [4_500_000_000.0, 4_500_000_000.15, 4_499_999_999.85, 4_500_000_000.1];
        let errors = [0.1; 4];
        let gas = [25.0; 4];
        let mahon = PlateauCriteria {
            definition: PlateauDefinition::Mahon,
            ..criteria(4, 50.0)
        };
        let p = run(&ages, &errors, &gas, &[], &mahon).unwrap();

        let expected = stats::mswd(&ages, &errors, None);
        assert!((p.mswd - expected).abs() < 1e-3);
        assert!((expected - 1.75).abs() < 1e-3);

        let mut acc = Accumulator::new();
        for (&a, &e) in ages.iter().zip(&errors) {
            assert!(acc.push(a, e, 1.0, 2.0));
        }
        assert!((acc.mswd() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input() {
        assert!(run(&[], &[], &[], &[], &criteria(3, 50.0)).is_none());
    }

    #[test]
    fn test_step_letters() {
        assert_eq!(step_letter(0), "A");
        assert_eq!(step_letter(25), "Z");
        assert_eq!(step_letter(26), "AA");
        assert_eq!(step_letter(27), "AB");
        assert_eq!(step_letter(52), "BA");
        for i in 0..200 {
            assert_eq!(step_index(&step_letter(i)), Some(i));
        }
        assert_eq!(step_index("c"), Some(2));
        assert_eq!(step_index(""), None);
        assert_eq!(step_index("A1"), None);
    }

    #[test]
    fn test_definition_serde() {
        let d: PlateauDefinition = serde_yml::from_str("Mahon 1996").unwrap();
        assert_eq!(d, PlateauDefinition::Mahon);
        let d: PlateauDefinition = serde_yml::from_str("fleck").unwrap();
        assert_eq!(d, PlateauDefinition::Fleck);
        assert_eq!(PlateauDefinition::Fleck.to_string(), "Fleck 1977");
    }
}
