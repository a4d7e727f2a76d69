//! Step-heat component - plateau criteria carried by step-heating groups

use serde::{Deserialize, Serialize};

use crate::core::config::PlateauConfig;
use crate::core::plateau::{step_index, PlateauCriteria};

/// Operator-fixed plateau bounds, as step letters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedSteps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<String>,
}

impl FixedSteps {
    pub fn new(low: impl Into<String>, high: impl Into<String>) -> Self {
        Self {
            low: Some(low.into()),
            high: Some(high.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.low.is_none() && self.high.is_none()
    }

    /// Inclusive index range over `nsteps` steps. A missing bound extends to
    /// that end of the spectrum; unparsable or inverted bounds are ignored.
    pub fn bounds(&self, nsteps: usize) -> Option<(usize, usize)> {
        if self.is_empty() || nsteps == 0 {
            return None;
        }
        let parse = |letter: &Option<String>, default: usize| match letter {
            Some(l) => step_index(l),
            None => Some(default),
        };
        let (low, high) = match (parse(&self.low, 0), parse(&self.high, nsteps - 1)) {
            (Some(low), Some(high)) => (low, high.min(nsteps - 1)),
            _ => {
                tracing::warn!(low = ?self.low, high = ?self.high, "ignoring unparsable fixed steps");
                return None;
            }
        };
        if low > high {
            tracing::warn!(low, high, "ignoring inverted fixed steps");
            return None;
        }
        Some((low, high))
    }
}

/// Plateau settings owned by a step-heat or interpreted group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepHeat {
    pub plateau: PlateauConfig,

    #[serde(default, skip_serializing_if = "FixedSteps::is_empty")]
    pub fixed_steps: FixedSteps,

    /// Fold J's fractional error into the plateau age
    #[serde(default = "default_true")]
    pub include_j_error_in_plateau: bool,
}

fn default_true() -> bool {
    true
}

impl StepHeat {
    pub fn new(plateau: PlateauConfig) -> Self {
        Self {
            plateau,
            fixed_steps: FixedSteps::default(),
            include_j_error_in_plateau: true,
        }
    }

    /// Search criteria for a spectrum of `nsteps` steps
    pub fn criteria(&self, nsteps: usize, mswd_confidence: f64) -> PlateauCriteria {
        PlateauCriteria {
            definition: self.plateau.definition,
            nsteps: self.plateau.nsteps,
            gas_fraction: self.plateau.gas_fraction,
            overlap_sigma: self.plateau.overlap_sigma,
            fixed_bounds: self.fixed_steps.bounds(nsteps),
            mswd_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_step_bounds() {
        assert_eq!(FixedSteps::default().bounds(5), None);
        assert_eq!(FixedSteps::new("B", "D").bounds(5), Some((1, 3)));
        assert_eq!(FixedSteps::new("b", "Z").bounds(5), Some((1, 4)));

        let open_high = FixedSteps {
            low: Some("C".to_string()),
            high: None,
        };
        assert_eq!(open_high.bounds(6), Some((2, 5)));

        assert_eq!(FixedSteps::new("D", "B").bounds(5), None);
        assert_eq!(FixedSteps::new("?", "B").bounds(5), None);
    }

    #[test]
    fn test_criteria_from_config() {
        let mut sh = StepHeat::new(PlateauConfig::default());
        sh.fixed_steps = FixedSteps::new("A", "C");
        let c = sh.criteria(4, 0.9);
        assert_eq!(c.nsteps, 3);
        assert_eq!(c.fixed_bounds, Some((0, 2)));
        assert_eq!(c.mswd_confidence, 0.9);
        assert!(sh.include_j_error_in_plateau);
    }
}
