//! Reduction configuration - decay constants, plateau definition, MSWD policy
//!
//! Everything here arrives pre-resolved from the operator's configuration and
//! is injected into each group at construction. Nothing is read from global state.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::plateau::PlateauDefinition;
use crate::core::stats::DEFAULT_MSWD_CONFIDENCE;
use crate::core::uvalue::UValue;
use crate::yaml::{parse_yaml, parse_yaml_file, YamlError};

/// Errors raised while loading or validating a configuration
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Yaml(#[from] YamlError),

    #[error("invalid configuration: {0}")]
    #[diagnostic(code(arar::config::invalid))]
    Invalid(String),
}

/// Unit in which ages are expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AgeUnits {
    #[serde(rename = "a")]
    Years,
    #[serde(rename = "ka")]
    Ka,
    #[default]
    #[serde(rename = "Ma")]
    Ma,
    #[serde(rename = "Ga")]
    Ga,
}

impl AgeUnits {
    /// Years per unit
    pub fn years(&self) -> f64 {
        match self {
            AgeUnits::Years => 1.0,
            AgeUnits::Ka => 1e3,
            AgeUnits::Ma => 1e6,
            AgeUnits::Ga => 1e9,
        }
    }

    /// Millions of years per unit
    pub fn ma_scalar(&self) -> f64 {
        self.years() / 1e6
    }

    /// Factor converting a value in `self` into `other`
    pub fn scale_to(&self, other: AgeUnits) -> f64 {
        self.years() / other.years()
    }
}

impl std::fmt::Display for AgeUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgeUnits::Years => write!(f, "a"),
            AgeUnits::Ka => write!(f, "ka"),
            AgeUnits::Ma => write!(f, "Ma"),
            AgeUnits::Ga => write!(f, "Ga"),
        }
    }
}

impl std::str::FromStr for AgeUnits {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a" => Ok(AgeUnits::Years),
            "ka" => Ok(AgeUnits::Ka),
            "Ma" => Ok(AgeUnits::Ma),
            "Ga" => Ok(AgeUnits::Ga),
            _ => Err(format!("unknown age units '{}' (expected a, ka, Ma or Ga)", s)),
        }
    }
}

/// Decay constants and age scaling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArArConstants {
    /// Total 40K decay constant (1/a)
    pub lambda_k: UValue,

    /// Units in which ages are reported
    pub age_units: AgeUnits,

    /// Propagate the decay-constant error into computed ages
    pub include_decay_error: bool,
}

impl Default for ArArConstants {
    fn default() -> Self {
        Self {
            // Steiger & Jäger 1977
            lambda_k: UValue::new(5.543e-10, 0.010e-10),
            age_units: AgeUnits::Ma,
            include_decay_error: false,
        }
    }
}

/// Plateau acceptance criteria shared by all step-heat groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateauConfig {
    /// Acceptance definition
    pub definition: PlateauDefinition,

    /// Minimum number of contiguous steps
    pub nsteps: usize,

    /// Minimum percentage of the total gas the steps must represent
    pub gas_fraction: f64,

    /// Overlap tolerance, in sigma
    pub overlap_sigma: f64,
}

impl Default for PlateauConfig {
    fn default() -> Self {
        Self {
            definition: PlateauDefinition::Fleck,
            nsteps: 3,
            gas_fraction: 50.0,
            overlap_sigma: 2.0,
        }
    }
}

/// Top-level reduction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    /// Decay constants and units
    pub constants: ArArConstants,

    /// Plateau criteria
    pub plateau: PlateauConfig,

    /// Confidence level of the MSWD acceptance envelope
    pub mswd_confidence: f64,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ReductionConfig {
    /// Configuration with the standard constants and Fleck 1977 plateau criteria
    pub fn with_defaults() -> Self {
        Self {
            constants: ArArConstants::default(),
            plateau: PlateauConfig::default(),
            mswd_confidence: DEFAULT_MSWD_CONFIDENCE,
        }
    }

    /// Parse and validate a YAML configuration document
    pub fn from_yaml(content: &str, filename: &str) -> Result<Self, ConfigError> {
        let config: ReductionConfig = parse_yaml(content, filename)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: ReductionConfig = parse_yaml_file(path)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded reduction configuration");
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.constants.lambda_k.nominal > 0.0) {
            return Err(ConfigError::Invalid(
                "constants.lambda_k must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.mswd_confidence) || self.mswd_confidence == 0.0 {
            return Err(ConfigError::Invalid(format!(
                "mswd_confidence must be in (0, 1), got {}",
                self.mswd_confidence
            )));
        }
        if !(0.0..=100.0).contains(&self.plateau.gas_fraction) {
            return Err(ConfigError::Invalid(format!(
                "plateau.gas_fraction must be a percentage, got {}",
                self.plateau.gas_fraction
            )));
        }
        if !(self.plateau.overlap_sigma > 0.0) {
            return Err(ConfigError::Invalid(
                "plateau.overlap_sigma must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
