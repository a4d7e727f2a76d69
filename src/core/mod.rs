//! Core module - uncertain values, statistics and the reduction primitives

pub mod age;
pub mod analysis;
pub mod config;
pub mod isochron;
pub mod plateau;
pub mod stats;
pub mod uvalue;

pub use age::age_equation;
pub use analysis::{Analysis, AnalysisRecord, Attribute, Computed, Isotope, OmitReason};
pub use config::{AgeUnits, ArArConstants, ConfigError, PlateauConfig, ReductionConfig};
pub use isochron::{york_fit, IsochronPoint, IsochronRegressor, IsochronResult};
pub use plateau::{find_plateau, PlateauCriteria, PlateauDefinition, PlateauWindow};
pub use stats::ErrorKind;
pub use uvalue::UValue;
