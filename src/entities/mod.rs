//! Group entities - analysis groups and the components they carry

pub mod group;
pub mod preferred;
pub mod step_heat;

pub use group::{
    AnalysisGroup, AttrStats, ErrorKinds, GroupAges, GroupError, GroupVariant, IntegratedSubset,
};
pub use preferred::{
    PreferredKind, PreferredSelection, PreferredValue, PreferredValues, ResolvedValue,
    SubgroupingSpec,
};
pub use step_heat::{FixedSteps, StepHeat};
