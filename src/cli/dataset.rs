//! Dataset files - analyses plus the group settings applied to them
//!
//! ```yaml
//! name: 66000-01
//! kind: interpreted
//! preferred:
//!   age: { kind: Plateau else Weighted Mean, error_kind: SEM }
//! analyses:
//!   - runid: 66000-01A
//!     aliquot: "01"
//!     step: A
//!     age: { nominal: 28.2, std_dev: 0.05 }
//!     j: { nominal: 0.0123, std_dev: 0.00001 }
//!     signals:
//!       k39: { nominal: 12.5 }
//! ```
//!
//! `groups` nests further datasets; each is reduced on its own and enters the
//! parent as a single member.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::rc::Rc;

use crate::core::analysis::{Analysis, AnalysisRecord, Attribute};
use crate::core::config::{AgeUnits, PlateauConfig, ReductionConfig};
use crate::core::stats::ErrorKind;
use crate::entities::group::{AnalysisGroup, GroupVariant};
use crate::entities::preferred::SubgroupingSpec;
use crate::entities::step_heat::FixedSteps;
use crate::yaml::{parse_yaml, parse_yaml_file, YamlError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub kind: GroupVariant,

    #[serde(default)]
    pub analyses: Vec<AnalysisRecord>,

    /// Nested datasets, each becoming one member of this group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Dataset>,

    /// Error kind of the weighted age
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    /// Plateau criteria replacing the configured ones for this dataset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plateau: Option<PlateauConfig>,

    #[serde(default, skip_serializing_if = "FixedSteps::is_empty")]
    pub fixed_steps: FixedSteps,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred: Option<SubgroupingSpec>,

    /// Display units for this dataset's ages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_units: Option<AgeUnits>,
}

impl Dataset {
    pub fn from_yaml(content: &str, filename: &str) -> Result<Self, YamlError> {
        parse_yaml(content, filename)
    }

    pub fn load(path: &Path) -> Result<Self, YamlError> {
        let dataset: Dataset = parse_yaml_file(path)?;
        tracing::debug!(
            path = %path.display(),
            analyses = dataset.analyses.len(),
            groups = dataset.groups.len(),
            "loaded dataset"
        );
        Ok(dataset)
    }

    /// Build the group described by this dataset. Records are cloned into
    /// shared handles so callers can toggle their omission tags afterwards.
    pub fn build(&self, config: &ReductionConfig) -> AnalysisGroup {
        let mut config = config.clone();
        if let Some(plateau) = &self.plateau {
            config.plateau = plateau.clone();
        }

        let mut members: Vec<Rc<dyn Analysis>> = self
            .analyses
            .iter()
            .map(|a| Rc::new(a.clone()) as Rc<dyn Analysis>)
            .collect();
        for sub in &self.groups {
            members.push(Rc::new(sub.build(&config)));
        }

        let mut group = AnalysisGroup::with_variant(self.kind, members, config).with_name(&self.name);
        if !self.fixed_steps.is_empty() {
            group.set_fixed_steps(self.fixed_steps.clone());
        }
        if let Some(spec) = &self.preferred {
            group.set_preferred_kinds(Some(spec));
        }
        if let Some(kind) = self.error_kind {
            group.set_error_kind(Attribute::Age, kind);
        }
        if self.age_units.is_some() {
            group.set_temporary_age_units(self.age_units);
        }
        group
    }
}
