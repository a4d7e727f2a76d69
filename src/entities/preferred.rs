//! Preferred values - which statistic defines each reported attribute
//!
//! An interpreted-age group keeps one [`PreferredValue`] per tracked
//! attribute. The selection (kind and error kind) lives here; the resolved
//! number is computed and cached by the owning group.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::analysis::Attribute;
use crate::core::stats::ErrorKind;
use crate::core::uvalue::UValue;

/// Method used to resolve a preferred value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PreferredKind {
    #[serde(rename = "Weighted Mean", alias = "weighted_mean")]
    WeightedMean,
    #[serde(rename = "Arithmetic Mean", alias = "arithmetic_mean")]
    ArithmeticMean,
    #[serde(rename = "Plateau", alias = "plateau")]
    Plateau,
    #[serde(rename = "Isochron", alias = "isochron")]
    Isochron,
    #[serde(rename = "Isochron of Plateau Steps", alias = "isochron_of_plateau_steps")]
    IsochronOfPlateauSteps,
    #[serde(rename = "Total Integrated", alias = "total_integrated")]
    TotalIntegrated,
    #[serde(rename = "Valid Integrated", alias = "valid_integrated")]
    ValidIntegrated,
    #[serde(rename = "Plateau Integrated", alias = "plateau_integrated")]
    PlateauIntegrated,
    #[serde(rename = "Plateau else Weighted Mean", alias = "plateau_else_weighted_mean")]
    PlateauElseWeightedMean,
    #[serde(
        rename = "Plateau else Valid Integrated",
        alias = "plateau_else_valid_integrated"
    )]
    PlateauElseValidIntegrated,
}

/// Kinds selectable for the age
pub const AGE_KINDS: [PreferredKind; 10] = [
    PreferredKind::PlateauElseWeightedMean,
    PreferredKind::WeightedMean,
    PreferredKind::TotalIntegrated,
    PreferredKind::ValidIntegrated,
    PreferredKind::PlateauIntegrated,
    PreferredKind::PlateauElseValidIntegrated,
    PreferredKind::ArithmeticMean,
    PreferredKind::Plateau,
    PreferredKind::Isochron,
    PreferredKind::IsochronOfPlateauSteps,
];

/// Kinds selectable for every other attribute
pub const SUBGROUPING_KINDS: [PreferredKind; 6] = [
    PreferredKind::WeightedMean,
    PreferredKind::TotalIntegrated,
    PreferredKind::ValidIntegrated,
    PreferredKind::PlateauIntegrated,
    PreferredKind::PlateauElseValidIntegrated,
    PreferredKind::ArithmeticMean,
];

/// Kinds left for non-age attributes once the group holds nested groups
pub const NESTED_KINDS: [PreferredKind; 2] =
    [PreferredKind::WeightedMean, PreferredKind::ArithmeticMean];

impl PreferredKind {
    pub fn label(&self) -> &'static str {
        match self {
            PreferredKind::WeightedMean => "Weighted Mean",
            PreferredKind::ArithmeticMean => "Arithmetic Mean",
            PreferredKind::Plateau => "Plateau",
            PreferredKind::Isochron => "Isochron",
            PreferredKind::IsochronOfPlateauSteps => "Isochron of Plateau Steps",
            PreferredKind::TotalIntegrated => "Total Integrated",
            PreferredKind::ValidIntegrated => "Valid Integrated",
            PreferredKind::PlateauIntegrated => "Plateau Integrated",
            PreferredKind::PlateauElseWeightedMean => "Plateau else Weighted Mean",
            PreferredKind::PlateauElseValidIntegrated => "Plateau else Valid Integrated",
        }
    }

    /// True for every kind whose result depends on the plateau window
    pub fn uses_plateau(&self) -> bool {
        matches!(
            self,
            PreferredKind::Plateau
                | PreferredKind::IsochronOfPlateauSteps
                | PreferredKind::PlateauIntegrated
                | PreferredKind::PlateauElseWeightedMean
                | PreferredKind::PlateauElseValidIntegrated
        )
    }

    pub fn is_isochron(&self) -> bool {
        matches!(
            self,
            PreferredKind::Isochron | PreferredKind::IsochronOfPlateauSteps
        )
    }
}

impl std::fmt::Display for PreferredKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for PreferredKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match key.as_str() {
            "weighted_mean" | "wt._mean" | "wm" => Ok(PreferredKind::WeightedMean),
            "arithmetic_mean" => Ok(PreferredKind::ArithmeticMean),
            "plateau" => Ok(PreferredKind::Plateau),
            "isochron" => Ok(PreferredKind::Isochron),
            "isochron_of_plateau_steps" => Ok(PreferredKind::IsochronOfPlateauSteps),
            "total_integrated" => Ok(PreferredKind::TotalIntegrated),
            "valid_integrated" => Ok(PreferredKind::ValidIntegrated),
            "plateau_integrated" => Ok(PreferredKind::PlateauIntegrated),
            "plateau_else_weighted_mean" => Ok(PreferredKind::PlateauElseWeightedMean),
            "plateau_else_valid_integrated" => Ok(PreferredKind::PlateauElseValidIntegrated),
            _ => Err(format!("unknown preferred kind '{}'", s)),
        }
    }
}

/// The operator's selection for one attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferredValue {
    pub attr: Attribute,
    pub kind: PreferredKind,
    pub error_kind: ErrorKind,
    /// Kinds this attribute may be resolved with
    pub kinds: Vec<PreferredKind>,
}

impl PreferredValue {
    pub fn new(attr: Attribute) -> Self {
        let kinds = if attr.is_age() {
            AGE_KINDS.to_vec()
        } else {
            SUBGROUPING_KINDS.to_vec()
        };
        Self {
            attr,
            kind: PreferredKind::WeightedMean,
            error_kind: ErrorKind::Msem,
            kinds,
        }
    }

    pub fn allows(&self, kind: PreferredKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// A resolved preferred value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Resolution {
    pub value: UValue,
    /// The method that actually produced `value`; differs from the selected
    /// kind for the "else" fallbacks
    pub computed_kind: PreferredKind,
}

/// Selection plus resolution, as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedValue {
    pub attr: Attribute,
    pub kind: PreferredKind,
    pub error_kind: ErrorKind,
    pub value: f64,
    pub error: f64,
    pub computed_kind: PreferredKind,
}

impl ResolvedValue {
    pub fn uvalue(&self) -> UValue {
        UValue::new(self.value, self.error)
    }
}

/// Per-attribute preferred values of an interpreted-age group
#[derive(Debug, Clone, PartialEq)]
pub struct PreferredValues {
    values: Vec<PreferredValue>,
}

impl Default for PreferredValues {
    fn default() -> Self {
        Self {
            values: Attribute::PREFERRED
                .iter()
                .map(|&attr| PreferredValue::new(attr))
                .collect(),
        }
    }
}

impl PreferredValues {
    pub fn get(&self, attr: Attribute) -> Option<&PreferredValue> {
        self.values.iter().find(|pv| pv.attr == attr)
    }

    pub fn get_mut(&mut self, attr: Attribute) -> Option<&mut PreferredValue> {
        self.values.iter_mut().find(|pv| pv.attr == attr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PreferredValue> {
        self.values.iter()
    }

    /// Restrict or restore the non-age kind lists depending on whether the
    /// group contains nested interpreted-age groups.
    pub fn apply_subgrouping(&mut self, has_subgroups: bool) {
        for pv in self.values.iter_mut().filter(|pv| !pv.attr.is_age()) {
            if has_subgroups {
                pv.kind = nested_default(pv.attr);
                pv.kinds = NESTED_KINDS.to_vec();
            } else {
                pv.kinds = SUBGROUPING_KINDS.to_vec();
            }
        }
    }
}

/// Default kind for a non-age attribute one level up
pub fn nested_default(attr: Attribute) -> PreferredKind {
    match attr {
        Attribute::Kca | Attribute::Kcl | Attribute::MolesK39 | Attribute::SignalK39 => {
            PreferredKind::ArithmeticMean
        }
        _ => PreferredKind::WeightedMean,
    }
}

/// Partial kind/error-kind selection for one attribute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferredSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PreferredKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// Per-attribute overrides applied by `set_preferred_kinds`
///
/// ```yaml
/// age: { kind: Plateau, error_kind: SEM }
/// kca: { kind: Arithmetic Mean }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubgroupingSpec {
    pub entries: BTreeMap<Attribute, PreferredSelection>,
}

impl SubgroupingSpec {
    pub fn with(mut self, attr: Attribute, kind: PreferredKind, error_kind: ErrorKind) -> Self {
        self.entries.insert(
            attr,
            PreferredSelection {
                kind: Some(kind),
                error_kind: Some(error_kind),
            },
        );
        self
    }

    pub fn kind(&self, attr: Attribute) -> Option<PreferredKind> {
        self.entries.get(&attr).and_then(|s| s.kind)
    }

    pub fn error_kind(&self, attr: Attribute) -> Option<ErrorKind> {
        self.entries.get(&attr).and_then(|s| s.error_kind)
    }
}
