//! Analysis trait - the contract every reducible measurement satisfies
//!
//! Groups only read analyses. The one sanctioned mutation is the omission
//! tag, which is interior-mutable so a tag change on a shared analysis is seen
//! by every group holding it (via [`Analysis::revision`]).

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::BTreeMap;

use crate::core::uvalue::UValue;
use crate::entities::group::AnalysisGroup;

/// Production ratios keyed by name (e.g. "Ca_K", "Cl_K")
pub type ProductionRatios = BTreeMap<String, UValue>;

/// Argon isotopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Isotope {
    Ar40,
    Ar39,
    Ar38,
    Ar37,
    Ar36,
}

impl std::fmt::Display for Isotope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Isotope::Ar40 => write!(f, "Ar40"),
            Isotope::Ar39 => write!(f, "Ar39"),
            Isotope::Ar38 => write!(f, "Ar38"),
            Isotope::Ar37 => write!(f, "Ar37"),
            Isotope::Ar36 => write!(f, "Ar36"),
        }
    }
}

/// Attributes a group can aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Age,
    /// Age with the J fractional error folded in
    AgeWithJError,
    Kca,
    Kcl,
    Rad40Percent,
    MolesK39,
    SignalK39,
    /// Interference-corrected isotope intensity
    Intensity(Isotope),
}

impl Attribute {
    /// Attributes tracked by preferred values, in display order
    pub const PREFERRED: [Attribute; 6] = [
        Attribute::Age,
        Attribute::Kca,
        Attribute::Kcl,
        Attribute::Rad40Percent,
        Attribute::MolesK39,
        Attribute::SignalK39,
    ];

    pub fn is_age(&self) -> bool {
        matches!(self, Attribute::Age | Attribute::AgeWithJError)
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Attribute::Age => write!(f, "age"),
            Attribute::AgeWithJError => write!(f, "age_w_j_err"),
            Attribute::Kca => write!(f, "kca"),
            Attribute::Kcl => write!(f, "kcl"),
            Attribute::Rad40Percent => write!(f, "rad40_percent"),
            Attribute::MolesK39 => write!(f, "moles_k39"),
            Attribute::SignalK39 => write!(f, "signal_k39"),
            Attribute::Intensity(iso) => write!(f, "{}", iso),
        }
    }
}

impl std::str::FromStr for Attribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "age" | "uage" => Ok(Attribute::Age),
            "age_w_j_err" | "uage_w_j_err" => Ok(Attribute::AgeWithJError),
            "kca" => Ok(Attribute::Kca),
            "kcl" => Ok(Attribute::Kcl),
            "rad40_percent" | "radiogenic_yield" => Ok(Attribute::Rad40Percent),
            "moles_k39" => Ok(Attribute::MolesK39),
            "signal_k39" | "k39" => Ok(Attribute::SignalK39),
            "ar40" => Ok(Attribute::Intensity(Isotope::Ar40)),
            "ar39" => Ok(Attribute::Intensity(Isotope::Ar39)),
            "ar38" => Ok(Attribute::Intensity(Isotope::Ar38)),
            "ar37" => Ok(Attribute::Intensity(Isotope::Ar37)),
            "ar36" => Ok(Attribute::Intensity(Isotope::Ar36)),
            _ => Err(format!("unknown attribute '{}'", s)),
        }
    }
}

/// Derived signals used by integrated calculations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Computed {
    /// Radiogenic 40Ar
    Rad40,
    /// Potassium-derived 39Ar
    K39,
    /// Total 40Ar
    Total40,
    /// Calcium-derived 37Ar
    Ca37,
    /// Chlorine-derived 38Ar
    Cl38,
}

/// Why an analysis is left out of the clean subset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OmitReason {
    Omit,
    Invalid,
    Outlier,
    Skip,
}

impl std::fmt::Display for OmitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OmitReason::Omit => write!(f, "omit"),
            OmitReason::Invalid => write!(f, "invalid"),
            OmitReason::Outlier => write!(f, "outlier"),
            OmitReason::Skip => write!(f, "skip"),
        }
    }
}

/// A measurement (or a nested group) a group can reduce
pub trait Analysis {
    /// Uncertain value for an attribute, `None` when the analysis has none
    fn value(&self, attr: Attribute) -> Option<UValue>;

    /// Reason this analysis is excluded, if it is
    fn omission(&self) -> Option<OmitReason>;

    fn is_omitted(&self) -> bool {
        self.omission().is_some()
    }

    /// Physical aliquot identifier
    fn aliquot(&self) -> String;

    /// Heating-step identifier within the aliquot
    fn step(&self) -> Option<String> {
        None
    }

    /// Irradiation parameter
    fn j(&self) -> UValue;

    fn production_ratios(&self) -> Option<&ProductionRatios> {
        None
    }

    /// Derived signal; 0 ± 0 when unavailable
    fn computed(&self, key: Computed) -> UValue;

    /// Interference-corrected intensity
    fn isotope(&self, _isotope: Isotope) -> Option<UValue> {
        None
    }

    /// Counter bumped on every inclusion-flag change
    fn revision(&self) -> u64 {
        0
    }

    /// The group behind this analysis when it is a nested group
    fn as_group(&self) -> Option<&AnalysisGroup> {
        None
    }

    /// True for nested interpreted-age groups
    fn is_interpreted_group(&self) -> bool {
        self.as_group().is_some_and(|g| g.is_interpreted())
    }
}

/// Interference-corrected isotope intensities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Isotopes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ar40: Option<UValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ar39: Option<UValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ar38: Option<UValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ar37: Option<UValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ar36: Option<UValue>,
}

impl Isotopes {
    pub fn get(&self, isotope: Isotope) -> Option<UValue> {
        match isotope {
            Isotope::Ar40 => self.ar40,
            Isotope::Ar39 => self.ar39,
            Isotope::Ar38 => self.ar38,
            Isotope::Ar37 => self.ar37,
            Isotope::Ar36 => self.ar36,
        }
    }
}

/// Derived signals carried by a record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rad40: Option<UValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k39: Option<UValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total40: Option<UValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca37: Option<UValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cl38: Option<UValue>,
}

/// A single reduced measurement, as supplied by an upstream collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Run identifier (e.g. "12345-01A")
    pub runid: String,

    /// Aliquot identifier
    #[serde(default)]
    pub aliquot: String,

    /// Heating step identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,

    /// Age in the configured units
    pub age: UValue,

    /// Irradiation parameter
    pub j: UValue,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kca: Option<UValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kcl: Option<UValue>,

    /// Radiogenic yield; derived from the signals when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rad40_percent: Option<UValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moles_k39: Option<UValue>,

    #[serde(default)]
    pub signals: Signals,

    #[serde(default)]
    pub isotopes: Isotopes,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub production_ratios: ProductionRatios,

    /// Omission tag
    #[serde(default, rename = "tag", skip_serializing_if = "is_untagged")]
    omission: Cell<Option<OmitReason>>,

    #[serde(skip)]
    revision: Cell<u64>,
}

fn is_untagged(tag: &Cell<Option<OmitReason>>) -> bool {
    tag.get().is_none()
}

impl AnalysisRecord {
    /// A record with an age and J; everything else empty
    pub fn new(runid: impl Into<String>, age: UValue, j: UValue) -> Self {
        Self {
            runid: runid.into(),
            age,
            j,
            ..Default::default()
        }
    }

    pub fn with_aliquot(mut self, aliquot: impl Into<String>) -> Self {
        self.aliquot = aliquot.into();
        self
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn with_k39(mut self, k39: UValue) -> Self {
        self.signals.k39 = Some(k39);
        self
    }

    pub fn with_omission(self, reason: Option<OmitReason>) -> Self {
        self.omission.set(reason);
        self
    }

    /// Tag or untag the record. Every change bumps the revision so that
    /// groups sharing the record recompute on their next read.
    pub fn set_omission(&self, reason: Option<OmitReason>) {
        if self.omission.get() != reason {
            self.omission.set(reason);
            self.revision.set(self.revision.get() + 1);
        }
    }
}

impl Analysis for AnalysisRecord {
    fn value(&self, attr: Attribute) -> Option<UValue> {
        match attr {
            Attribute::Age => Some(self.age),
            Attribute::AgeWithJError => Some(self.age.combine_quadrature(self.j.relative_error())),
            Attribute::Kca => self.kca,
            Attribute::Kcl => self.kcl,
            Attribute::Rad40Percent => self.rad40_percent.or_else(|| {
                let (rad40, total40) = (self.signals.rad40?, self.signals.total40?);
                rad40.checked_div(total40).map(|r| r * 100.0)
            }),
            Attribute::MolesK39 => self.moles_k39,
            Attribute::SignalK39 => self.signals.k39,
            Attribute::Intensity(iso) => self.isotopes.get(iso),
        }
    }

    fn omission(&self) -> Option<OmitReason> {
        self.omission.get()
    }

    fn aliquot(&self) -> String {
        self.aliquot.clone()
    }

    fn step(&self) -> Option<String> {
        self.step.clone()
    }

    fn j(&self) -> UValue {
        self.j
    }

    fn production_ratios(&self) -> Option<&ProductionRatios> {
        Some(&self.production_ratios)
    }

    fn computed(&self, key: Computed) -> UValue {
        let v = match key {
            Computed::Rad40 => self.signals.rad40,
            Computed::K39 => self.signals.k39,
            Computed::Total40 => self.signals.total40,
            Computed::Ca37 => self.signals.ca37,
            Computed::Cl38 => self.signals.cl38,
        };
        v.unwrap_or_default()
    }

    fn isotope(&self, isotope: Isotope) -> Option<UValue> {
        self.isotopes.get(isotope)
    }

    fn revision(&self) -> u64 {
        self.revision.get()
    }
}
