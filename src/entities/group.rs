//! Analysis group - cached reductions over an ordered set of analyses
//!
//! A group reads its analyses and never mutates them. Every derived
//! statistic is memoized in a [`GroupCache`] tagged with a stamp made of the
//! group's generation counter and the sum of its members' revisions. Any
//! setter bumps the generation; any omission toggle on a member bumps its
//! revision. Either way the whole cache is dropped before the next read.
//!
//! Step-heat and interpreted-age behaviour are optional components selected
//! by [`GroupVariant`]. Groups implement [`Analysis`], so an interpreted group
//! can itself be a member of another group.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use thiserror::Error;

use crate::core::age::age_equation;
use crate::core::analysis::{Analysis, Attribute, Computed, Isotope, OmitReason, ProductionRatios};
use crate::core::config::{AgeUnits, PlateauConfig, ReductionConfig};
use crate::core::isochron::{regress_isochron, IsochronResult};
use crate::core::plateau::{find_plateau, PlateauInput, PlateauWindow};
use crate::core::stats::{self, ErrorKind};
use crate::core::uvalue::UValue;
use crate::entities::preferred::{
    nested_default, PreferredKind, PreferredValues, Resolution, ResolvedValue, SubgroupingSpec,
};
use crate::entities::step_heat::{FixedSteps, StepHeat};

/// Errors from group configuration calls
#[derive(Debug, Error, Diagnostic)]
pub enum GroupError {
    #[error("'{kind}' is not a selectable kind for {attr}")]
    #[diagnostic(
        code(arar::group::unsupported_kind),
        help("groups holding interpreted subgroups only allow Weighted Mean and Arithmetic Mean for non-age values")
    )]
    UnsupportedKind {
        attr: Attribute,
        kind: PreferredKind,
    },

    #[error("{0} has no preferred value")]
    #[diagnostic(code(arar::group::untracked_attribute))]
    UntrackedAttribute(Attribute),

    #[error("group has no preferred values (not an interpreted-age group)")]
    #[diagnostic(code(arar::group::not_interpreted))]
    NotInterpreted,
}

/// Capabilities a group carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupVariant {
    /// Means, MSWD and isochron only
    #[default]
    Simple,
    /// Adds plateau and integrated ages
    StepHeat,
    /// Step heat plus preferred values
    Interpreted,
}

impl std::fmt::Display for GroupVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupVariant::Simple => write!(f, "simple"),
            GroupVariant::StepHeat => write!(f, "step_heat"),
            GroupVariant::Interpreted => write!(f, "interpreted"),
        }
    }
}

/// Which analyses an integrated calculation sums over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegratedSubset {
    /// Every analysis, omitted or not
    Total,
    /// Non-omitted analyses
    Valid,
    /// Analyses inside the plateau window
    Plateau,
}

/// Error kind per reported quantity
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorKinds {
    pub age: ErrorKind,
    pub kca: ErrorKind,
    pub kcl: ErrorKind,
    pub rad40_percent: ErrorKind,
    pub moles_k39: ErrorKind,
    pub signal_k39: ErrorKind,
    pub plateau: ErrorKind,
    pub isochron: ErrorKind,
}

impl Default for ErrorKinds {
    fn default() -> Self {
        Self {
            age: ErrorKind::Msem,
            kca: ErrorKind::Msem,
            kcl: ErrorKind::Msem,
            rad40_percent: ErrorKind::Msem,
            moles_k39: ErrorKind::Msem,
            signal_k39: ErrorKind::Msem,
            plateau: ErrorKind::Sem,
            isochron: ErrorKind::Sem,
        }
    }
}

impl ErrorKinds {
    /// Error kind used for an attribute's mean; intensities report SD
    pub fn get(&self, attr: Attribute) -> ErrorKind {
        match attr {
            Attribute::Age | Attribute::AgeWithJError => self.age,
            Attribute::Kca => self.kca,
            Attribute::Kcl => self.kcl,
            Attribute::Rad40Percent => self.rad40_percent,
            Attribute::MolesK39 => self.moles_k39,
            Attribute::SignalK39 => self.signal_k39,
            Attribute::Intensity(_) => ErrorKind::Sd,
        }
    }

    pub fn set(&mut self, attr: Attribute, kind: ErrorKind) {
        let slot = match attr {
            Attribute::Age | Attribute::AgeWithJError => &mut self.age,
            Attribute::Kca => &mut self.kca,
            Attribute::Kcl => &mut self.kcl,
            Attribute::Rad40Percent => &mut self.rad40_percent,
            Attribute::MolesK39 => &mut self.moles_k39,
            Attribute::SignalK39 => &mut self.signal_k39,
            Attribute::Intensity(_) => return,
        };
        *slot = kind;
    }
}

/// One-call summary of an attribute over the clean analyses
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttrStats {
    pub mean: f64,
    pub sd: f64,
    pub sem: f64,
    pub mswd: f64,
    pub valid_mswd: bool,
    pub min: f64,
    pub max: f64,
    /// Spread as a percentage of the maximum, (max - min) / max × 100
    pub total_dev: f64,
}

/// The four age variants of a group
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroupAges {
    pub weighted_age: UValue,
    pub plateau_age: UValue,
    pub isochron_age: UValue,
    pub integrated_age: UValue,
}

impl GroupAges {
    /// Flat `name → value` map with `<name>_err` entries for the errors
    pub fn as_floats(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for (name, v) in [
            ("weighted_age", self.weighted_age),
            ("plateau_age", self.plateau_age),
            ("isochron_age", self.isochron_age),
            ("integrated_age", self.integrated_age),
        ] {
            out.insert(name.to_string(), v.nominal);
            out.insert(format!("{}_err", name), v.std_dev);
        }
        out
    }
}

/// Memoized results, valid only for the stamp they were computed at
#[derive(Debug, Default)]
struct GroupCache {
    stamp: Option<(u64, u64)>,
    nanalyses: Option<usize>,
    mswd: Option<f64>,
    weighted_age: Option<UValue>,
    arith_age: Option<UValue>,
    isochron: Option<Option<IsochronResult>>,
    plateau: Option<Option<PlateauWindow>>,
    plateau_age: Option<UValue>,
    integrated_age: Option<UValue>,
    preferred: BTreeMap<Attribute, Resolution>,
}

/// An ordered set of analyses and everything reduced from them
pub struct AnalysisGroup {
    name: String,
    variant: GroupVariant,
    analyses: Vec<Rc<dyn Analysis>>,
    config: ReductionConfig,

    /// Attribute reduced by `weighted_age` and `mswd`
    attribute: Attribute,
    error_kinds: ErrorKinds,
    include_j_error_in_mean: bool,
    include_j_error_in_individual_analyses: bool,

    /// Display units overriding the configured ones
    display_units: Option<AgeUnits>,

    step_heat: Option<StepHeat>,
    preferred: Option<PreferredValues>,

    generation: Cell<u64>,
    cache: RefCell<GroupCache>,
}

impl std::fmt::Debug for AnalysisGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisGroup")
            .field("name", &self.name)
            .field("variant", &self.variant)
            .field("total_n", &self.analyses.len())
            .field("attribute", &self.attribute)
            .field("generation", &self.generation.get())
            .finish()
    }
}

impl AnalysisGroup {
    /// A plain group
    pub fn new(analyses: Vec<Rc<dyn Analysis>>, config: ReductionConfig) -> Self {
        Self::with_variant(GroupVariant::Simple, analyses, config)
    }

    /// A step-heating group with plateau and integrated ages
    pub fn step_heat(analyses: Vec<Rc<dyn Analysis>>, config: ReductionConfig) -> Self {
        Self::with_variant(GroupVariant::StepHeat, analyses, config)
    }

    /// An interpreted-age group with default preferred kinds
    pub fn interpreted(analyses: Vec<Rc<dyn Analysis>>, config: ReductionConfig) -> Self {
        Self::with_variant(GroupVariant::Interpreted, analyses, config)
    }

    pub fn with_variant(
        variant: GroupVariant,
        analyses: Vec<Rc<dyn Analysis>>,
        config: ReductionConfig,
    ) -> Self {
        let step_heat = (variant != GroupVariant::Simple).then(|| StepHeat::new(config.plateau.clone()));
        let preferred = (variant == GroupVariant::Interpreted).then(PreferredValues::default);

        let mut group = Self {
            name: String::new(),
            variant,
            analyses,
            config,
            attribute: Attribute::Age,
            error_kinds: ErrorKinds::default(),
            include_j_error_in_mean: true,
            include_j_error_in_individual_analyses: false,
            display_units: None,
            step_heat,
            preferred,
            generation: Cell::new(0),
            cache: RefCell::new(GroupCache::default()),
        };
        if group.preferred.is_some() {
            group.refresh_subgrouping();
            group.set_preferred_kinds(None);
        }
        group
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant(&self) -> GroupVariant {
        self.variant
    }

    pub fn is_interpreted(&self) -> bool {
        self.variant == GroupVariant::Interpreted
    }

    pub fn analyses(&self) -> &[Rc<dyn Analysis>] {
        &self.analyses
    }

    pub fn config(&self) -> &ReductionConfig {
        &self.config
    }

    pub fn attribute(&self) -> Attribute {
        self.attribute
    }

    pub fn error_kinds(&self) -> &ErrorKinds {
        &self.error_kinds
    }

    pub fn include_j_error_in_mean(&self) -> bool {
        self.include_j_error_in_mean
    }

    pub fn include_j_error_in_individual_analyses(&self) -> bool {
        self.include_j_error_in_individual_analyses
    }

    pub fn step_heat_settings(&self) -> Option<&StepHeat> {
        self.step_heat.as_ref()
    }

    pub fn preferred_settings(&self) -> Option<&PreferredValues> {
        self.preferred.as_ref()
    }

    // ========================================================================
    // Mutation (each call invalidates every cached value)
    // ========================================================================

    /// Signal that inputs changed outside the group's knowledge
    pub fn mark_dirty(&self) {
        self.generation.set(self.generation.get().wrapping_add(1));
    }

    pub fn set_analyses(&mut self, analyses: Vec<Rc<dyn Analysis>>) {
        self.analyses = analyses;
        self.refresh_subgrouping();
        self.mark_dirty();
    }

    pub fn set_attribute(&mut self, attr: Attribute) {
        self.attribute = attr;
        self.mark_dirty();
    }

    /// Change the error kind of `attr`. On interpreted groups the attribute's
    /// preferred value keeps its kind and takes the new error kind.
    pub fn set_error_kind(&mut self, attr: Attribute, kind: ErrorKind) {
        let preferred = self
            .preferred
            .as_ref()
            .and_then(|p| p.get(attr))
            .map(|pv| pv.kind);
        match preferred {
            Some(current) => self.select_preferred(attr, current, kind),
            None => {
                self.error_kinds.set(attr, kind);
                self.mark_dirty();
            }
        }
    }

    pub fn set_plateau_error_kind(&mut self, kind: ErrorKind) {
        self.error_kinds.plateau = kind;
        self.mark_dirty();
    }

    pub fn set_isochron_error_kind(&mut self, kind: ErrorKind) {
        self.error_kinds.isochron = kind;
        self.mark_dirty();
    }

    /// Choose where J's fractional error is folded in. The two places are
    /// mutually exclusive; `individual` wins.
    pub fn set_j_error(&mut self, individual: bool, mean: bool) {
        self.include_j_error_in_individual_analyses = individual;
        self.include_j_error_in_mean = !individual && mean;
        self.mark_dirty();
    }

    pub fn set_include_j_error_in_plateau(&mut self, include: bool) {
        if let Some(sh) = self.step_heat.as_mut() {
            sh.include_j_error_in_plateau = include;
        }
        self.mark_dirty();
    }

    pub fn set_plateau_config(&mut self, plateau: PlateauConfig) {
        if let Some(sh) = self.step_heat.as_mut() {
            sh.plateau = plateau;
        }
        self.mark_dirty();
    }

    pub fn set_fixed_steps(&mut self, fixed: FixedSteps) {
        if let Some(sh) = self.step_heat.as_mut() {
            sh.fixed_steps = fixed;
        }
        self.mark_dirty();
    }

    /// Display ages in other units; computation is unaffected
    pub fn set_temporary_age_units(&mut self, units: Option<AgeUnits>) {
        self.display_units = units;
        self.mark_dirty();
    }

    // ========================================================================
    // Cache plumbing
    // ========================================================================

    fn member_revisions(&self) -> u64 {
        self.analyses
            .iter()
            .fold(0u64, |acc, a| acc.wrapping_add(a.revision()))
    }

    fn refresh(&self) {
        let stamp = (self.generation.get(), self.member_revisions());
        let mut cache = self.cache.borrow_mut();
        if cache.stamp != Some(stamp) {
            if cache.stamp.is_some() {
                tracing::trace!(group = %self.name, generation = stamp.0, "group cache invalidated");
            }
            *cache = GroupCache {
                stamp: Some(stamp),
                ..GroupCache::default()
            };
        }
    }

    fn cached<T: Clone>(
        &self,
        slot: fn(&mut GroupCache) -> &mut Option<T>,
        compute: impl FnOnce() -> T,
    ) -> T {
        self.refresh();
        let hit = slot(&mut self.cache.borrow_mut()).clone();
        if let Some(value) = hit {
            return value;
        }
        // No borrow is held here; `compute` may read other cached values
        let value = compute();
        *slot(&mut self.cache.borrow_mut()) = Some(value.clone());
        value
    }

    // ========================================================================
    // Basic statistics
    // ========================================================================

    /// Non-omitted analyses, recomputed on every call
    pub fn clean_analyses(&self) -> impl Iterator<Item = &Rc<dyn Analysis>> + '_ {
        self.analyses.iter().filter(|a| !a.is_omitted())
    }

    fn omitted_indices(&self) -> Vec<usize> {
        self.analyses
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_omitted())
            .map(|(i, _)| i)
            .collect()
    }

    fn values(&self, attr: Attribute) -> (Vec<f64>, Vec<f64>) {
        self.clean_analyses()
            .filter_map(|a| a.value(attr))
            .map(|v| (v.nominal, v.std_dev))
            .unzip()
    }

    /// Age attribute honouring the per-analysis J error flag
    pub fn age_attr(&self) -> Attribute {
        if self.include_j_error_in_individual_analyses {
            Attribute::AgeWithJError
        } else {
            Attribute::Age
        }
    }

    fn mean_attr(&self) -> Attribute {
        if self.attribute.is_age() {
            self.age_attr()
        } else {
            self.attribute
        }
    }

    pub fn total_n(&self) -> usize {
        self.analyses.len()
    }

    fn clean_count(&self) -> usize {
        self.cached(|c| &mut c.nanalyses, || self.clean_analyses().count())
    }

    /// Number of analyses behind the reported result. For an interpreted
    /// group whose age resolved to a plateau this is the plateau step count.
    pub fn nanalyses(&self) -> usize {
        if let Some(r) = self.preferred_resolution(Attribute::Age) {
            if r.computed_kind == PreferredKind::Plateau {
                return self.plateau().map(|w| w.nsteps()).unwrap_or(0);
            }
        }
        self.clean_count()
    }

    /// "n/N" summary
    pub fn nratio(&self) -> String {
        format!("{}/{}", self.nanalyses(), self.total_n())
    }

    fn reference_j(&self) -> UValue {
        self.analyses.first().map(|a| a.j()).unwrap_or_default()
    }

    /// Fractional error of the first analysis's J
    pub fn j_err(&self) -> f64 {
        self.reference_j().relative_error()
    }

    /// Fold J's fractional error into `value` when `include_j_error_in_mean` is set
    pub fn apply_j_error(&self, value: UValue) -> UValue {
        self.fold_j_error(value, self.include_j_error_in_mean)
    }

    fn fold_j_error(&self, value: UValue, apply: bool) -> UValue {
        if !apply {
            return value;
        }
        value.combine_quadrature(self.j_err()).sanitize()
    }

    /// MSWD of the selected attribute over the clean analyses
    pub fn mswd(&self) -> f64 {
        self.cached(
            |c| &mut c.mswd,
            || {
                let (vs, es) = self.values(self.mean_attr());
                stats::mswd(&vs, &es, None)
            },
        )
    }

    /// `(mswd, valid, n)`
    pub fn get_mswd_tuple(&self) -> (f64, bool, usize) {
        let mswd = self.mswd();
        let n = self.nanalyses();
        let valid = stats::validate_mswd_at(mswd, n, self.config.mswd_confidence);
        (mswd, valid, n)
    }

    pub fn weighted_age(&self) -> UValue {
        self.cached(
            |c| &mut c.weighted_age,
            || {
                let kind = self.error_kinds.age;
                let (vs, es) = self.values(self.mean_attr());
                let s = stats::weighted_stats(&vs, &es);
                let err = stats::modify_error(s.error(kind), kind, self.mswd());
                self.apply_j_error(UValue::new(s.mean, err).sanitize())
            },
        )
    }

    pub fn arith_age(&self) -> UValue {
        self.cached(
            |c| &mut c.arith_age,
            || {
                let (vs, _) = self.values(self.age_attr());
                let (mean, sd) = stats::arithmetic_mean(&vs);
                let err = stats::modify_error(sd, self.error_kinds.age, self.mswd());
                self.apply_j_error(UValue::new(mean, err).sanitize())
            },
        )
    }

    /// Weighted mean of any attribute, error per the attribute's error kind
    pub fn weighted_mean_of(&self, attr: Attribute) -> UValue {
        if attr == Attribute::Age {
            return self.weighted_age();
        }
        let kind = self.error_kinds.get(attr);
        let (vs, es) = self.values(attr);
        let s = stats::weighted_stats(&vs, &es);
        let mswd = stats::mswd(&vs, &es, Some(s.mean));
        UValue::new(s.mean, stats::modify_error(s.error(kind), kind, mswd)).sanitize()
    }

    /// Arithmetic mean and sample SD of any attribute
    pub fn arithmetic_mean_of(&self, attr: Attribute) -> UValue {
        if attr == Attribute::Age {
            return self.arith_age();
        }
        let (vs, _) = self.values(attr);
        let (mean, sd) = stats::arithmetic_mean(&vs);
        UValue::new(mean, sd).sanitize()
    }

    pub fn attr_stats(&self, attr: Attribute) -> AttrStats {
        let (vs, es) = self.values(attr);
        let s = stats::weighted_stats(&vs, &es);
        let mswd = stats::mswd(&vs, &es, Some(s.mean));
        let valid_mswd = stats::validate_mswd_at(mswd, vs.len(), self.config.mswd_confidence);

        let (min, max) = if vs.is_empty() {
            (0.0, 0.0)
        } else {
            (
                vs.iter().copied().fold(f64::INFINITY, f64::min),
                vs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            )
        };
        let total_dev = if max != 0.0 {
            (max - min) / max * 100.0
        } else {
            0.0
        };

        AttrStats {
            mean: s.mean,
            sd: s.sd,
            sem: s.sem,
            mswd,
            valid_mswd,
            min,
            max,
            total_dev,
        }
    }

    // ========================================================================
    // Isochron
    // ========================================================================

    fn regress(&self, excluded: &[usize]) -> Option<IsochronResult> {
        let refs: Vec<&dyn Analysis> = self.analyses.iter().map(|a| a.as_ref()).collect();
        regress_isochron(
            &refs,
            self.error_kinds.isochron,
            excluded,
            &self.config.constants,
            self.config.mswd_confidence,
        )
    }

    /// Regression over the non-omitted, non-group analyses
    pub fn isochron_result(&self) -> Option<IsochronResult> {
        self.cached(|c| &mut c.isochron, || self.regress(&self.omitted_indices()))
    }

    pub fn isochron_age(&self) -> UValue {
        self.isochron_result().map(|r| r.age).unwrap_or_default()
    }

    /// Trapped 40Ar/36Ar from the isochron intercept
    pub fn isochron_4036(&self) -> Option<UValue> {
        self.isochron_result().map(|r| r.trapped_4036)
    }

    fn plateau_isochron_age(&self) -> UValue {
        let Some(window) = self.plateau() else {
            return UValue::zero();
        };
        let excluded: Vec<usize> = (0..self.analyses.len())
            .filter(|i| !window.steps.contains(i))
            .collect();
        self.regress(&excluded).map(|r| r.age).unwrap_or_default()
    }

    // ========================================================================
    // Plateau
    // ========================================================================

    /// The accepted plateau window, `None` for simple groups, groups holding
    /// interpreted subgroups, and spectra without a plateau
    pub fn plateau(&self) -> Option<PlateauWindow> {
        self.cached(|c| &mut c.plateau, || self.search_plateau())
    }

    fn search_plateau(&self) -> Option<PlateauWindow> {
        let sh = self.step_heat.as_ref()?;
        if self.analyses.iter().any(|a| a.is_interpreted_group()) {
            return None;
        }

        let n = self.analyses.len();
        let mut ages = Vec::with_capacity(n);
        let mut errors = Vec::with_capacity(n);
        let mut gas = Vec::with_capacity(n);
        for a in &self.analyses {
            let age = a.value(Attribute::Age).unwrap_or_default();
            ages.push(age.nominal);
            errors.push(age.std_dev);
            gas.push(k39_of(a));
        }
        let excluded = self.omitted_indices();

        let input = PlateauInput {
            ages: &ages,
            errors: &errors,
            gas: &gas,
            excluded: &excluded,
        };
        find_plateau(&input, &sh.criteria(n, self.config.mswd_confidence))
    }

    /// Weighted age of the plateau steps, 0 ± 0 without a plateau
    pub fn plateau_age(&self) -> UValue {
        self.cached(
            |c| &mut c.plateau_age,
            || {
                let age = match self.plateau() {
                    Some(window) => {
                        let kind = self.error_kinds.plateau;
                        let err = if kind == ErrorKind::Sd {
                            let ages: Vec<f64> = window
                                .steps
                                .iter()
                                .filter_map(|&i| self.analyses.get(i))
                                .filter_map(|a| a.value(Attribute::Age))
                                .map(|v| v.nominal)
                                .collect();
                            stats::population_sd(&ages)
                        } else {
                            stats::modify_error(window.error, kind, window.mswd)
                        };
                        UValue::new(window.age, err).sanitize()
                    }
                    None => UValue::zero(),
                };
                let in_plateau = self
                    .step_heat
                    .as_ref()
                    .is_some_and(|sh| sh.include_j_error_in_plateau);
                self.fold_j_error(age, self.include_j_error_in_mean || in_plateau)
            },
        )
    }

    /// Clean analyses inside the plateau window
    pub fn plateau_analyses(&self) -> impl Iterator<Item = &Rc<dyn Analysis>> + '_ {
        let steps = self.plateau().map(|w| w.steps).unwrap_or_default();
        self.analyses
            .iter()
            .enumerate()
            .filter(move |(i, a)| !a.is_omitted() && steps.contains(i))
            .map(|(_, a)| a)
    }

    pub fn is_plateau_step(&self, idx: usize) -> bool {
        match (self.analyses.get(idx), self.plateau()) {
            (Some(a), Some(w)) => !a.is_omitted() && w.steps.contains(&idx),
            _ => false,
        }
    }

    /// Plateau window label such as "B-F"
    pub fn plateau_steps_label(&self) -> Option<String> {
        self.plateau().map(|w| w.label())
    }

    /// `(mswd, valid, nsteps)` of the plateau; `(0, false, 0)` without one
    pub fn get_plateau_mswd_tuple(&self) -> (f64, bool, usize) {
        match self.plateau() {
            Some(w) => (w.mswd, w.valid_mswd, w.nsteps()),
            None => (0.0, false, 0),
        }
    }

    // ========================================================================
    // Gas bookkeeping (percent of total 39ArK)
    // ========================================================================

    pub fn total_ar39(&self) -> f64 {
        self.analyses.iter().map(k39_of).sum()
    }

    fn percent_of_total(&self, part: f64) -> f64 {
        let total = self.total_ar39();
        if total == 0.0 {
            0.0
        } else {
            part / total * 100.0
        }
    }

    pub fn incremental_ar39(&self, idx: usize) -> f64 {
        self.analyses
            .get(idx)
            .map(|a| self.percent_of_total(k39_of(a)))
            .unwrap_or(0.0)
    }

    /// Gas released up to and including step `idx`
    pub fn cumulative_ar39(&self, idx: usize) -> f64 {
        self.percent_of_total(self.analyses.iter().take(idx + 1).map(k39_of).sum())
    }

    pub fn valid_total_ar39(&self) -> f64 {
        self.percent_of_total(self.clean_analyses().map(k39_of).sum())
    }

    pub fn plateau_total_ar39(&self) -> f64 {
        self.percent_of_total(self.plateau_analyses().map(k39_of).sum())
    }

    // ========================================================================
    // Integrated values
    // ========================================================================

    /// Integrated ages are only meaningful within one physical aliquot
    pub fn integrated_enabled(&self) -> bool {
        let mut aliquots = self.clean_analyses().map(|a| a.aliquot());
        match aliquots.next() {
            Some(first) => self.clean_count() > 1 && aliquots.all(|a| a == first),
            None => false,
        }
    }

    /// Integrated age of the clean analyses
    pub fn integrated_age(&self) -> UValue {
        self.cached(
            |c| &mut c.integrated_age,
            || self.integrated_of(Attribute::Age, IntegratedSubset::Valid),
        )
    }

    /// Sum-based value of `attr` over a subset. Any nested interpreted group
    /// in the subset makes the sum meaningless and yields 0 ± 0.
    pub fn integrated_of(&self, attr: Attribute, subset: IntegratedSubset) -> UValue {
        let ans: Vec<&Rc<dyn Analysis>> = match subset {
            IntegratedSubset::Total => self.analyses.iter().collect(),
            IntegratedSubset::Valid => self.clean_analyses().collect(),
            IntegratedSubset::Plateau => self.plateau_analyses().collect(),
        };
        if ans.is_empty() || ans.iter().any(|a| a.is_interpreted_group()) {
            return UValue::zero();
        }

        let sum = |key: Computed| -> UValue { ans.iter().map(|a| a.computed(key)).sum() };
        let ratios = ans[0].production_ratios();

        let value = match attr {
            Attribute::Age | Attribute::AgeWithJError => {
                match sum(Computed::Rad40).checked_div(sum(Computed::K39)) {
                    Some(r) => age_equation(r, ans[0].j(), &self.config.constants).unwrap_or_default(),
                    None => UValue::zero(),
                }
            }
            Attribute::Kca => {
                corrected_ratio(sum(Computed::K39), sum(Computed::Ca37), ratios, CA_K)
            }
            Attribute::Kcl => {
                corrected_ratio(sum(Computed::K39), sum(Computed::Cl38), ratios, CL_K)
            }
            Attribute::Rad40Percent => sum(Computed::Rad40)
                .checked_div(sum(Computed::Total40))
                .map(|r| r * 100.0)
                .unwrap_or_default(),
            Attribute::MolesK39 => ans
                .iter()
                .filter_map(|a| a.value(Attribute::MolesK39))
                .sum::<UValue>(),
            Attribute::SignalK39 => sum(Computed::K39),
            Attribute::Intensity(iso) => ans.iter().filter_map(|a| a.isotope(iso)).sum::<UValue>(),
        };
        value.sanitize()
    }

    // ========================================================================
    // Preferred values
    // ========================================================================

    /// True when any member is itself an interpreted-age group
    pub fn has_subgroups(&self) -> bool {
        self.analyses.iter().any(|a| a.is_interpreted_group())
    }

    fn refresh_subgrouping(&mut self) {
        let has_subgroups = self.has_subgroups();
        if let Some(pvs) = self.preferred.as_mut() {
            pvs.apply_subgrouping(has_subgroups);
        }
    }

    /// Select how `attr` is resolved
    pub fn set_preferred_kind(
        &mut self,
        attr: Attribute,
        kind: PreferredKind,
        error_kind: ErrorKind,
    ) -> Result<(), GroupError> {
        let allowed = self
            .preferred
            .as_ref()
            .ok_or(GroupError::NotInterpreted)?
            .get(attr)
            .ok_or(GroupError::UntrackedAttribute(attr))?
            .allows(kind);
        if !allowed {
            return Err(GroupError::UnsupportedKind { attr, kind });
        }
        self.select_preferred(attr, kind, error_kind);
        Ok(())
    }

    pub fn set_preferred_age(
        &mut self,
        kind: PreferredKind,
        error_kind: ErrorKind,
    ) -> Result<(), GroupError> {
        self.set_preferred_kind(Attribute::Age, kind, error_kind)
    }

    fn select_preferred(&mut self, attr: Attribute, kind: PreferredKind, error_kind: ErrorKind) {
        if let Some(pv) = self.preferred.as_mut().and_then(|p| p.get_mut(attr)) {
            pv.kind = kind;
            pv.error_kind = error_kind;
        }

        if attr.is_age() {
            if kind.is_isochron() {
                self.error_kinds.isochron = error_kind;
            }
            if kind.uses_plateau() {
                self.error_kinds.plateau = error_kind;
                if kind != PreferredKind::Plateau {
                    self.error_kinds.age = error_kind;
                }
            } else {
                self.error_kinds.age = error_kind;
            }
        } else {
            self.error_kinds.set(attr, error_kind);
        }
        self.mark_dirty();
    }

    /// Apply default kinds, optionally overridden per attribute by `spec`.
    ///
    /// Multi-aliquot groups default to Weighted Mean with MSEM; single-aliquot
    /// groups to Plateau else Valid Integrated with SD. Without a spec the age
    /// is always Weighted Mean with MSEM. A kind the attribute cannot use falls
    /// back to its nested-group default.
    pub fn set_preferred_kinds(&mut self, spec: Option<&SubgroupingSpec>) {
        if self.preferred.is_none() {
            return;
        }

        let naliquots = self
            .analyses
            .iter()
            .map(|a| a.aliquot())
            .collect::<BTreeSet<_>>()
            .len();
        let (default_kind, default_error) = if naliquots > 1 {
            (PreferredKind::WeightedMean, ErrorKind::Msem)
        } else {
            (PreferredKind::PlateauElseValidIntegrated, ErrorKind::Sd)
        };

        for attr in Attribute::PREFERRED {
            let (mut kind, error_kind) = match spec {
                None if attr.is_age() => (PreferredKind::WeightedMean, ErrorKind::Msem),
                None => (default_kind, default_error),
                Some(s) => (
                    s.kind(attr).unwrap_or(default_kind),
                    s.error_kind(attr).unwrap_or(default_error),
                ),
            };

            let allowed = self
                .preferred
                .as_ref()
                .and_then(|p| p.get(attr))
                .is_some_and(|pv| pv.allows(kind));
            if !allowed {
                let fallback = if attr.is_age() {
                    PreferredKind::WeightedMean
                } else {
                    nested_default(attr)
                };
                tracing::debug!(%attr, %kind, %fallback, "preferred kind not selectable here");
                kind = fallback;
            }
            self.select_preferred(attr, kind, error_kind);
        }
    }

    fn preferred_resolution(&self, attr: Attribute) -> Option<Resolution> {
        let pv = self.preferred.as_ref()?.get(attr)?;

        self.refresh();
        let hit = self.cache.borrow().preferred.get(&attr).copied();
        if hit.is_some() {
            return hit;
        }

        let resolution = self.resolve(attr, pv.kind);
        tracing::trace!(
            group = %self.name,
            %attr,
            kind = %pv.kind,
            computed = %resolution.computed_kind,
            "resolved preferred value"
        );
        self.cache.borrow_mut().preferred.insert(attr, resolution);
        Some(resolution)
    }

    fn resolve(&self, attr: Attribute, kind: PreferredKind) -> Resolution {
        use PreferredKind::*;

        let (value, computed_kind) = if attr.is_age() {
            match kind {
                WeightedMean => (self.weighted_age(), WeightedMean),
                ArithmeticMean => (self.arith_age(), ArithmeticMean),
                Isochron => (self.isochron_age(), Isochron),
                IsochronOfPlateauSteps => (self.plateau_isochron_age(), IsochronOfPlateauSteps),
                Plateau => (self.plateau_age(), Plateau),
                TotalIntegrated => (self.integrated_of(attr, IntegratedSubset::Total), kind),
                ValidIntegrated => (self.integrated_of(attr, IntegratedSubset::Valid), kind),
                PlateauIntegrated => (self.integrated_of(attr, IntegratedSubset::Plateau), kind),
                PlateauElseWeightedMean => {
                    if self.plateau().is_some() {
                        (self.plateau_age(), Plateau)
                    } else {
                        (self.weighted_age(), WeightedMean)
                    }
                }
                PlateauElseValidIntegrated => self.plateau_else_valid_integrated(attr),
            }
        } else {
            match kind {
                WeightedMean => (self.weighted_mean_of(attr), WeightedMean),
                TotalIntegrated => (self.integrated_of(attr, IntegratedSubset::Total), kind),
                ValidIntegrated => (self.integrated_of(attr, IntegratedSubset::Valid), kind),
                PlateauIntegrated => (self.integrated_of(attr, IntegratedSubset::Plateau), kind),
                PlateauElseValidIntegrated => self.plateau_else_valid_integrated(attr),
                _ => (self.arithmetic_mean_of(attr), ArithmeticMean),
            }
        };

        Resolution {
            value,
            computed_kind,
        }
    }

    fn plateau_else_valid_integrated(&self, attr: Attribute) -> (UValue, PreferredKind) {
        if self.plateau().is_some() {
            (
                self.integrated_of(attr, IntegratedSubset::Plateau),
                PreferredKind::PlateauIntegrated,
            )
        } else {
            (
                self.integrated_of(attr, IntegratedSubset::Valid),
                PreferredKind::ValidIntegrated,
            )
        }
    }

    /// Resolved preferred value of `attr`, `None` for non-interpreted groups
    pub fn preferred_value(&self, attr: Attribute) -> Option<ResolvedValue> {
        let pv = self.preferred.as_ref()?.get(attr)?;
        let r = self.preferred_resolution(attr)?;
        Some(ResolvedValue {
            attr,
            kind: pv.kind,
            error_kind: pv.error_kind,
            value: r.value.nominal,
            error: r.value.std_dev,
            computed_kind: r.computed_kind,
        })
    }

    /// Every resolved preferred value, in display order
    pub fn preferred_values(&self) -> Vec<ResolvedValue> {
        Attribute::PREFERRED
            .iter()
            .filter_map(|&attr| self.preferred_value(attr))
            .collect()
    }

    /// The interpreted age; the weighted age for groups without preferred values
    pub fn preferred_age(&self) -> UValue {
        self.preferred_resolution(Attribute::Age)
            .map(|r| r.value)
            .unwrap_or_else(|| self.weighted_age())
    }

    fn age_fired_as_plateau(&self) -> bool {
        self.preferred_resolution(Attribute::Age)
            .is_some_and(|r| r.computed_kind == PreferredKind::Plateau)
    }

    /// Plateau tuple when the age resolved to a plateau, the group tuple otherwise
    pub fn get_preferred_mswd_tuple(&self) -> (f64, bool, usize) {
        if self.age_fired_as_plateau() {
            self.get_plateau_mswd_tuple()
        } else {
            self.get_mswd_tuple()
        }
    }

    pub fn preferred_mswd(&self) -> f64 {
        self.get_preferred_mswd_tuple().0
    }

    pub fn ages(&self) -> GroupAges {
        GroupAges {
            weighted_age: self.weighted_age(),
            plateau_age: self.plateau_age(),
            isochron_age: self.isochron_age(),
            integrated_age: self.integrated_age(),
        }
    }

    // ========================================================================
    // Display scaling
    // ========================================================================

    /// Units ages are shown in
    pub fn age_units(&self) -> AgeUnits {
        self.display_units.unwrap_or(self.config.constants.age_units)
    }

    /// Convert a computed age into the display units
    pub fn scale_for_display(&self, age: UValue) -> UValue {
        age * self.config.constants.age_units.scale_to(self.age_units())
    }
}

const CA_K: &str = "Ca_K";
const CL_K: &str = "Cl_K";

fn k39_of(a: &Rc<dyn Analysis>) -> f64 {
    a.computed(Computed::K39).nominal
}

/// `num / den / pr`, where a missing or zero production ratio counts as 1
fn corrected_ratio(
    num: UValue,
    den: UValue,
    ratios: Option<&ProductionRatios>,
    key: &str,
) -> UValue {
    let Some(ratio) = num.checked_div(den) else {
        return UValue::zero();
    };
    match ratios.and_then(|p| p.get(key)).filter(|pr| pr.nominal != 0.0) {
        Some(pr) => ratio / *pr,
        None => ratio,
    }
}

impl Analysis for AnalysisGroup {
    fn value(&self, attr: Attribute) -> Option<UValue> {
        let v = match attr {
            Attribute::Age | Attribute::AgeWithJError => self.preferred_age(),
            other => match self.preferred_value(other) {
                Some(r) => r.uvalue(),
                None => self.weighted_mean_of(other),
            },
        };
        Some(v)
    }

    fn omission(&self) -> Option<OmitReason> {
        None
    }

    fn aliquot(&self) -> String {
        self.analyses
            .first()
            .map(|a| a.aliquot())
            .unwrap_or_default()
    }

    fn j(&self) -> UValue {
        self.reference_j()
    }

    fn production_ratios(&self) -> Option<&ProductionRatios> {
        self.analyses.first().and_then(|a| a.production_ratios())
    }

    fn computed(&self, key: Computed) -> UValue {
        self.clean_analyses().map(|a| a.computed(key)).sum()
    }

    fn isotope(&self, _isotope: Isotope) -> Option<UValue> {
        None
    }

    fn revision(&self) -> u64 {
        self.generation.get().wrapping_add(self.member_revisions())
    }

    fn as_group(&self) -> Option<&AnalysisGroup> {
        Some(self)
    }
}
