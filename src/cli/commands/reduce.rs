//! `arar reduce` command - ages, MSWD and preferred values of a dataset

use console::style;
use miette::Result;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::output::{self, FieldRow};
use crate::cli::{Dataset, GlobalOpts};
use crate::core::analysis::Attribute;
use crate::core::config::AgeUnits;
use crate::core::stats::ErrorKind;
use crate::core::uvalue::UValue;
use crate::entities::group::{AnalysisGroup, GroupVariant};
use crate::entities::preferred::{PreferredKind, ResolvedValue};

#[derive(clap::Args, Debug)]
pub struct ReduceArgs {
    /// Dataset file (YAML)
    pub dataset: PathBuf,

    /// Attribute reduced by the weighted mean (e.g. age, kca, rad40_percent)
    #[arg(long, short = 'a')]
    pub attribute: Option<Attribute>,

    /// Preferred age kind (e.g. "plateau else weighted mean", isochron)
    #[arg(long)]
    pub age_kind: Option<PreferredKind>,

    /// Error kind for the age: MSEM, SEM or SD
    #[arg(long, short = 'e')]
    pub error_kind: Option<ErrorKind>,

    /// Display ages in these units (a, ka, Ma, Ga)
    #[arg(long, short = 'u')]
    pub units: Option<AgeUnits>,

    /// Fold J's error into each analysis instead of the mean
    #[arg(long)]
    pub j_error_in_analyses: bool,

    /// Leave J's error out of the mean
    #[arg(long, conflicts_with = "j_error_in_analyses")]
    pub no_j_error: bool,
}

/// MSWD with its acceptance flag
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MswdReport {
    pub mswd: f64,
    pub valid: bool,
    pub n: usize,
}

impl From<(f64, bool, usize)> for MswdReport {
    fn from((mswd, valid, n): (f64, bool, usize)) -> Self {
        Self { mswd, valid, n }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlateauReport {
    pub steps: String,
    pub age: UValue,
    pub gas_fraction: f64,
    pub mswd: MswdReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct IsochronReport {
    pub age: UValue,
    pub trapped_4036: UValue,
    pub mswd: MswdReport,
}

/// Everything `reduce` reports, ages in display units
#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub name: String,
    pub variant: GroupVariant,
    pub age_units: AgeUnits,
    pub attribute: Attribute,
    pub nratio: String,
    pub weighted_mean: UValue,
    pub arithmetic_mean: UValue,
    pub mswd: MswdReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plateau: Option<PlateauReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isochron: Option<IsochronReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrated_age: Option<UValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub preferred: Vec<ResolvedValue>,
}

impl GroupReport {
    pub fn from_group(group: &AnalysisGroup) -> Self {
        let display = |v: UValue| group.scale_for_display(v);
        let attribute = group.attribute();
        let mean_scale = |v: UValue| if attribute.is_age() { display(v) } else { v };

        let plateau = group.plateau().map(|w| PlateauReport {
            steps: w.label(),
            age: display(group.plateau_age()),
            gas_fraction: w.gas_fraction,
            mswd: MswdReport {
                mswd: w.mswd,
                valid: w.valid_mswd,
                n: w.nsteps(),
            },
        });

        let isochron = group.isochron_result().map(|r| IsochronReport {
            age: display(r.age),
            trapped_4036: r.trapped_4036,
            mswd: MswdReport {
                mswd: r.regressor.mswd,
                valid: r.regressor.valid_mswd,
                n: r.regressor.n,
            },
        });

        let integrated_age = (group.step_heat_settings().is_some() && group.integrated_enabled())
            .then(|| display(group.integrated_age()));

        let preferred = group
            .preferred_values()
            .into_iter()
            .map(|mut pv| {
                if pv.attr.is_age() {
                    let v = display(pv.uvalue());
                    pv.value = v.nominal;
                    pv.error = v.std_dev;
                }
                pv
            })
            .collect();

        Self {
            name: group.name().to_string(),
            variant: group.variant(),
            age_units: group.age_units(),
            attribute,
            nratio: group.nratio(),
            weighted_mean: mean_scale(group.weighted_age()),
            arithmetic_mean: mean_scale(group.arithmetic_mean_of(attribute)),
            mswd: group.get_mswd_tuple().into(),
            plateau,
            isochron,
            integrated_age,
            preferred,
        }
    }
}

pub fn run(args: ReduceArgs, global: &GlobalOpts) -> Result<()> {
    let config = global.load_config()?;
    let dataset = Dataset::load(&args.dataset)?;
    let mut group = dataset.build(&config);

    if args.j_error_in_analyses || args.no_j_error {
        group.set_j_error(args.j_error_in_analyses, false);
    }
    if let Some(units) = args.units {
        group.set_temporary_age_units(Some(units));
    }
    if let Some(attr) = args.attribute {
        group.set_attribute(attr);
    }
    match (args.age_kind, args.error_kind) {
        (Some(kind), error_kind) => {
            group.set_preferred_age(kind, error_kind.unwrap_or_default())?;
        }
        (None, Some(error_kind)) => group.set_error_kind(Attribute::Age, error_kind),
        (None, None) => {}
    }

    let report = GroupReport::from_group(&group);
    if output::emit_structured(&report, global.output)? {
        return Ok(());
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &GroupReport) {
    let title = if report.name.is_empty() {
        "Group".to_string()
    } else {
        report.name.clone()
    };
    output::heading(&format!("{} ({})", title, report.variant));

    let units = report.age_units;
    let mut rows = vec![
        FieldRow::new("n", &report.nratio),
        FieldRow::new(
            format!("Weighted mean {}", report.attribute),
            output::format_uvalue(report.weighted_mean, 4),
        ),
        FieldRow::new(
            format!("Arithmetic mean {}", report.attribute),
            output::format_uvalue(report.arithmetic_mean, 4),
        ),
        FieldRow::new("MSWD", mswd_text(report.mswd)),
    ];

    if let Some(p) = &report.plateau {
        rows.push(FieldRow::new(
            format!("Plateau age ({})", units),
            output::format_uvalue(p.age, 4),
        ));
        rows.push(FieldRow::new("Plateau steps", &p.steps));
        rows.push(FieldRow::new("Plateau %39Ar", format!("{:.1}", p.gas_fraction)));
        rows.push(FieldRow::new("Plateau MSWD", mswd_text(p.mswd)));
    }
    if let Some(i) = &report.isochron {
        rows.push(FieldRow::new(
            format!("Isochron age ({})", units),
            output::format_uvalue(i.age, 4),
        ));
        rows.push(FieldRow::new("Trapped 40Ar/36Ar", output::format_uvalue(i.trapped_4036, 1)));
        rows.push(FieldRow::new("Isochron MSWD", mswd_text(i.mswd)));
    }
    if let Some(age) = report.integrated_age {
        rows.push(FieldRow::new(
            format!("Integrated age ({})", units),
            output::format_uvalue(age, 4),
        ));
    }
    output::print_table(rows);

    if report.preferred.is_empty() {
        return;
    }
    println!();
    println!("{}", style("Preferred values").bold());
    let rows: Vec<FieldRow> = report
        .preferred
        .iter()
        .map(|pv| {
            let mut detail = format!(
                "{}  [{}, {}]",
                output::format_uvalue(pv.uvalue(), 4),
                pv.kind,
                pv.error_kind
            );
            if pv.computed_kind != pv.kind {
                detail.push_str(&format!(" -> {}", pv.computed_kind));
            }
            FieldRow::new(pv.attr.to_string(), detail)
        })
        .collect();
    output::print_table(rows);
}

fn mswd_text(m: MswdReport) -> String {
    output::format_mswd_tuple((m.mswd, m.valid, m.n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analysis::{Analysis, AnalysisRecord};
    use crate::core::config::ReductionConfig;
    use std::rc::Rc;

    fn step_group() -> AnalysisGroup {
        let analyses: Vec<Rc<dyn Analysis>> = [10.0, 10.05, 10.1]
            .iter()
            .map(|&age| {
                let r = AnalysisRecord::new("r", UValue::new(age, 0.1), UValue::exact(0.01))
                    .with_aliquot("01")
                    .with_k39(UValue::exact(1.0));
                Rc::new(r) as Rc<dyn Analysis>
            })
            .collect();
        AnalysisGroup::interpreted(analyses, ReductionConfig::default())
    }

    #[test]
    fn test_report_scales_ages_for_display() {
        let mut group = step_group();
        let ma = GroupReport::from_group(&group);
        group.set_temporary_age_units(Some(AgeUnits::Ka));
        let ka = GroupReport::from_group(&group);

        assert_eq!(ka.age_units, AgeUnits::Ka);
        assert!((ka.weighted_mean.nominal - ma.weighted_mean.nominal * 1000.0).abs() < 1e-6);
        let plateau = ka.plateau.unwrap();
        assert_eq!(plateau.steps, "A-C");
        assert_eq!(plateau.mswd.n, 3);

        let age = ka.preferred.iter().find(|pv| pv.attr == Attribute::Age).unwrap();
        assert!((age.value - ma.weighted_mean.nominal * 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_report_omits_missing_sections() {
        let group = step_group();
        let report = GroupReport::from_group(&group);
        assert!(report.isochron.is_none());
        // One aliquot with several clean steps
        assert!(report.integrated_age.is_some());
        assert_eq!(report.nratio, "3/3");
        assert_eq!(report.preferred.len(), Attribute::PREFERRED.len());
    }
}
