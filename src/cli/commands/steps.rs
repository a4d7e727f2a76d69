//! `arar steps` command - per-step ages, gas release and plateau membership

use console::style;
use miette::Result;
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;

use crate::cli::output;
use crate::cli::{Dataset, GlobalOpts};
use crate::core::analysis::{Attribute, OmitReason};
use crate::core::plateau::{step_letter, PlateauDefinition};
use crate::core::stats;
use crate::core::uvalue::UValue;
use crate::entities::group::{AnalysisGroup, GroupVariant};
use crate::entities::step_heat::FixedSteps;

#[derive(clap::Args, Debug)]
pub struct StepsArgs {
    /// Dataset file (YAML)
    pub dataset: PathBuf,

    /// Plateau definition overriding the configuration
    #[arg(long, value_parser = parse_definition)]
    pub definition: Option<PlateauDefinition>,

    /// Minimum number of plateau steps
    #[arg(long)]
    pub nsteps: Option<usize>,

    /// Fix the plateau to start at this step (e.g. B)
    #[arg(long)]
    pub low: Option<String>,

    /// Fix the plateau to end at this step (e.g. F)
    #[arg(long)]
    pub high: Option<String>,
}

fn parse_definition(s: &str) -> std::result::Result<PlateauDefinition, String> {
    match s.to_ascii_lowercase().as_str() {
        "fleck" => Ok(PlateauDefinition::Fleck),
        "mahon" => Ok(PlateauDefinition::Mahon),
        _ => Err(format!("unknown plateau definition '{}' (expected fleck or mahon)", s)),
    }
}

/// One heating step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: String,
    pub runid: String,
    pub age: UValue,
    pub k39_percent: f64,
    pub cumulative_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<OmitReason>,
    pub plateau: bool,
}

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "Step")]
    step: String,
    #[tabled(rename = "Run")]
    runid: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "%39Ar")]
    k39: String,
    #[tabled(rename = "Cum. %")]
    cumulative: String,
    #[tabled(rename = "Tag")]
    tag: String,
    #[tabled(rename = "Plateau")]
    plateau: String,
}

impl From<&StepReport> for StepRow {
    fn from(s: &StepReport) -> Self {
        Self {
            step: s.step.clone(),
            runid: s.runid.clone(),
            age: output::format_uvalue(s.age, 4),
            k39: format!("{:.2}", s.k39_percent),
            cumulative: format!("{:.2}", s.cumulative_percent),
            tag: s.tag.map(|t| t.to_string()).unwrap_or_default(),
            plateau: if s.plateau { "●".to_string() } else { String::new() },
        }
    }
}

/// Rows for every member of `group`. Run ids come from the dataset records,
/// nested groups are listed by name.
pub fn step_reports(group: &AnalysisGroup, dataset: &Dataset) -> Vec<StepReport> {
    group
        .analyses()
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let runid = match (dataset.analyses.get(i), a.as_group()) {
                (Some(record), _) => record.runid.clone(),
                (None, Some(sub)) => sub.name().to_string(),
                (None, None) => String::new(),
            };
            StepReport {
                step: a.step().unwrap_or_else(|| step_letter(i)),
                runid,
                age: group.scale_for_display(a.value(Attribute::Age).unwrap_or_default()),
                k39_percent: group.incremental_ar39(i),
                cumulative_percent: group.cumulative_ar39(i),
                tag: a.omission(),
                plateau: group.is_plateau_step(i),
            }
        })
        .collect()
}

pub fn run(args: StepsArgs, global: &GlobalOpts) -> Result<()> {
    let config = global.load_config()?;
    let mut dataset = Dataset::load(&args.dataset)?;

    let mut plateau = dataset
        .plateau
        .clone()
        .unwrap_or_else(|| config.plateau.clone());
    if let Some(definition) = args.definition {
        plateau.definition = definition;
    }
    if let Some(nsteps) = args.nsteps {
        plateau.nsteps = nsteps;
    }
    dataset.plateau = Some(plateau.clone());
    if args.low.is_some() || args.high.is_some() {
        dataset.fixed_steps = FixedSteps {
            low: args.low,
            high: args.high,
        };
    }

    let mut group = dataset.build(&config);
    if group.step_heat_settings().is_none() {
        tracing::debug!("promoting simple dataset to a step-heat group");
        let mut config = config;
        config.plateau = plateau;
        group = AnalysisGroup::with_variant(
            GroupVariant::StepHeat,
            group.analyses().to_vec(),
            config,
        )
        .with_name(group.name());
        if !dataset.fixed_steps.is_empty() {
            group.set_fixed_steps(dataset.fixed_steps.clone());
        }
    }

    let steps = step_reports(&group, &dataset);
    if output::emit_structured(&steps, global.output)? {
        return Ok(());
    }

    output::heading(&format!("Steps ({})", group.age_units()));
    output::print_table(steps.iter().map(StepRow::from).collect::<Vec<_>>());
    match group.plateau() {
        Some(window) => println!(
            "{} plateau {} ({} steps, {:.1}% 39Ar): {} {}, MSWD {}",
            style("✓").green(),
            style(window.label()).cyan(),
            window.nsteps(),
            window.gas_fraction,
            output::format_uvalue(group.scale_for_display(group.plateau_age()), 4),
            group.age_units(),
            stats::format_mswd(window.mswd, window.valid_mswd, 2)
        ),
        None => println!("{} no plateau", style("✗").yellow()),
    }
    Ok(())
}
