//! `arar config` command - show the effective reduction configuration

use miette::Result;

use crate::cli::output::{self, FieldRow};
use crate::cli::GlobalOpts;
use crate::core::config::ReductionConfig;

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Show the built-in defaults, ignoring --config
    #[arg(long)]
    pub defaults: bool,
}

pub fn run(args: ConfigArgs, global: &GlobalOpts) -> Result<()> {
    let config = if args.defaults {
        ReductionConfig::with_defaults()
    } else {
        global.load_config()?
    };

    if output::emit_structured(&config, global.output)? {
        return Ok(());
    }

    let source = match (&global.config, args.defaults) {
        (Some(path), false) => path.display().to_string(),
        _ => "built-in defaults".to_string(),
    };
    output::heading(&format!("Reduction configuration ({})", source));
    output::print_table(config_rows(&config));
    Ok(())
}

fn config_rows(config: &ReductionConfig) -> Vec<FieldRow> {
    let c = &config.constants;
    let p = &config.plateau;
    vec![
        FieldRow::new("lambda_k (1/a)", format!("{:e} ± {:e}", c.lambda_k.nominal, c.lambda_k.std_dev)),
        FieldRow::new("Age units", c.age_units),
        FieldRow::new("Include decay error", c.include_decay_error),
        FieldRow::new("Plateau definition", p.definition.description()),
        FieldRow::new("Plateau min. steps", p.nsteps),
        FieldRow::new("Plateau min. %39Ar", p.gas_fraction),
        FieldRow::new("Overlap (sigma)", p.overlap_sigma),
        FieldRow::new("MSWD confidence", config.mswd_confidence),
    ]
}
