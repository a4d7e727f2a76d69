//! Command-line arguments

use clap::{Parser, Subcommand, ValueEnum};
use miette::Result;
use std::path::PathBuf;

use crate::cli::commands::{config::ConfigArgs, reduce::ReduceArgs, steps::StepsArgs};
use crate::core::config::ReductionConfig;

/// ArAr - reduce 40Ar/39Ar analysis groups
#[derive(Parser, Debug)]
#[command(name = "arar", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand
#[derive(clap::Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Reduction configuration file (YAML)
    #[arg(long, short = 'c', global = true, env = "ARAR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    /// Log reduction steps to stderr (filter with RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

impl GlobalOpts {
    /// The configuration file's contents, or the built-in defaults
    pub fn load_config(&self) -> Result<ReductionConfig> {
        match &self.config {
            Some(path) => Ok(ReductionConfig::load(path)?),
            None => Ok(ReductionConfig::with_defaults()),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable tables
    #[default]
    Table,
    Yaml,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reduce a dataset and report its ages and preferred values
    Reduce(ReduceArgs),

    /// List the heating steps of a dataset with gas fractions and plateau membership
    Steps(StepsArgs),

    /// Show the effective reduction configuration
    Config(ConfigArgs),
}
