//! CLI module - argument parsing, dataset loading and command dispatch

pub mod args;
pub mod commands;
pub mod dataset;
pub mod output;

pub use args::{Cli, Commands, GlobalOpts, OutputFormat};
pub use dataset::Dataset;
