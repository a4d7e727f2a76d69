//! CLI command implementations

pub mod config;
pub mod reduce;
pub mod steps;
