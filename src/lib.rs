//! ArAr: reduction of 40Ar/39Ar analysis groups
//!
//! Aggregates individual analyses into weighted-mean, plateau, isochron and
//! integrated ages with propagated uncertainty, MSWD goodness of fit and
//! operator-selected preferred values. Groups may nest.

pub mod cli;
pub mod core;
pub mod entities;
pub mod yaml;
