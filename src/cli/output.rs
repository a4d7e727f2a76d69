//! Output formatting utilities

use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::cli::OutputFormat;
use crate::core::stats;
use crate::core::uvalue::UValue;

/// Print `value` as YAML or JSON. Returns false for table output, which the
/// caller renders itself.
pub fn emit_structured<T: Serialize>(value: &T, format: OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value).into_diagnostic()?;
            println!("{}", json);
            Ok(true)
        }
        OutputFormat::Yaml => {
            let yaml = serde_yml::to_string(value).into_diagnostic()?;
            print!("{}", yaml);
            Ok(true)
        }
        OutputFormat::Table => Ok(false),
    }
}

/// Bold title over a dim rule
pub fn heading(title: &str) {
    println!("{}", style(title).bold());
    println!("{}", style("─".repeat(60)).dim());
}

pub fn print_table<R: Tabled>(rows: Vec<R>) {
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
}

/// Two-column row for key/value tables
#[derive(Tabled)]
pub struct FieldRow {
    #[tabled(rename = "Field")]
    pub field: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl FieldRow {
    pub fn new(field: impl Into<String>, value: impl std::fmt::Display) -> Self {
        Self {
            field: field.into(),
            value: value.to_string(),
        }
    }
}

/// "nominal ± error" at a fixed number of decimals; "-" for 0 ± 0
pub fn format_uvalue(v: UValue, digits: usize) -> String {
    if v.is_zero() {
        "-".to_string()
    } else {
        format!("{:.*}", digits, v)
    }
}

/// "MSWD (n=N)" with the invalid marker when outside the envelope
pub fn format_mswd_tuple((mswd, valid, n): (f64, bool, usize)) -> String {
    format!("{} (n={})", stats::format_mswd(mswd, valid, 2), n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uvalue() {
        assert_eq!(format_uvalue(UValue::new(28.2012, 0.0512), 3), "28.201 ± 0.051");
        assert_eq!(format_uvalue(UValue::zero(), 3), "-");
    }

    #[test]
    fn test_format_mswd_tuple() {
        assert_eq!(format_mswd_tuple((1.234, true, 5)), "1.23 (n=5)");
        assert_eq!(format_mswd_tuple((9.0, false, 3)), "*9.00 (n=3)");
    }

    #[test]
    fn test_table_output_is_left_to_caller() {
        assert!(!emit_structured(&UValue::zero(), OutputFormat::Table).unwrap());
    }
}
