//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::{Filter, Metric, Selection, Year};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// oyatlas - Opportunity Youth metro dashboard
///
/// Roll metro-level Opportunity Youth breakdowns up into national totals,
/// filter by gender and race/ethnicity, and export the resulting table.
///
/// Examples:
///   oyatlas --year 2022
///   oyatlas --metro 35620 --gender Female --format csv -o nyc.csv
///   oyatlas --metric share --race Hispanic
///   oyatlas --list-metros
///   oyatlas --interactive
///   oyatlas --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// GeoJSON metro feature collection (path or http(s) URL)
    #[arg(long, value_name = "SRC", env = "OYATLAS_GEOJSON")]
    pub geojson: Option<String>,

    /// Detail breakdown document keyed by GEOID (path or http(s) URL)
    #[arg(long, value_name = "SRC", env = "OYATLAS_DETAIL")]
    pub detail: Option<String>,

    /// Year to display (2022 or 2023)
    #[arg(short, long, value_name = "YEAR")]
    pub year: Option<Year>,

    /// Metro GEOID to display; omit for the national rollup
    #[arg(short, long, value_name = "GEOID")]
    pub metro: Option<String>,

    /// Gender filter ("all" for no filter)
    #[arg(long, default_value = "all")]
    pub gender: String,

    /// Race/ethnicity filter ("all" for no filter)
    #[arg(long, default_value = "all")]
    pub race: String,

    /// Percentage shown in the table
    #[arg(long, value_name = "METRIC")]
    pub metric: Option<Metric>,

    /// Output format (markdown, json, csv)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Output file path for the report ("-" for stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .oyatlas.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Timeout in seconds for remote dataset sources
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Leave out the 2022 to 2023 change column
    #[arg(long)]
    pub no_change: bool,

    /// Leave out the combined (2022 + 2023) OY column
    #[arg(long)]
    pub no_combined: bool,

    /// List metro areas with their summary for the chosen year and exit
    #[arg(long, conflicts_with = "interactive")]
    pub list_metros: bool,

    /// Start an interactive session reading commands from stdin
    #[arg(short, long)]
    pub interactive: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .oyatlas.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
    /// CSV spreadsheet export
    Csv,
}

impl OutputFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "md" | "markdown" => Some(OutputFormat::Markdown),
            "json" => Some(OutputFormat::Json),
            "csv" => Some(OutputFormat::Csv),
            _ => None,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref metro) = self.metro {
            if metro.trim().is_empty() {
                return Err("Metro GEOID must not be empty".to_string());
            }
        }

        for (flag, source) in [("--geojson", &self.geojson), ("--detail", &self.detail)] {
            if let Some(source) = source {
                if source.trim().is_empty() {
                    return Err(format!("{} must not be empty", flag));
                }
            }
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// The selection requested on the command line.
    pub fn selection(&self) -> Selection {
        match self.metro {
            Some(ref id) => Selection::Metro(id.trim().to_string()),
            None => Selection::National,
        }
    }

    pub fn gender_filter(&self) -> Filter {
        self.gender.parse().unwrap_or_default()
    }

    pub fn race_filter(&self) -> Filter {
        self.race.parse().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            geojson: None,
            detail: None,
            year: None,
            metro: None,
            gender: "all".to_string(),
            race: "all".to_string(),
            metric: None,
            format: None,
            output: None,
            config: None,
            timeout: None,
            no_change: false,
            no_combined: false,
            list_metros: false,
            interactive: false,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "oyatlas", "--year", "2022", "--metro", "35620", "--gender", "Female", "--metric",
            "share", "--format", "csv",
        ])
        .unwrap();

        assert_eq!(args.year, Some(Year::Y2022));
        assert_eq!(args.selection(), Selection::Metro("35620".to_string()));
        assert_eq!(args.gender_filter(), Filter::Only("Female".to_string()));
        assert_eq!(args.race_filter(), Filter::All);
        assert_eq!(args.metric, Some(Metric::Share));
        assert_eq!(args.format, Some(OutputFormat::Csv));
    }

    #[test]
    fn test_reject_unknown_year() {
        assert!(Args::try_parse_from(["oyatlas", "--year", "2019"]).is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_empty_metro() {
        let mut args = make_args();
        args.metro = Some("  ".to_string());
        assert!(args.validate().is_err());

        args.metro = Some("12420".to_string());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_default_selection_is_national() {
        assert_eq!(make_args().selection(), Selection::National);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            OutputFormat::from_path(std::path::Path::new("out.CSV")),
            Some(OutputFormat::Csv)
        );
        assert_eq!(
            OutputFormat::from_path(std::path::Path::new("report.md")),
            Some(OutputFormat::Markdown)
        );
        assert_eq!(OutputFormat::from_path(std::path::Path::new("report")), None);
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
