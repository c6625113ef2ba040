//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.oyatlas.toml` files.

use crate::cli::OutputFormat;
use crate::models::{Metric, Year};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".oyatlas.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Dataset sources.
    #[serde(default)]
    pub data: DataConfig,

    /// Initial view settings.
    #[serde(default)]
    pub view: ViewConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// Where the two input documents come from (paths or http(s) URLs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// GeoJSON feature collection of metro areas.
    #[serde(default = "default_geojson")]
    pub geojson: String,

    /// Detail document keyed by GEOID.
    #[serde(default = "default_detail")]
    pub detail: String,

    /// Timeout for remote fetches, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            geojson: default_geojson(),
            detail: default_detail(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_geojson() -> String {
    "data/metro_areas_oy.geojson".to_string()
}

fn default_detail() -> String {
    "data/metro_detailed_data.json".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Initial view settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Year shown on startup.
    #[serde(default)]
    pub year: Year,

    /// Percentage shown in the breakdown table.
    #[serde(default)]
    pub metric: Metric,
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Default output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Include the 2022 to 2023 change column.
    #[serde(default = "default_true")]
    pub include_change: bool,

    /// Include the combined (2022 + 2023) OY column.
    #[serde(default = "default_true")]
    pub include_combined: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            output: default_output(),
            include_change: true,
            include_combined: true,
        }
    }
}

fn default_output() -> String {
    "oy_report.md".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings; only
    /// values the user actually passed override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref geojson) = args.geojson {
            self.data.geojson = geojson.clone();
        }
        if let Some(ref detail) = args.detail {
            self.data.detail = detail.clone();
        }
        if let Some(timeout) = args.timeout {
            self.data.timeout_seconds = timeout;
        }

        if let Some(year) = args.year {
            self.view.year = year;
        }
        if let Some(metric) = args.metric {
            self.view.metric = metric;
        }

        if let Some(format) = args.format {
            self.report.format = format;
        }
        if let Some(ref output) = args.output {
            self.report.output = output.display().to_string();
        }
        if args.no_change {
            self.report.include_change = false;
        }
        if args.no_combined {
            self.report.include_combined = false;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.data.geojson, "data/metro_areas_oy.geojson");
        assert_eq!(config.view.year, Year::Y2023);
        assert_eq!(config.view.metric, Metric::Rate);
        assert_eq!(config.report.format, OutputFormat::Markdown);
        assert!(config.report.include_change);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[data]
geojson = "https://example.org/metro_areas_oy.geojson"
timeout_seconds = 5

[view]
year = 2022
metric = "share"

[report]
format = "csv"
output = "breakdown.csv"
include_combined = false
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.data.geojson, "https://example.org/metro_areas_oy.geojson");
        assert_eq!(config.data.detail, "data/metro_detailed_data.json");
        assert_eq!(config.data.timeout_seconds, 5);
        assert_eq!(config.view.year, Year::Y2022);
        assert_eq!(config.view.metric, Metric::Share);
        assert_eq!(config.report.format, OutputFormat::Csv);
        assert_eq!(config.report.output, "breakdown.csv");
        assert!(config.report.include_change);
        assert!(!config.report.include_combined);
    }

    #[test]
    fn test_reject_unknown_year() {
        let result: Result<Config, _> = toml::from_str("[view]\nyear = 2019\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[data]"));
        assert!(toml_str.contains("[view]"));
        assert!(toml_str.contains("[report]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.view.year, Year::Y2023);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[view]\nmetric = \"share\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.view.metric, Metric::Share);
        assert!(Config::load(&dir.path().join("missing.toml")).is_err());
    }
}
