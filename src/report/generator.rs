//! Report generation and spreadsheet export.
//!
//! This module renders the dashboard state (info panel plus breakdown
//! table) as Markdown, JSON or CSV. All percentage cells go through
//! [`Percent`]'s formatter so "not available" is rendered in one place.

use crate::cli::OutputFormat;
use crate::config::ReportConfig;
use crate::models::{
    FilterOptions, InfoPanel, Metric, MetroSummary, Percent, Report, ReportMetadata, TableView,
    Year,
};
use anyhow::{Context, Result};
use polars::{frame::DataFrame, io::SerWriter, prelude::{Column, CsvWriter, NamedFrom}, series::Series};
use std::path::Path;

/// Message shown when the selected area has no breakdown rows at all.
pub const NO_DATA_MESSAGE: &str = "No detailed data available for this area.";

/// Message shown when filters exclude every row.
pub const NO_MATCH_MESSAGE: &str = "No rows match the current filters.";

/// Which optional columns to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub include_change: bool,
    pub include_combined: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            include_change: true,
            include_combined: true,
        }
    }
}

impl From<&ReportConfig> for ReportOptions {
    fn from(config: &ReportConfig) -> Self {
        Self {
            include_change: config.include_change,
            include_combined: config.include_combined,
        }
    }
}

/// Render a report in the requested format.
pub fn render_report(report: &Report, format: OutputFormat, options: &ReportOptions) -> Result<String> {
    match format {
        OutputFormat::Markdown => Ok(generate_markdown_report(report, options)),
        OutputFormat::Json => generate_json_report(report),
        OutputFormat::Csv => generate_csv_report(&report.table, options),
    }
}

/// Render and write a report to a file.
pub fn write_report(
    report: &Report,
    format: OutputFormat,
    options: &ReportOptions,
    path: &Path,
) -> Result<()> {
    let content = render_report(report, format, options)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, options: &ReportOptions) -> String {
    let mut output = String::new();

    output.push_str("# Opportunity Youth Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_panel_section(&report.panel));
    output.push_str(&generate_table_section(&report.table, options));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();
    let view = &metadata.view;

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Year:** {}\n", view.year));
    section.push_str(&format!("- **Selection:** {}\n", view.selection));
    section.push_str(&format!("- **Gender:** {}\n", view.gender));
    section.push_str(&format!("- **Race/Ethnicity:** {}\n", view.race));
    section.push_str(&format!("- **Metric:** {}\n", view.metric.label()));
    section.push_str(&format!("- **Metros Loaded:** {}\n", metadata.metros_loaded));
    section.push_str(&format!("- **GeoJSON Source:** `{}`\n", metadata.geojson_source));
    section.push_str(&format!("- **Detail Source:** `{}`\n", metadata.detail_source));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push('\n');

    section
}

/// Generate the info panel section.
pub fn generate_panel_section(panel: &InfoPanel) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", panel.title));
    section.push_str(&format!("*Displaying data for {}*\n\n", panel.year));
    section.push_str(&format!(
        "- **Total Youth Population:** {}\n",
        format_count(panel.youth_population)
    ));
    section.push_str(&format!(
        "- **Total Opportunity Youth:** {}\n",
        format_count(panel.opportunity_youth)
    ));
    section.push_str(&format!(
        "- **Opportunity Youth Percentage:** {}\n\n",
        panel.percent
    ));

    section
}

/// Column headings shared by the Markdown and CSV renderers.
fn table_headers(metric: Metric, options: &ReportOptions) -> Vec<String> {
    let mut headers = vec![
        "Race/Ethnicity".to_string(),
        "Gender".to_string(),
    ];
    for year in Year::ALL {
        headers.push(format!("{} {}", metric.label(), year));
    }
    for year in Year::ALL {
        headers.push(format!("OY {}", year));
    }
    if options.include_combined {
        headers.push("OY 2022+2023".to_string());
    }
    if options.include_change {
        headers.push("Change".to_string());
    }
    headers
}

/// Generate the breakdown table with its footer totals.
pub fn generate_table_section(table: &TableView, options: &ReportOptions) -> String {
    let mut section = String::new();
    let headers = table_headers(table.metric, options);

    section.push_str("## Demographic Breakdown\n\n");
    section.push_str(&format!("| {} |\n", headers.join(" | ")));
    section.push_str(&format!("|{}\n", ":---|".repeat(headers.len())));

    if table.rows.is_empty() {
        let message = if table.has_data {
            NO_MATCH_MESSAGE
        } else {
            NO_DATA_MESSAGE
        };
        let blanks = " |".repeat(headers.len() - 1);
        section.push_str(&format!("| {} |{}\n", message, blanks));
    }

    for row in &table.rows {
        let value = row.value(table.metric);
        let mut cells = vec![escape_cell(&row.race_ethnicity), escape_cell(&row.gender)];
        cells.extend(Year::ALL.iter().map(|&y| value[y].to_string()));
        cells.extend(Year::ALL.iter().map(|&y| format_count(row.opportunity_youth[y])));
        if options.include_combined {
            cells.push(format_count(row.combined_oy));
        }
        if options.include_change {
            cells.push(format_change(row.change));
        }
        section.push_str(&format!("| {} |\n", cells.join(" | ")));
    }

    let mut footer = vec!["**Total**".to_string(), String::new()];
    footer.extend(Year::ALL.iter().map(|&y| table.footer[y].to_string()));
    footer.extend(Year::ALL.iter().map(|&y| {
        if table.totals[y].is_empty() {
            "N/A".to_string()
        } else {
            format_count(table.totals[y].total_oy)
        }
    }));
    if options.include_combined {
        footer.push(if table.rows.is_empty() {
            "N/A".to_string()
        } else {
            format_count(table.combined_oy)
        });
    }
    if options.include_change {
        footer.push(format_change(table.change));
    }
    section.push_str(&format!("| {} |\n\n", footer.join(" | ")));

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by oyatlas*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Export the breakdown table (rows plus a Total row) as CSV.
pub fn generate_csv_report(table: &TableView, options: &ReportOptions) -> Result<String> {
    let headers = table_headers(table.metric, options);

    let capacity = table.rows.len() + 1;
    let mut race = Vec::with_capacity(capacity);
    let mut gender = Vec::with_capacity(capacity);
    let mut values: [Vec<String>; 2] = Default::default();
    let mut oy: [Vec<Option<u64>>; 2] = Default::default();
    let mut combined = Vec::with_capacity(capacity);
    let mut change = Vec::with_capacity(capacity);

    for row in &table.rows {
        race.push(row.race_ethnicity.clone());
        gender.push(Some(row.gender.clone()));
        for (i, &year) in Year::ALL.iter().enumerate() {
            values[i].push(row.value(table.metric)[year].to_fixed());
            oy[i].push(Some(row.opportunity_youth[year]));
        }
        combined.push(Some(row.combined_oy));
        change.push(row.change);
    }

    race.push("Total".to_string());
    gender.push(None);
    for (i, &year) in Year::ALL.iter().enumerate() {
        values[i].push(table.footer[year].to_fixed());
        let totals = &table.totals[year];
        oy[i].push((!totals.is_empty()).then_some(totals.total_oy));
    }
    combined.push((!table.rows.is_empty()).then_some(table.combined_oy));
    change.push(table.change);

    let [values_2022, values_2023] = values;
    let [oy_2022, oy_2023] = oy;

    let mut columns: Vec<Column> = vec![
        Series::new(headers[0].as_str().into(), race).into(),
        Series::new(headers[1].as_str().into(), gender).into(),
        Series::new(headers[2].as_str().into(), values_2022).into(),
        Series::new(headers[3].as_str().into(), values_2023).into(),
        Series::new(headers[4].as_str().into(), oy_2022).into(),
        Series::new(headers[5].as_str().into(), oy_2023).into(),
    ];
    let mut next = 6;
    if options.include_combined {
        columns.push(Series::new(headers[next].as_str().into(), combined).into());
        next += 1;
    }
    if options.include_change {
        columns.push(Series::new(headers[next].as_str().into(), change).into());
    }

    let mut df = DataFrame::new(columns).context("[report::csv] Failed to build table")?;

    let mut buffer = Vec::new();
    CsvWriter::new(&mut buffer)
        .finish(&mut df)
        .context("[report::csv] Failed to write CSV")?;
    String::from_utf8(buffer).context("[report::csv] CSV output is not valid UTF-8")
}

/// Generate the metro index as a Markdown table.
pub fn generate_metro_index(metros: &[MetroSummary], year: Year) -> String {
    let mut output = String::new();

    output.push_str(&format!("## Metro Areas ({})\n\n", year));
    output.push_str("| GEOID | Name | Youth Population | Opportunity Youth | OY % | Detail |\n");
    output.push_str("|:---|:---|---:|---:|---:|:---:|\n");

    for metro in metros {
        output.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            escape_cell(&metro.geoid),
            escape_cell(&metro.name),
            format_count(metro.youth_population),
            format_count(metro.opportunity_youth),
            metro.percent,
            if metro.has_detail { "yes" } else { "no" }
        ));
    }
    output.push_str(&format!("\nTotal: {} metro areas\n", metros.len()));

    output
}

/// List the filter values available in the dataset.
pub fn generate_filter_options(options: &FilterOptions) -> String {
    format!(
        "Genders: all, {}\nRace/Ethnicity: all, {}\n",
        options.genders.join(", "),
        options.races.join(", ")
    )
}

/// Escape a value for use inside a Markdown table cell.
fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|")
}

/// Format a count with thousands separators.
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    out
}

/// Format a percentage-point change with an arrow glyph.
pub fn format_change(change: Option<f64>) -> String {
    match change {
        Some(v) if v > 0.0 => format!("▲ {}", Percent::from_value(v)),
        Some(v) if v < 0.0 => format!("▼ {}", Percent::from_value(v.abs())),
        Some(_) => Percent::from_value(0.0).to_string(),
        None => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Filter, PanelSource, PerYear, Selection, TableRow, Totals, ViewState,
    };
    use chrono::Utc;

    fn create_test_table(metric: Metric) -> TableView {
        let row = TableRow {
            race_ethnicity: "Black".to_string(),
            gender: "Female".to_string(),
            youth_population: PerYear::new(12_000, 12_500),
            opportunity_youth: PerYear::new(1_800, 1_500),
            rate: PerYear::new(Percent::from_value(15.0), Percent::from_value(12.0)),
            share: PerYear::new(Percent::from_value(100.0), Percent::from_value(100.0)),
            combined_oy: 3_300,
            change: Some(-3.0),
        };
        let totals = PerYear::new(
            Totals {
                total_oy: 1_800,
                total_pop: 12_000,
                percent: Percent::from_value(15.0),
                row_count: 1,
            },
            Totals {
                total_oy: 1_500,
                total_pop: 12_500,
                percent: Percent::from_value(12.0),
                row_count: 1,
            },
        );

        TableView {
            selection: Selection::Metro("26420".to_string()),
            metric,
            rows: vec![row],
            totals,
            footer: PerYear::new(Percent::from_value(15.0), Percent::from_value(12.0)),
            combined_oy: 3_300,
            change: Some(-3.0),
            has_data: true,
        }
    }

    fn empty_table(has_data: bool) -> TableView {
        TableView {
            selection: Selection::National,
            metric: Metric::Rate,
            rows: vec![],
            totals: PerYear::default(),
            footer: PerYear::default(),
            combined_oy: 0,
            change: None,
            has_data,
        }
    }

    fn create_test_report() -> Report {
        Report {
            metadata: ReportMetadata {
                geojson_source: "fixtures/metro_areas_oy.geojson".to_string(),
                detail_source: "fixtures/metro_detailed_data.json".to_string(),
                generated_at: Utc::now(),
                view: ViewState {
                    selection: Selection::Metro("26420".to_string()),
                    gender: Filter::Only("Female".to_string()),
                    ..ViewState::default()
                },
                metros_loaded: 3,
            },
            panel: InfoPanel {
                title: "Houston-The Woodlands-Sugar Land, TX".to_string(),
                year: Year::Y2023,
                youth_population: 1_000_000,
                opportunity_youth: 104_500,
                percent: Percent::from_value(10.5),
                source: PanelSource::Feature,
            },
            table: create_test_table(Metric::Rate),
        }
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }

    #[test]
    fn test_format_change() {
        assert_eq!(format_change(Some(1.2)), "▲ 1.2%");
        assert_eq!(format_change(Some(-0.5)), "▼ 0.5%");
        assert_eq!(format_change(Some(0.0)), "0.0%");
        assert_eq!(format_change(None), "N/A");
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report, &ReportOptions::default());

        assert!(markdown.contains("# Opportunity Youth Report"));
        assert!(markdown.contains("## Houston-The Woodlands-Sugar Land, TX"));
        assert!(markdown.contains("**Total Opportunity Youth:** 104,500"));
        assert!(markdown.contains("| Black | Female | 15.0% | 12.0% | 1,800 | 1,500 | 3,300 | ▼ 3.0% |"));
        assert!(markdown.contains("| **Total** |  | 15.0% | 12.0% | 1,800 | 1,500 | 3,300 | ▼ 3.0% |"));
        assert!(markdown.contains("- **Gender:** Female"));
    }

    #[test]
    fn test_optional_columns() {
        let table = create_test_table(Metric::Rate);
        let options = ReportOptions {
            include_change: false,
            include_combined: false,
        };
        let section = generate_table_section(&table, &options);

        assert!(!section.contains("Change"));
        assert!(!section.contains("OY 2022+2023"));
        assert!(section.contains("| Black | Female | 15.0% | 12.0% | 1,800 | 1,500 |\n"));
    }

    #[test]
    fn test_share_headers() {
        let section = generate_table_section(&create_test_table(Metric::Share), &ReportOptions::default());
        assert!(section.contains("Share of OY 2022"));
        assert!(section.contains("| Black | Female | 100.0% | 100.0% |"));
    }

    #[test]
    fn test_empty_selection_renders_no_data() {
        let section = generate_table_section(&empty_table(false), &ReportOptions::default());
        assert!(section.contains(NO_DATA_MESSAGE));
        assert!(section.contains("| **Total** |  | N/A | N/A | N/A | N/A | N/A | N/A |"));
    }

    #[test]
    fn test_filtered_out_renders_no_match() {
        let section = generate_table_section(&empty_table(true), &ReportOptions::default());
        assert!(section.contains(NO_MATCH_MESSAGE));
        assert!(!section.contains(NO_DATA_MESSAGE));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["metadata"]["view"]["year"], 2023);
        assert_eq!(value["metadata"]["view"]["selection"], "26420");
        assert_eq!(value["table"]["rows"][0]["rate"]["2023"], "12.0");
        assert_eq!(value["table"]["totals"]["2022"]["total_oy"], 1800);
        assert_eq!(value["panel"]["percent"], "10.5");
    }

    #[test]
    fn test_generate_csv_report() {
        let csv = generate_csv_report(&create_test_table(Metric::Rate), &ReportOptions::default()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Race/Ethnicity,Gender,OY % 2022,OY % 2023,OY 2022,OY 2023"));
        assert!(lines[1].starts_with("Black,Female,15.0,12.0,1800,1500,3300"));
        assert!(lines[2].starts_with("Total,,15.0,12.0,1800,1500,3300"));
    }

    #[test]
    fn test_csv_empty_table_has_total_row() {
        let options = ReportOptions {
            include_change: false,
            include_combined: false,
        };
        let csv = generate_csv_report(&empty_table(false), &options).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "Total,,N/A,N/A,,");
    }

    #[test]
    fn test_write_report_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");

        write_report(&create_test_report(), OutputFormat::Markdown, &ReportOptions::default(), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("## Demographic Breakdown"));
    }

    #[test]
    fn test_generate_metro_index() {
        let metros = vec![MetroSummary {
            geoid: "12420".to_string(),
            name: "Austin-Round Rock-San Marcos, TX".to_string(),
            youth_population: 318_000,
            opportunity_youth: 0,
            percent: Percent::NOT_AVAILABLE,
            has_detail: true,
        }];

        let index = generate_metro_index(&metros, Year::Y2023);
        assert!(index.contains("| 12420 | Austin-Round Rock-San Marcos, TX | 318,000 | 0 | N/A | yes |"));
        assert!(index.contains("Total: 1 metro areas"));
    }

    #[test]
    fn test_pipes_are_escaped_in_table_cells() {
        let mut table = create_test_table(Metric::Rate);
        table.rows[0].race_ethnicity = "Two|More".to_string();
        let section = generate_table_section(&table, &ReportOptions::default());
        assert!(section.contains(r"| Two\|More | Female | 15.0% |"));

        let metros = vec![MetroSummary {
            geoid: "99999".to_string(),
            name: "Alpha|Beta, XX".to_string(),
            youth_population: 10,
            opportunity_youth: 1,
            percent: Percent::from_value(10.0),
            has_detail: false,
        }];
        let index = generate_metro_index(&metros, Year::Y2022);
        assert!(index.contains(r"| 99999 | Alpha\|Beta, XX | 10 | 1 | 10.0% | no |"));
    }
}
