//! Data models for the Opportunity Youth dashboard.
//!
//! This module contains the core data structures shared by the loader,
//! the aggregation engine and the report generator: metro features,
//! demographic breakdown rows, the national rollup, and the view state
//! that drives every query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

/// Survey year covered by the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Year {
    Y2022,
    #[default]
    Y2023,
}

impl Year {
    /// Every year in chronological order.
    pub const ALL: [Year; 2] = [Year::Y2022, Year::Y2023];

    pub fn as_u16(self) -> u16 {
        match self {
            Year::Y2022 => 2022,
            Year::Y2023 => 2023,
        }
    }
}

impl From<Year> for u16 {
    fn from(year: Year) -> Self {
        year.as_u16()
    }
}

impl TryFrom<u16> for Year {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            2022 => Ok(Year::Y2022),
            2023 => Ok(Year::Y2023),
            other => Err(format!("Unsupported year {} (expected 2022 or 2023)", other)),
        }
    }
}

impl FromStr for Year {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u16 = s
            .trim()
            .parse()
            .map_err(|_| format!("Invalid year '{}' (expected 2022 or 2023)", s))?;
        Year::try_from(value)
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// A value tracked separately for each survey year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PerYear<T> {
    #[serde(rename = "2022")]
    pub y2022: T,
    #[serde(rename = "2023")]
    pub y2023: T,
}

impl<T> PerYear<T> {
    pub fn new(y2022: T, y2023: T) -> Self {
        Self { y2022, y2023 }
    }

    /// Build a record by evaluating `f` once per year.
    pub fn from_fn(mut f: impl FnMut(Year) -> T) -> Self {
        Self {
            y2022: f(Year::Y2022),
            y2023: f(Year::Y2023),
        }
    }

    pub fn get(&self, year: Year) -> &T {
        match year {
            Year::Y2022 => &self.y2022,
            Year::Y2023 => &self.y2023,
        }
    }
}

impl<T> Index<Year> for PerYear<T> {
    type Output = T;

    fn index(&self, year: Year) -> &T {
        self.get(year)
    }
}

impl<T> IndexMut<Year> for PerYear<T> {
    fn index_mut(&mut self, year: Year) -> &mut T {
        match year {
            Year::Y2022 => &mut self.y2022,
            Year::Y2023 => &mut self.y2023,
        }
    }
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// A percentage rounded to one decimal, or "not available".
///
/// Every percentage the dashboard shows goes through this type, so a zero
/// denominator can never leak a NaN or infinity into a total or a table.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Percent(Option<f64>);

impl Percent {
    pub const NOT_AVAILABLE: Percent = Percent(None);

    /// `numerator / denominator * 100`, not available when the denominator is zero.
    pub fn from_ratio(numerator: f64, denominator: f64) -> Self {
        if denominator > 0.0 && numerator.is_finite() && denominator.is_finite() {
            Percent(Some(round1(numerator / denominator * 100.0)))
        } else {
            Self::NOT_AVAILABLE
        }
    }

    /// Same as [`Percent::from_ratio`] for integer counts.
    pub fn from_counts(numerator: u64, denominator: u64) -> Self {
        Self::from_ratio(numerator as f64, denominator as f64)
    }

    /// Wrap an already computed percentage.
    pub fn from_value(value: f64) -> Self {
        if value.is_finite() {
            Percent(Some(round1(value)))
        } else {
            Self::NOT_AVAILABLE
        }
    }

    pub fn value(self) -> Option<f64> {
        self.0
    }

    pub fn is_available(self) -> bool {
        self.0.is_some()
    }

    /// Fixed one-decimal rendering without a percent sign ("20.0" or "N/A").
    pub fn to_fixed(self) -> String {
        match self.0 {
            Some(v) => format!("{:.1}", v),
            None => "N/A".to_string(),
        }
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{:.1}%", v),
            None => write!(f, "N/A"),
        }
    }
}

impl Serialize for Percent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_fixed())
    }
}

/// Deserialize a count that may be missing, null, fractional or negative.
///
/// Missing and null become zero; fractional values are rounded.
fn count_or_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value: Option<f64> = Option::deserialize(deserializer)?;
    Ok(value
        .filter(|n| n.is_finite() && *n > 0.0)
        .map(|n| n.round() as u64)
        .unwrap_or(0))
}

/// Deserialize an optional percentage property.
fn percent_or_na<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Percent, D::Error> {
    let value: Option<f64> = Option::deserialize(deserializer)?;
    Ok(value.map(Percent::from_value).unwrap_or_default())
}

/// Deserialize an identifier that some exports write as a number.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// Properties bag of one GeoJSON metro feature, as written on disk.
#[derive(Debug, Deserialize)]
struct RawMetroProperties {
    #[serde(rename = "GEOID", deserialize_with = "string_or_number")]
    geoid: String,
    #[serde(rename = "NAME", default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "count_or_zero")]
    total_youth_pop_2022: u64,
    #[serde(default, deserialize_with = "count_or_zero")]
    total_youth_pop_2023: u64,
    #[serde(default, deserialize_with = "count_or_zero")]
    total_oy_2022: u64,
    #[serde(default, deserialize_with = "count_or_zero")]
    total_oy_2023: u64,
    #[serde(default, deserialize_with = "percent_or_na")]
    oy_percentage_2022: Percent,
    #[serde(default, deserialize_with = "percent_or_na")]
    oy_percentage_2023: Percent,
}

/// One U.S. metro area with its per-year summary metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawMetroProperties")]
pub struct MetroFeature {
    pub geoid: String,
    pub name: String,
    pub total_youth_population: PerYear<u64>,
    pub total_opportunity_youth: PerYear<u64>,
    pub oy_percentage: PerYear<Percent>,
}

impl From<RawMetroProperties> for MetroFeature {
    fn from(raw: RawMetroProperties) -> Self {
        let name = raw.name.unwrap_or_else(|| raw.geoid.clone());
        Self {
            geoid: raw.geoid,
            name,
            total_youth_population: PerYear::new(raw.total_youth_pop_2022, raw.total_youth_pop_2023),
            total_opportunity_youth: PerYear::new(raw.total_oy_2022, raw.total_oy_2023),
            oy_percentage: PerYear::new(raw.oy_percentage_2022, raw.oy_percentage_2023),
        }
    }
}

/// Demographic breakdown row as written in the detail document.
///
/// Precomputed `opp_youth_percent_<year>` fields are ignored; the percentage
/// is always derived from the counts.
#[derive(Debug, Deserialize)]
struct RawDemographicRow {
    #[serde(default)]
    race_ethnicity: String,
    #[serde(default)]
    gender: String,
    #[serde(default, deserialize_with = "count_or_zero")]
    youth_population_2022: u64,
    #[serde(default, deserialize_with = "count_or_zero")]
    youth_population_2023: u64,
    #[serde(default, deserialize_with = "count_or_zero")]
    total_opportunity_youth_2022: u64,
    #[serde(default, deserialize_with = "count_or_zero")]
    total_opportunity_youth_2023: u64,
}

/// Identity of a demographic group: race/ethnicity crossed with gender.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DemographicKey {
    pub race_ethnicity: String,
    pub gender: String,
}

impl DemographicKey {
    pub fn new(race_ethnicity: impl Into<String>, gender: impl Into<String>) -> Self {
        Self {
            race_ethnicity: race_ethnicity.into(),
            gender: gender.into(),
        }
    }
}

/// One (metro, race/ethnicity, gender) breakdown record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDemographicRow")]
pub struct DemographicRow {
    pub race_ethnicity: String,
    pub gender: String,
    pub youth_population: PerYear<u64>,
    pub total_opportunity_youth: PerYear<u64>,
}

impl From<RawDemographicRow> for DemographicRow {
    fn from(raw: RawDemographicRow) -> Self {
        Self {
            race_ethnicity: raw.race_ethnicity,
            gender: raw.gender,
            youth_population: PerYear::new(raw.youth_population_2022, raw.youth_population_2023),
            total_opportunity_youth: PerYear::new(
                raw.total_opportunity_youth_2022,
                raw.total_opportunity_youth_2023,
            ),
        }
    }
}

impl DemographicRow {
    /// Creates an empty row for a demographic key.
    pub fn zeroed(key: &DemographicKey) -> Self {
        Self {
            race_ethnicity: key.race_ethnicity.clone(),
            gender: key.gender.clone(),
            youth_population: PerYear::default(),
            total_opportunity_youth: PerYear::default(),
        }
    }

    pub fn key(&self) -> DemographicKey {
        DemographicKey::new(self.race_ethnicity.clone(), self.gender.clone())
    }

    /// OY rate within this group's own population.
    pub fn opp_youth_percent(&self, year: Year) -> Percent {
        Percent::from_counts(self.total_opportunity_youth[year], self.youth_population[year])
    }

    /// Opportunity youth summed across both years.
    pub fn combined_oy(&self) -> u64 {
        Year::ALL
            .iter()
            .map(|&year| self.total_opportunity_youth[year])
            .sum()
    }
}

/// Metro identifier mapped to its ordered breakdown rows.
///
/// A `BTreeMap` keeps metro iteration in ascending GEOID order.
pub type DetailDataset = BTreeMap<String, Vec<DemographicRow>>;

/// Everything the loader produces.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub features: Vec<MetroFeature>,
    pub detail: DetailDataset,
}

/// Per-key national aggregation of the detail dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NationalRollup {
    rows: Vec<DemographicRow>,
    index: HashMap<DemographicKey, usize>,
}

impl NationalRollup {
    /// Mutable bucket for a key, created zeroed on first encounter.
    pub(crate) fn bucket_mut(&mut self, key: DemographicKey) -> &mut DemographicRow {
        let next = self.rows.len();
        let slot = *self.index.entry(key.clone()).or_insert(next);
        if slot == next {
            self.rows.push(DemographicRow::zeroed(&key));
        }
        &mut self.rows[slot]
    }

    #[allow(dead_code)] // Keyed lookup for callers holding a DemographicKey
    pub fn get(&self, key: &DemographicKey) -> Option<&DemographicRow> {
        self.index.get(key).map(|&i| &self.rows[i])
    }

    /// Aggregated rows in first-encounter order.
    pub fn rows(&self) -> &[DemographicRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[allow(dead_code)] // Pairs with len()
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What the table and info panel currently display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    National,
    Metro(String),
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::National => write!(f, "national"),
            Selection::Metro(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for Selection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("national") {
            Ok(Selection::National)
        } else {
            Ok(Selection::Metro(s.to_string()))
        }
    }
}

impl Serialize for Selection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A gender or race/ethnicity filter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    All,
    Only(String),
}

impl Filter {
    /// Exact match, with `All` matching everything.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Filter::All => true,
            Filter::Only(expected) => expected == value,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => write!(f, "all"),
            Filter::Only(value) => write!(f, "{}", value),
        }
    }
}

impl FromStr for Filter {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            Ok(Filter::All)
        } else {
            Ok(Filter::Only(s.to_string()))
        }
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Which percentage the breakdown table shows.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// OY rate within each group's own population
    #[default]
    Rate,
    /// Each group's share of the total OY population
    Share,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Rate => write!(f, "rate"),
            Metric::Share => write!(f, "share"),
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rate" => Ok(Metric::Rate),
            "share" => Ok(Metric::Share),
            other => Err(format!("Unknown metric '{}' (expected rate or share)", other)),
        }
    }
}

impl Metric {
    /// Column heading used by the table renderers.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Rate => "OY %",
            Metric::Share => "Share of OY",
        }
    }
}

/// The explicit query triple (plus metric) behind every rendered view.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ViewState {
    pub selection: Selection,
    pub gender: Filter,
    pub race: Filter,
    pub year: Year,
    pub metric: Metric,
}

/// Footer totals over a set of rows for one year.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Totals {
    pub total_oy: u64,
    pub total_pop: u64,
    pub percent: Percent,
    pub row_count: usize,
}

impl Totals {
    /// True when no rows contributed (as opposed to rows summing to zero).
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}

/// One rendered line of the breakdown table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub race_ethnicity: String,
    pub gender: String,
    pub youth_population: PerYear<u64>,
    pub opportunity_youth: PerYear<u64>,
    pub rate: PerYear<Percent>,
    pub share: PerYear<Percent>,
    pub combined_oy: u64,
    /// Percentage-point change 2022 to 2023 of the displayed metric.
    pub change: Option<f64>,
}

impl TableRow {
    pub fn value(&self, metric: Metric) -> &PerYear<Percent> {
        match metric {
            Metric::Rate => &self.rate,
            Metric::Share => &self.share,
        }
    }
}

/// Result of a table query: rows plus footer built from the same rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    pub selection: Selection,
    pub metric: Metric,
    pub rows: Vec<TableRow>,
    pub totals: PerYear<Totals>,
    pub footer: PerYear<Percent>,
    pub combined_oy: u64,
    pub change: Option<f64>,
    /// Whether the selected area has any detail rows before filtering.
    pub has_data: bool,
}

/// Where the info panel figures came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelSource {
    /// The metro's own GeoJSON summary properties.
    Feature,
    /// Totals computed from breakdown rows.
    Rows,
}

/// Summary figures for the info panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoPanel {
    pub title: String,
    pub year: Year,
    pub youth_population: u64,
    pub opportunity_youth: u64,
    pub percent: Percent,
    pub source: PanelSource,
}

/// One entry of the metro index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetroSummary {
    pub geoid: String,
    pub name: String,
    pub youth_population: u64,
    pub opportunity_youth: u64,
    pub percent: Percent,
    pub has_detail: bool,
}

/// Observed filter values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub genders: Vec<String>,
    pub races: Vec<String>,
}

/// Metadata about a generated report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub geojson_source: String,
    pub detail_source: String,
    pub generated_at: DateTime<Utc>,
    pub view: ViewState,
    pub metros_loaded: usize,
}

/// The complete rendered dashboard state.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub panel: InfoPanel,
    pub table: TableView,
}
