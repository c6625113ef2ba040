//! Query engine over a loaded dataset.
//!
//! The engine owns the immutable dataset and the national rollup built
//! from it once, and answers every view query from an explicit
//! [`ViewState`].

use super::aggregator::{
    apply_filters, build_national_rollup, compute_share, compute_totals, filter_options,
    percent_change, rows_for,
};
use crate::models::{
    Dataset, DetailDataset, FilterOptions, InfoPanel, Metric, MetroFeature, MetroSummary,
    NationalRollup, PanelSource, PerYear, Selection, TableRow, TableView, ViewState, Year,
};
use std::collections::HashMap;
use tracing::{debug, info};

/// Title used for the national view.
pub const NATIONAL_TITLE: &str = "United States";

pub struct Engine {
    features: Vec<MetroFeature>,
    feature_index: HashMap<String, usize>,
    detail: DetailDataset,
    rollup: NationalRollup,
}

impl Engine {
    /// Take ownership of a loaded dataset and build the national rollup.
    pub fn new(dataset: Dataset) -> Self {
        let Dataset { features, detail } = dataset;

        let feature_index = features
            .iter()
            .enumerate()
            .map(|(i, f)| (f.geoid.clone(), i))
            .collect();

        let rollup = build_national_rollup(&detail);
        info!(
            "Built national rollup: {} demographic groups from {} metros",
            rollup.len(),
            detail.len()
        );

        Self {
            features,
            feature_index,
            detail,
            rollup,
        }
    }

    pub fn feature(&self, geoid: &str) -> Option<&MetroFeature> {
        self.feature_index.get(geoid).map(|&i| &self.features[i])
    }

    pub fn metro_count(&self) -> usize {
        self.features.len()
    }

    /// Whether the detail dataset has rows for this metro.
    pub fn has_detail(&self, geoid: &str) -> bool {
        self.detail.get(geoid).is_some_and(|rows| !rows.is_empty())
    }

    /// Whether a selection names something the engine knows about.
    pub fn is_known(&self, selection: &Selection) -> bool {
        match selection {
            Selection::National => true,
            Selection::Metro(id) => self.feature(id).is_some() || self.detail.contains_key(id),
        }
    }

    /// Genders and race/ethnicities observed anywhere in the dataset.
    pub fn filter_options(&self) -> FilterOptions {
        filter_options(self.rollup.rows())
    }

    /// Breakdown table for the current view.
    ///
    /// Rows, footer and share denominators all come from the same filtered
    /// rows, so the footer always equals the sum of what is displayed.
    pub fn query(&self, state: &ViewState) -> TableView {
        let selected = rows_for(&state.selection, &self.detail, &self.rollup);
        let visible = apply_filters(selected, &state.gender, &state.race);
        debug!(
            "Query {} (gender={}, race={}): {} of {} rows",
            state.selection,
            state.gender,
            state.race,
            visible.len(),
            selected.len()
        );

        let totals = PerYear::from_fn(|year| compute_totals(&visible, year));

        let rows: Vec<TableRow> = visible
            .iter()
            .map(|row| {
                let rate = PerYear::from_fn(|year| row.opp_youth_percent(year));
                let share = PerYear::from_fn(|year| {
                    compute_share(row.total_opportunity_youth[year], totals[year].total_oy)
                });
                let shown = match state.metric {
                    Metric::Rate => &rate,
                    Metric::Share => &share,
                };
                let change = percent_change(shown[Year::Y2022], shown[Year::Y2023]);

                TableRow {
                    race_ethnicity: row.race_ethnicity.clone(),
                    gender: row.gender.clone(),
                    youth_population: row.youth_population,
                    opportunity_youth: row.total_opportunity_youth,
                    combined_oy: row.combined_oy(),
                    rate,
                    share,
                    change,
                }
            })
            .collect();

        let footer = PerYear::from_fn(|year| match state.metric {
            Metric::Rate => totals[year].percent,
            Metric::Share => compute_share(totals[year].total_oy, totals[year].total_oy),
        });

        TableView {
            selection: state.selection.clone(),
            metric: state.metric,
            change: percent_change(footer[Year::Y2022], footer[Year::Y2023]),
            combined_oy: Year::ALL.iter().map(|&y| totals[y].total_oy).sum(),
            has_data: !selected.is_empty(),
            rows,
            totals,
            footer,
        }
    }

    /// Info panel figures for the current selection and year.
    ///
    /// A metro uses its own summary properties; the national view (and a
    /// metro missing from the GeoJSON) is summed from unfiltered rows.
    pub fn summary(&self, state: &ViewState) -> InfoPanel {
        let year = state.year;

        if let Selection::Metro(id) = &state.selection {
            if let Some(feature) = self.feature(id) {
                return InfoPanel {
                    title: feature.name.clone(),
                    year,
                    youth_population: feature.total_youth_population[year],
                    opportunity_youth: feature.total_opportunity_youth[year],
                    percent: feature.oy_percentage[year],
                    source: PanelSource::Feature,
                };
            }
        }

        let totals = compute_totals(rows_for(&state.selection, &self.detail, &self.rollup), year);
        let title = match &state.selection {
            Selection::National => NATIONAL_TITLE.to_string(),
            Selection::Metro(id) => id.clone(),
        };

        InfoPanel {
            title,
            year,
            youth_population: totals.total_pop,
            opportunity_youth: totals.total_oy,
            percent: totals.percent,
            source: PanelSource::Rows,
        }
    }

    /// Every metro with its summary for `year`, sorted by name.
    pub fn metro_index(&self, year: Year) -> Vec<MetroSummary> {
        let mut index: Vec<MetroSummary> = self
            .features
            .iter()
            .map(|f| MetroSummary {
                geoid: f.geoid.clone(),
                name: f.name.clone(),
                youth_population: f.total_youth_population[year],
                opportunity_youth: f.total_opportunity_youth[year],
                percent: f.oy_percentage[year],
                has_detail: self.has_detail(&f.geoid),
            })
            .collect();

        index.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.geoid.cmp(&b.geoid)));
        index
    }
}
