//! National rollup and breakdown aggregation.
//!
//! This module provides the pure functions behind every number the
//! dashboard shows: the national rollup by demographic key, row
//! selection and filtering, footer totals, and share/change metrics.

use crate::models::{
    round1, DemographicRow, DetailDataset, Filter, FilterOptions, NationalRollup, Percent,
    Selection, Totals, Year,
};
use std::collections::BTreeSet;

/// Roll every metro's breakdown rows up into national totals per key.
///
/// Counts are summed first and percentages derived from the sums, so
/// large metros carry their real weight in the national rate.
pub fn build_national_rollup(detail: &DetailDataset) -> NationalRollup {
    let mut rollup = NationalRollup::default();

    for rows in detail.values() {
        for row in rows {
            let bucket = rollup.bucket_mut(row.key());
            for year in Year::ALL {
                bucket.youth_population[year] += row.youth_population[year];
                bucket.total_opportunity_youth[year] += row.total_opportunity_youth[year];
            }
        }
    }

    rollup
}

/// Rows behind a selection: the metro's own rows or the national rollup.
///
/// An unknown metro yields an empty slice.
pub fn rows_for<'a>(
    selection: &Selection,
    detail: &'a DetailDataset,
    rollup: &'a NationalRollup,
) -> &'a [DemographicRow] {
    match selection {
        Selection::National => rollup.rows(),
        Selection::Metro(id) => detail.get(id).map(Vec::as_slice).unwrap_or(&[]),
    }
}

/// Keep the rows matching both filters, preserving order.
pub fn apply_filters(rows: &[DemographicRow], gender: &Filter, race: &Filter) -> Vec<DemographicRow> {
    rows.iter()
        .filter(|row| gender.matches(&row.gender) && race.matches(&row.race_ethnicity))
        .cloned()
        .collect()
}

/// Sum OY and population over `rows` for one year.
///
/// Both the info panel and every table footer go through this function.
pub fn compute_totals(rows: &[DemographicRow], year: Year) -> Totals {
    let total_oy: u64 = rows.iter().map(|r| r.total_opportunity_youth[year]).sum();
    let total_pop: u64 = rows.iter().map(|r| r.youth_population[year]).sum();

    Totals {
        total_oy,
        total_pop,
        percent: Percent::from_counts(total_oy, total_pop),
        row_count: rows.len(),
    }
}

/// A row's share of the total OY population.
pub fn compute_share(row_oy: u64, total_oy: u64) -> Percent {
    Percent::from_counts(row_oy, total_oy)
}

/// Percentage-point change between two years.
pub fn percent_change(from: Percent, to: Percent) -> Option<f64> {
    match (from.value(), to.value()) {
        (Some(a), Some(b)) => Some(round1(b - a)),
        _ => None,
    }
}

/// Distinct genders and race/ethnicities present in `rows`, sorted.
pub fn filter_options(rows: &[DemographicRow]) -> FilterOptions {
    let genders: BTreeSet<&str> = rows.iter().map(|r| r.gender.as_str()).collect();
    let races: BTreeSet<&str> = rows.iter().map(|r| r.race_ethnicity.as_str()).collect();

    FilterOptions {
        genders: genders.into_iter().map(String::from).collect(),
        races: races.into_iter().map(String::from).collect(),
    }
}
