//! Metric Aggregator
//!
//! Stateless statistics over a claim subset. Nothing here mutates the subset
//! it is given, and every operation is deterministic for a fixed reference
//! time. Operations over an optional column answer `NotAvailable` when the
//! dataset lacks it.

use crate::columns::{float_values, floor_days, timestamp_values};
use crate::error::Result;
use crate::schema::{ClaimField, ValueField};
use crate::subset::ClaimSubset;
use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Lower edges of the age bands; the last band has no upper edge.
pub const AGE_BAND_EDGES: [f64; 15] = [
    0.0, 20.0, 25.0, 30.0, 35.0, 40.0, 45.0, 50.0, 55.0, 60.0, 65.0, 70.0, 75.0, 80.0, 85.0,
];

pub const AGE_BAND_LABELS: [&str; 15] = [
    "0-20", "20-25", "25-30", "30-35", "35-40", "40-45", "45-50", "50-55", "55-60", "60-65",
    "65-70", "70-75", "75-80", "80-85", "85+",
];

/// Result of an operation that depends on an optional column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Availability<T> {
    Available(T),
    NotAvailable,
}

impl<T> Availability<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available(_))
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Availability::Available(v) => Some(v),
            Availability::NotAvailable => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Availability<U> {
        match self {
            Availability::Available(v) => Availability::Available(f(v)),
            Availability::NotAvailable => Availability::NotAvailable,
        }
    }
}

/// Sum and mean over the non-missing values of a monetary column.
///
/// An empty subset (or one with only missing values) reports `sum = 0.0`
/// and `mean = None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonetarySummary {
    pub count: usize,
    pub sum: f64,
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeBandCount {
    pub band: String,
    pub lower: f64,
    pub upper: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthCount {
    pub month: u32,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiveNumberSummary {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// What a "days since" count is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePoint {
    /// A fixed instant shared by every row, normally the time of the run.
    Instant(NaiveDateTime),
    /// Another date column of the same row.
    Column(ClaimField),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryOrder {
    /// Descending count, ties by first occurrence.
    ByCount,
    /// Ascending label.
    ByLabel,
    /// Order in which each value first appears in the subset.
    FirstSeen,
}

fn day_delta(from: Option<NaiveDateTime>, to: Option<NaiveDateTime>) -> Option<i64> {
    match (from, to) {
        (Some(f), Some(t)) => Some(floor_days(f, t)),
        _ => None,
    }
}

/// Per-row whole days `to - from`, floored; missing when either date is missing.
pub fn turnaround_days(
    subset: &ClaimSubset,
    from: ClaimField,
    to: ClaimField,
) -> Result<Availability<Vec<Option<i64>>>> {
    if !subset.is_available(from) || !subset.is_available(to) {
        return Ok(Availability::NotAvailable);
    }
    let from_dates = timestamp_values(subset.frame(), from)?;
    let to_dates = timestamp_values(subset.frame(), to)?;

    Ok(Availability::Available(
        from_dates
            .into_iter()
            .zip(to_dates)
            .map(|(f, t)| day_delta(f, t))
            .collect(),
    ))
}

/// Per-row day count from `field` to the reference point.
pub fn days_since(
    subset: &ClaimSubset,
    field: ClaimField,
    reference: ReferencePoint,
) -> Result<Availability<Vec<Option<i64>>>> {
    match reference {
        ReferencePoint::Instant(at) => {
            if !subset.is_available(field) {
                return Ok(Availability::NotAvailable);
            }
            Ok(Availability::Available(
                timestamp_values(subset.frame(), field)?
                    .into_iter()
                    .map(|d| day_delta(d, Some(at)))
                    .collect(),
            ))
        }
        ReferencePoint::Column(other) => turnaround_days(subset, field, other),
    }
}

/// Mean of the non-missing day counts.
pub fn mean_days(values: &[Option<i64>]) -> Option<f64> {
    let present: Vec<i64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    Some(present.iter().sum::<i64>() as f64 / present.len() as f64)
}

pub fn monetary_summary(subset: &ClaimSubset, value: ValueField) -> Result<Availability<MonetarySummary>> {
    let field = value.field();
    if !subset.is_available(field) {
        return Ok(Availability::NotAvailable);
    }
    let values: Vec<f64> = float_values(subset.frame(), field)?.into_iter().flatten().collect();
    let sum: f64 = values.iter().sum();
    let mean = if values.is_empty() {
        None
    } else {
        Some(sum / values.len() as f64)
    };

    Ok(Availability::Available(MonetarySummary {
        count: values.len(),
        sum,
        mean,
    }))
}

/// Frequency of each non-missing value of a categorical column.
pub fn category_counts(
    subset: &ClaimSubset,
    field: ClaimField,
    order: CategoryOrder,
) -> Result<Availability<Vec<CategoryCount>>> {
    if !subset.is_available(field) {
        return Ok(Availability::NotAvailable);
    }

    let name = field.canonical_name();
    let grouped = subset
        .frame()
        .clone()
        .lazy()
        .filter(col(name).is_not_null())
        .group_by_stable([col(name).cast(DataType::String)])
        .agg([len().alias("count")])
        .collect()?;

    let labels = grouped.column(name)?;
    let counts = grouped.column("count")?.cast(&DataType::UInt32)?;
    let mut counts: Vec<CategoryCount> = labels
        .str()?
        .into_iter()
        .zip(counts.u32()?.into_iter())
        .filter_map(|(label, count)| {
            Some(CategoryCount {
                category: label?.to_string(),
                count: count? as usize,
            })
        })
        .collect();

    // Groups arrive in first-occurrence order; sort_by is stable.
    match order {
        CategoryOrder::ByCount => counts.sort_by(|a, b| b.count.cmp(&a.count)),
        CategoryOrder::ByLabel => counts.sort_by(|a, b| a.category.cmp(&b.category)),
        CategoryOrder::FirstSeen => {}
    }
    Ok(Availability::Available(counts))
}

/// The `n` most frequent values, descending, ties broken by first occurrence.
pub fn top_n_categories(
    subset: &ClaimSubset,
    field: ClaimField,
    n: usize,
) -> Result<Availability<Vec<CategoryCount>>> {
    Ok(category_counts(subset, field, CategoryOrder::ByCount)?.map(|mut counts| {
        counts.truncate(n);
        counts
    }))
}

/// Index of the band an age falls in; `None` for negative or non-finite ages.
pub fn age_band_index(age: f64) -> Option<usize> {
    if !age.is_finite() || age < 0.0 {
        return None;
    }
    AGE_BAND_EDGES.iter().rposition(|lower| age >= *lower)
}

/// Claim counts per age band, in band order, zero-count bands included.
pub fn age_bands(subset: &ClaimSubset) -> Result<Availability<Vec<AgeBandCount>>> {
    if !subset.is_available(ClaimField::Age) {
        return Ok(Availability::NotAvailable);
    }

    let mut counts = [0usize; AGE_BAND_EDGES.len()];
    for age in float_values(subset.frame(), ClaimField::Age)?.into_iter().flatten() {
        if let Some(i) = age_band_index(age) {
            counts[i] += 1;
        }
    }

    Ok(Availability::Available(
        counts
            .iter()
            .enumerate()
            .map(|(i, count)| AgeBandCount {
                band: AGE_BAND_LABELS[i].to_string(),
                lower: AGE_BAND_EDGES[i],
                upper: AGE_BAND_EDGES.get(i + 1).copied(),
                count: *count,
            })
            .collect(),
    ))
}

pub fn mean_age(subset: &ClaimSubset) -> Result<Availability<Option<f64>>> {
    if !subset.is_available(ClaimField::Age) {
        return Ok(Availability::NotAvailable);
    }
    let ages: Vec<f64> = float_values(subset.frame(), ClaimField::Age)?.into_iter().flatten().collect();
    Ok(Availability::Available(if ages.is_empty() {
        None
    } else {
        Some(ages.iter().sum::<f64>() / ages.len() as f64)
    }))
}

/// Claims per incident month (1-12), ascending; months without claims are omitted.
pub fn monthly_counts(subset: &ClaimSubset) -> Result<Vec<MonthCount>> {
    let date_col = ClaimField::IncidentDate.canonical_name();
    let grouped = subset
        .frame()
        .clone()
        .lazy()
        .filter(col(date_col).is_not_null())
        .group_by([col(date_col).dt().month().alias("month")])
        .agg([len().alias("count")])
        .collect()?;

    let months = grouped.column("month")?.cast(&DataType::Int32)?;
    let counts = grouped.column("count")?.cast(&DataType::UInt32)?;

    // Collect first, then order in Rust; group_by output order is unspecified.
    let mut result: Vec<MonthCount> = months
        .i32()?
        .into_iter()
        .zip(counts.u32()?.into_iter())
        .filter_map(|(m, c)| match (m, c) {
            (Some(m), Some(c)) if m >= 1 => Some(MonthCount {
                month: m as u32,
                count: c as usize,
            }),
            _ => None,
        })
        .collect();
    result.sort_by_key(|m| m.month);
    Ok(result)
}

/// Equal-width histogram over `[min, max]`; the last bin is closed on the right.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return Vec::new();
    }

    let mut min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let mut max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        min -= 0.5;
        max += 0.5;
    }
    let width = (max - min) / bins as f64;

    let mut counts = vec![0usize; bins];
    for v in finite {
        let i = (((v - min) / width).floor() as usize).min(bins - 1);
        counts[i] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: min + i as f64 * width,
            upper: if i + 1 == bins { max } else { min + (i + 1) as f64 * width },
            count,
        })
        .collect()
}

pub fn value_histogram(
    subset: &ClaimSubset,
    value: ValueField,
    bins: usize,
) -> Result<Availability<Vec<HistogramBin>>> {
    let field = value.field();
    if !subset.is_available(field) {
        return Ok(Availability::NotAvailable);
    }
    let values: Vec<f64> = float_values(subset.frame(), field)?.into_iter().flatten().collect();
    Ok(Availability::Available(histogram(&values, bins)))
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Min, quartiles and max with linear interpolation; `None` when no values.
pub fn five_number(values: &[f64]) -> Option<FiveNumberSummary> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    Some(FiveNumberSummary {
        min: sorted[0],
        q1: quantile(&sorted, 0.25),
        median: quantile(&sorted, 0.5),
        q3: quantile(&sorted, 0.75),
        max: sorted[sorted.len() - 1],
    })
}

pub fn five_number_summary(
    subset: &ClaimSubset,
    value: ValueField,
) -> Result<Availability<Option<FiveNumberSummary>>> {
    let field = value.field();
    if !subset.is_available(field) {
        return Ok(Availability::NotAvailable);
    }
    let values: Vec<f64> = float_values(subset.frame(), field)?.into_iter().flatten().collect();
    Ok(Availability::Available(five_number(&values)))
}
