//! Dashboard Pipeline
//!
//! One configurable run of Normalizer -> Classifier -> Filter -> Aggregator
//! for a dataset schema and a user selection. The output is plain data; the
//! presentation layer decides how to draw it.

use crate::aggregator::{
    age_bands, category_counts, days_since, five_number_summary, histogram, mean_age, mean_days,
    monetary_summary, monthly_counts, top_n_categories, turnaround_days, value_histogram,
    AgeBandCount, Availability, CategoryCount, CategoryOrder, FiveNumberSummary, HistogramBin,
    MonetarySummary, MonthCount, ReferencePoint,
};
use crate::classifier::ClaimClassifier;
use crate::error::{ClaimsError, Result};
use crate::filter::{filter, ProductSelection};
use crate::normalizer::{available_products, available_years, normalize, read_table, ClaimsTable};
use crate::schema::{ClaimField, DatasetSchema, DaysOpenReference, StatusCategory, ValueField};
use crate::subset::ClaimSubset;
use chrono::NaiveDateTime;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;
use tracing::info;

pub const TOP_N_RANGE: RangeInclusive<usize> = 3..=10;
pub const HISTOGRAM_BINS_RANGE: RangeInclusive<usize> = 10..=100;
pub const DEFAULT_TOP_N: usize = 5;
pub const DEFAULT_HISTOGRAM_BINS: usize = 30;
/// Bins of the days-open distribution, fixed regardless of the selection.
pub const DAYS_OPEN_HISTOGRAM_BINS: usize = 20;

/// The user's filter controls for one dataset tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSelection {
    pub year: i32,
    #[serde(default)]
    pub product: ProductSelection,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

fn default_histogram_bins() -> usize {
    DEFAULT_HISTOGRAM_BINS
}

impl AnalysisSelection {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            product: ProductSelection::All,
            top_n: DEFAULT_TOP_N,
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
        }
    }

    pub fn with_product(mut self, product: ProductSelection) -> Self {
        self.product = product;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_histogram_bins(mut self, bins: usize) -> Self {
        self.histogram_bins = bins;
        self
    }

    /// Check control bounds and that the year and product exist in the data.
    pub fn validate(&self, years: &[i32], products: &[String]) -> Result<()> {
        if !TOP_N_RANGE.contains(&self.top_n) {
            return Err(ClaimsError::InvalidSelection(format!(
                "top_n must be between {} and {}, got {}",
                TOP_N_RANGE.start(),
                TOP_N_RANGE.end(),
                self.top_n
            )));
        }
        if !HISTOGRAM_BINS_RANGE.contains(&self.histogram_bins) {
            return Err(ClaimsError::InvalidSelection(format!(
                "histogram_bins must be between {} and {}, got {}",
                HISTOGRAM_BINS_RANGE.start(),
                HISTOGRAM_BINS_RANGE.end(),
                self.histogram_bins
            )));
        }
        if !years.contains(&self.year) {
            return Err(ClaimsError::InvalidSelection(format!(
                "Year {} not present in data (available: {:?})",
                self.year, years
            )));
        }
        if let Some(product) = self.product.normalized() {
            if !products.contains(&product) {
                return Err(ClaimsError::InvalidSelection(format!(
                    "Product '{}' not present in data (available: {:?})",
                    product, products
                )));
            }
        }
        Ok(())
    }
}

/// A dashboard section: aggregates, or an explicit "no data for this selection".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum Section<T> {
    Data(T),
    NoData,
}

impl<T> Section<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            Section::Data(d) => Some(d),
            Section::NoData => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettledSection {
    pub claims: usize,
    pub monthly_counts: Vec<MonthCount>,
    /// Mean days between incident and notification.
    pub mean_notification_days: Availability<Option<f64>>,
    pub value_field: ValueField,
    pub value_summary: Availability<MonetarySummary>,
    pub value_histogram: Availability<Vec<HistogramBin>>,
    pub value_distribution: Availability<Option<FiveNumberSummary>>,
    pub top_causes: Availability<Vec<CategoryCount>>,
    pub relationships: Availability<Vec<CategoryCount>>,
    pub age_bands: Availability<Vec<AgeBandCount>>,
    pub mean_age: Availability<Option<f64>>,
    pub agencies: Availability<Vec<CategoryCount>>,
    pub advisors: Availability<Vec<CategoryCount>>,
}

/// Pending, denied and in-process claims share one shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenSection {
    pub claims: usize,
    /// Every cause, in order of first appearance.
    pub causes: Availability<Vec<CategoryCount>>,
    pub top_causes: Availability<Vec<CategoryCount>>,
    pub days_open: Availability<Vec<i64>>,
    pub days_open_histogram: Availability<Vec<HistogramBin>>,
    pub mean_days_open: Availability<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    pub dataset: String,
    pub selection: AnalysisSelection,
    pub reference_time: NaiveDateTime,
    pub settled: Section<SettledSection>,
    pub pending: Section<OpenSection>,
    pub denied: Section<OpenSection>,
    pub in_process: Section<OpenSection>,
    pub raw_rows: usize,
}

/// Report plus the year/product filtered rows (every status) for raw display.
#[derive(Debug, Clone)]
pub struct DashboardOutput {
    pub report: DashboardReport,
    pub raw: ClaimSubset,
}

pub struct ClaimsPipeline {
    schema: DatasetSchema,
    classifier: ClaimClassifier,
}

impl ClaimsPipeline {
    pub fn new(schema: DatasetSchema) -> Result<Self> {
        schema.validate()?;
        let classifier = ClaimClassifier::new(schema.statuses.clone())?;
        Ok(Self { schema, classifier })
    }

    pub fn schema(&self) -> &DatasetSchema {
        &self.schema
    }

    /// Load a CSV or workbook upload, chosen by file extension.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ClaimsTable> {
        let raw = read_table(path)?;
        normalize(&raw, &self.schema)
    }

    pub fn load_frame(&self, raw: &DataFrame) -> Result<ClaimsTable> {
        normalize(raw, &self.schema)
    }

    /// Run every stage for one selection. `reference_time` stands in for
    /// "now" so repeated runs are reproducible.
    pub fn run(
        &self,
        table: &ClaimsTable,
        selection: &AnalysisSelection,
        reference_time: NaiveDateTime,
    ) -> Result<DashboardOutput> {
        let years = available_years(table)?;
        if years.is_empty() {
            return Err(ClaimsError::UnusableInput(format!(
                "No incident date in dataset '{}' could be parsed",
                table.dataset
            )));
        }
        selection.validate(&years, &available_products(table)?)?;

        info!(
            "Running '{}' pipeline: year={}, product={:?}, rows={}",
            self.schema.name,
            selection.year,
            selection.product,
            table.height()
        );

        let classified = self.classifier.classify(table)?;
        let narrowed = |category: StatusCategory| -> Result<ClaimSubset> {
            match classified.get(category) {
                Some(subset) => filter(subset, selection.year, &selection.product),
                None => Ok(ClaimSubset::from_table(table).empty_like()),
            }
        };

        let days_open_reference = match self.schema.days_open_reference {
            DaysOpenReference::Now => ReferencePoint::Instant(reference_time),
            DaysOpenReference::Column { field } => ReferencePoint::Column(field),
        };

        let settled = self.settled_section(&narrowed(StatusCategory::Settled)?, selection)?;
        let pending = self.open_section(&narrowed(StatusCategory::Pending)?, selection, days_open_reference)?;
        let denied = self.open_section(&narrowed(StatusCategory::Denied)?, selection, days_open_reference)?;
        let in_process =
            self.open_section(&narrowed(StatusCategory::InProcess)?, selection, days_open_reference)?;

        let raw = filter(&ClaimSubset::from_table(table), selection.year, &selection.product)?;

        info!(
            "Pipeline '{}' done: {} rows in selection",
            self.schema.name,
            raw.len()
        );

        Ok(DashboardOutput {
            report: DashboardReport {
                dataset: table.dataset.clone(),
                selection: selection.clone(),
                reference_time,
                settled,
                pending,
                denied,
                in_process,
                raw_rows: raw.len(),
            },
            raw,
        })
    }

    fn settled_section(
        &self,
        subset: &ClaimSubset,
        selection: &AnalysisSelection,
    ) -> Result<Section<SettledSection>> {
        if subset.is_empty() {
            return Ok(Section::NoData);
        }
        let value = self.schema.settled_value;

        Ok(Section::Data(SettledSection {
            claims: subset.len(),
            monthly_counts: monthly_counts(subset)?,
            mean_notification_days: turnaround_days(
                subset,
                ClaimField::IncidentDate,
                ClaimField::NotificationDate,
            )?
            .map(|days| mean_days(&days)),
            value_field: value,
            value_summary: monetary_summary(subset, value)?,
            value_histogram: value_histogram(subset, value, selection.histogram_bins)?,
            value_distribution: five_number_summary(subset, value)?,
            top_causes: top_n_categories(subset, ClaimField::Cause, selection.top_n)?,
            relationships: category_counts(subset, ClaimField::Relationship, CategoryOrder::ByCount)?,
            age_bands: age_bands(subset)?,
            mean_age: mean_age(subset)?,
            agencies: category_counts(subset, ClaimField::Agency, CategoryOrder::ByLabel)?,
            advisors: category_counts(subset, ClaimField::Advisor, CategoryOrder::ByLabel)?,
        }))
    }

    fn open_section(
        &self,
        subset: &ClaimSubset,
        selection: &AnalysisSelection,
        reference: ReferencePoint,
    ) -> Result<Section<OpenSection>> {
        if subset.is_empty() {
            return Ok(Section::NoData);
        }

        let days = days_since(subset, ClaimField::IncidentDate, reference)?;
        let mean_days_open = days.clone().map(|d| mean_days(&d));
        let days_open = days.map(|d| d.into_iter().flatten().collect::<Vec<i64>>());
        let days_open_histogram = days_open.clone().map(|d| {
            let values: Vec<f64> = d.iter().map(|v| *v as f64).collect();
            histogram(&values, DAYS_OPEN_HISTOGRAM_BINS)
        });

        Ok(Section::Data(OpenSection {
            claims: subset.len(),
            causes: category_counts(subset, ClaimField::Cause, CategoryOrder::FirstSeen)?,
            top_causes: top_n_categories(subset, ClaimField::Cause, selection.top_n)?,
            days_open,
            days_open_histogram,
            mean_days_open,
        }))
    }
}
