//! Schema Normalizer
//!
//! Turns a loosely typed upload (CSV or workbook) into a claims table with
//! canonical column names: dates parsed to timestamps (failures become null),
//! product uppercased with a sentinel for blanks, amounts coerced to f64.
//! Optional columns absent from the upload are recorded as unavailable, never
//! synthesized.

use crate::columns::{millis_to_timestamp, string_values, timestamp_series, timestamp_values};
use crate::error::{ClaimsError, Result};
use crate::schema::{ClaimField, DatasetSchema, FieldKind, PRODUCT_NOT_SPECIFIED};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use itertools::Itertools;
use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Excel serial day of 1970-01-01 (serials count from 1899-12-30).
const EXCEL_SERIAL_UNIX_EPOCH: f64 = 25_569.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;
/// Excel's last representable day, 9999-12-31.
const EXCEL_SERIAL_MAX: f64 = 2_958_465.0;

/// Which optional claim fields this upload provides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnAvailability {
    present: BTreeSet<ClaimField>,
}

impl ColumnAvailability {
    pub fn is_available(&self, field: ClaimField) -> bool {
        self.present.contains(&field)
    }

    pub fn available(&self) -> impl Iterator<Item = &ClaimField> {
        self.present.iter()
    }

    pub fn missing(&self) -> Vec<ClaimField> {
        ClaimField::ALL
            .iter()
            .copied()
            .filter(|f| !self.present.contains(f))
            .collect()
    }

    fn mark(&mut self, field: ClaimField) {
        self.present.insert(field);
    }
}

/// A normalized upload, held for the lifetime of a session tab.
#[derive(Debug, Clone)]
pub struct ClaimsTable {
    pub dataset: String,
    pub frame: DataFrame,
    pub availability: ColumnAvailability,
}

impl ClaimsTable {
    pub fn height(&self) -> usize {
        self.frame.height()
    }
}

/// Read a CSV upload with every column as text; typing is the normalizer's job.
pub fn read_csv(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ClaimsError::UnusableInput(format!(
            "File '{}' does not exist",
            path.display()
        )));
    }

    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()
        .and_then(|lf| lf.collect())
        .map_err(|e| {
            ClaimsError::UnusableInput(format!(
                "Could not read '{}' as a table: {}",
                path.display(),
                e
            ))
        })?;

    info!("Read {} rows x {} columns from {}", df.height(), df.width(), path.display());
    Ok(df)
}

/// Read the first sheet of a workbook with every cell as text. The first row
/// holds the headers; blank headers get a positional name.
pub fn read_workbook(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ClaimsError::UnusableInput(format!(
            "File '{}' does not exist",
            path.display()
        )));
    }
    let unreadable = |e: &dyn std::fmt::Display| {
        ClaimsError::UnusableInput(format!(
            "Could not read '{}' as a workbook: {}",
            path.display(),
            e
        ))
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| unreadable(&e))?;
    let sheet = workbook.sheet_names().first().cloned().ok_or_else(|| {
        ClaimsError::UnusableInput(format!("Workbook '{}' has no sheets", path.display()))
    })?;
    let range = workbook.worksheet_range(&sheet).map_err(|e| unreadable(&e))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .enumerate()
            .map(|(i, cell)| cell_text(cell).unwrap_or_else(|| format!("column_{}", i + 1)))
            .collect(),
        None => Vec::new(),
    };

    let mut values: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for row in rows {
        for (i, column) in values.iter_mut().enumerate() {
            column.push(row.get(i).and_then(cell_text));
        }
    }

    let columns: Vec<Series> = headers
        .iter()
        .zip(values)
        .map(|(name, column)| Series::new(name.trim(), column))
        .collect();
    let df = DataFrame::new(columns).map_err(|e| unreadable(&e))?;

    info!(
        "Read {} rows x {} columns from sheet '{}' of {}",
        df.height(),
        df.width(),
        sheet,
        path.display()
    );
    Ok(df)
}

/// Workbook cells as the text a CSV export would hold; date cells become
/// Excel serials so the normalizer sees one representation.
fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
    };
    Some(text)
}

/// Pick the reader from the file extension; anything not a workbook is
/// read as CSV.
pub fn read_table(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => read_workbook(path),
        _ => read_csv(path),
    }
}

/// Normalize a raw upload against a dataset schema.
pub fn normalize(raw: &DataFrame, schema: &DatasetSchema) -> Result<ClaimsTable> {
    if raw.width() == 0 {
        return Err(ClaimsError::UnusableInput(format!(
            "Upload for dataset '{}' has no columns",
            schema.name
        )));
    }

    let raw_columns: Vec<&str> = raw.get_column_names();
    for field in ClaimField::ALL.iter().filter(|f| f.is_required()) {
        let header = schema.source_column(*field).unwrap_or(field.canonical_name());
        if !raw_columns.contains(&header) {
            return Err(ClaimsError::MissingRequiredColumn {
                dataset: schema.name.clone(),
                column: header.to_string(),
            });
        }
    }

    let mut availability = ColumnAvailability::default();
    let mut columns: Vec<Series> = Vec::new();

    for field in ClaimField::ALL {
        let header = match schema.source_column(field) {
            Some(h) => h,
            None => continue,
        };
        let source = match raw.column(header) {
            Ok(s) => s,
            Err(_) => {
                warn!(
                    "Dataset '{}': optional column '{}' not present, {} marked unavailable",
                    schema.name,
                    header,
                    field.canonical_name()
                );
                continue;
            }
        };

        let normalized = match field.kind() {
            FieldKind::Date => normalize_dates(source, field, &schema.date_formats)?,
            FieldKind::Numeric => normalize_numbers(source, field)?,
            FieldKind::Category => normalize_categories(source, field)?,
        };

        let coerced = normalized.null_count().saturating_sub(source.null_count());
        if coerced > 0 {
            debug!(
                "Dataset '{}': {} values in '{}' coerced to missing",
                schema.name, coerced, header
            );
        }

        availability.mark(field);
        columns.push(normalized);
    }

    // Unmapped source columns ride along for raw display.
    let mapped: BTreeSet<&str> = schema.columns.values().map(|s| s.as_str()).collect();
    let canonical: BTreeSet<&str> = ClaimField::ALL.iter().map(|f| f.canonical_name()).collect();
    for name in raw_columns {
        if mapped.contains(name) || canonical.contains(name) {
            continue;
        }
        columns.push(raw.column(name)?.clone());
    }

    let frame = DataFrame::new(columns)?;
    info!(
        "Normalized dataset '{}': {} rows, {} claim fields available",
        schema.name,
        frame.height(),
        availability.available().count()
    );

    Ok(ClaimsTable {
        dataset: schema.name.clone(),
        frame,
        availability,
    })
}

fn normalize_dates(source: &Series, field: ClaimField, formats: &[String]) -> Result<Series> {
    let name = field.canonical_name();
    let timestamps: Vec<Option<NaiveDateTime>> = match source.dtype() {
        DataType::Date | DataType::Datetime(_, _) => {
            let frame = DataFrame::new(vec![source.clone().with_name(name)])?;
            timestamp_values(&frame, field)?
        }
        dtype if dtype.is_numeric() => {
            let casted = source.cast(&DataType::Float64)?;
            casted
                .f64()?
                .into_iter()
                .map(|v| v.and_then(excel_serial_to_timestamp))
                .collect()
        }
        _ => {
            let casted = source.cast(&DataType::String)?;
            casted
                .str()?
                .into_iter()
                .map(|v| v.and_then(|s| parse_date(s, formats)))
                .collect()
        }
    };

    timestamp_series(name, &timestamps)
}

fn normalize_numbers(source: &Series, field: ClaimField) -> Result<Series> {
    let name = field.canonical_name();
    let values: Vec<Option<f64>> = if source.dtype().is_numeric() {
        let casted = source.cast(&DataType::Float64)?;
        casted.f64()?.into_iter().collect()
    } else {
        let amount_pattern = amount_regex()?;
        let casted = source.cast(&DataType::String)?;
        casted
            .str()?
            .into_iter()
            .map(|v| v.and_then(|s| parse_amount(s, &amount_pattern)))
            .collect()
    };

    let values: Vec<Option<f64>> = values
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .map(|v| match field {
            // A negative age is a data-entry error, not a band.
            ClaimField::Age => v.filter(|x| *x >= 0.0),
            _ => v,
        })
        .collect();

    Ok(Series::new(name, values))
}

fn normalize_categories(source: &Series, field: ClaimField) -> Result<Series> {
    let name = field.canonical_name();
    let casted = source.cast(&DataType::String)?;
    let values: Vec<Option<String>> = casted
        .str()?
        .into_iter()
        .map(|v| v.map(str::trim).filter(|s| !s.is_empty()).map(|s| s.to_string()))
        .map(|v| match field {
            ClaimField::Product => Some(
                v.map(|s| s.to_uppercase())
                    .unwrap_or_else(|| PRODUCT_NOT_SPECIFIED.to_string()),
            ),
            _ => v,
        })
        .collect();

    Ok(Series::new(name, values))
}

/// Parse a date cell with the schema's formats, falling back to Excel serials.
/// Time of day is kept; date-only cells land on midnight.
pub fn parse_date(value: &str, formats: &[String]) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in formats {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(datetime);
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }

    trimmed.parse::<f64>().ok().and_then(excel_serial_to_timestamp)
}

/// The fractional part of a serial is the time of day.
fn excel_serial_to_timestamp(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 1.0 || serial > EXCEL_SERIAL_MAX {
        return None;
    }
    let millis = ((serial - EXCEL_SERIAL_UNIX_EPOCH) * MILLIS_PER_DAY).round() as i64;
    millis_to_timestamp(millis)
}

fn amount_regex() -> Result<Regex> {
    Regex::new(r"^-?\s*\$?\s*-?[\d.,]+$")
        .map_err(|e| ClaimsError::Config(format!("Failed to create amount regex: {}", e)))
}

/// Coerce a monetary/numeric cell such as `"$1,250.50"` or `"1.250,50"`.
pub fn parse_amount(value: &str, pattern: &Regex) -> Option<f64> {
    let trimmed = value.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Some(v);
    }
    if !pattern.is_match(trimmed) {
        return None;
    }

    let negative = trimmed.contains('-');
    let digits: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    let last_dot = digits.rfind('.');
    let last_comma = digits.rfind(',');
    let decimal_separator = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (None, Some(c)) => {
            // A lone comma followed by one or two digits reads as a decimal comma.
            let tail = digits.len() - c - 1;
            if digits.matches(',').count() == 1 && tail <= 2 {
                Some(',')
            } else {
                None
            }
        }
        (Some(_), None) => {
            if digits.matches('.').count() == 1 {
                Some('.')
            } else {
                None
            }
        }
        (None, None) => None,
    };

    let cleaned: String = digits
        .chars()
        .filter_map(|c| match c {
            '.' | ',' if Some(c) == decimal_separator => Some('.'),
            '.' | ',' => None,
            other => Some(other),
        })
        .collect();

    cleaned
        .parse::<f64>()
        .ok()
        .map(|v| if negative { -v } else { v })
}

/// Incident years present in the table, ascending.
pub fn available_years(table: &ClaimsTable) -> Result<Vec<i32>> {
    Ok(timestamp_values(&table.frame, ClaimField::IncidentDate)?
        .into_iter()
        .flatten()
        .map(|d| d.year())
        .sorted()
        .dedup()
        .collect())
}

/// Product categories present in the table, ascending. Empty when the
/// dataset has no product column.
pub fn available_products(table: &ClaimsTable) -> Result<Vec<String>> {
    if !table.availability.is_available(ClaimField::Product) {
        return Ok(Vec::new());
    }
    Ok(string_values(&table.frame, ClaimField::Product)?
        .into_iter()
        .flatten()
        .sorted()
        .dedup()
        .collect())
}
