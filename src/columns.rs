//! Typed column access over normalized claim frames.

use crate::error::Result;
use crate::schema::ClaimField;
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;

/// Timestamp dtype of every normalized date column.
pub const TIMESTAMP_DTYPE: DataType = DataType::Datetime(TimeUnit::Milliseconds, None);

const MILLIS_PER_DAY: i64 = 86_400_000;

pub fn timestamp_to_millis(value: NaiveDateTime) -> i64 {
    value.and_utc().timestamp_millis()
}

pub fn millis_to_timestamp(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

/// Whole days from `from` to `to`, floored like a timedelta's day component.
pub fn floor_days(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    (to - from).num_milliseconds().div_euclid(MILLIS_PER_DAY)
}

/// Build a millisecond `Datetime` series from optional timestamps.
pub fn timestamp_series(name: &str, values: &[Option<NaiveDateTime>]) -> Result<Series> {
    let millis: Vec<Option<i64>> = values.iter().map(|v| v.map(timestamp_to_millis)).collect();
    Ok(Series::new(name, millis).cast(&TIMESTAMP_DTYPE)?)
}

/// Timestamps of a date column, one entry per row. `Date` and other
/// `Datetime` units are widened to milliseconds first.
pub fn timestamp_values(df: &DataFrame, field: ClaimField) -> Result<Vec<Option<NaiveDateTime>>> {
    let physical = df
        .column(field.canonical_name())?
        .cast(&TIMESTAMP_DTYPE)?
        .cast(&DataType::Int64)?;
    let millis = physical.i64()?;
    Ok(millis
        .into_iter()
        .map(|m| m.and_then(millis_to_timestamp))
        .collect())
}

pub fn float_values(df: &DataFrame, field: ClaimField) -> Result<Vec<Option<f64>>> {
    let casted = df.column(field.canonical_name())?.cast(&DataType::Float64)?;
    let values = casted.f64()?;
    Ok(values.into_iter().map(|v| v.filter(|x| !x.is_nan())).collect())
}

pub fn string_values(df: &DataFrame, field: ClaimField) -> Result<Vec<Option<String>>> {
    let casted = df.column(field.canonical_name())?.cast(&DataType::String)?;
    let values = casted.str()?;
    Ok(values.into_iter().map(|v| v.map(|s| s.to_string())).collect())
}
