use crate::normalizer::{ClaimsTable, ColumnAvailability};
use crate::schema::ClaimField;
use polars::prelude::*;

/// A set of claim rows taken from one normalized table.
///
/// Subsets are immutable; classification and filtering always produce new
/// ones. An empty subset is a normal state ("no data for this selection").
#[derive(Debug, Clone)]
pub struct ClaimSubset {
    frame: DataFrame,
    availability: ColumnAvailability,
}

impl ClaimSubset {
    pub fn new(frame: DataFrame, availability: ColumnAvailability) -> Self {
        Self { frame, availability }
    }

    /// The whole table as a subset.
    pub fn from_table(table: &ClaimsTable) -> Self {
        Self::new(table.frame.clone(), table.availability.clone())
    }

    /// A subset with the table's columns and no rows.
    pub fn empty_like(&self) -> Self {
        Self::new(self.frame.slice(0, 0), self.availability.clone())
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn availability(&self) -> &ColumnAvailability {
        &self.availability
    }

    pub fn is_available(&self, field: ClaimField) -> bool {
        self.availability.is_available(field)
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }
}
