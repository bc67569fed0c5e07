//! Claim Classifier
//!
//! Splits a normalized table into status subsets using the dataset's own
//! status spellings. Rows whose status matches no configured spelling are left
//! out of every subset.

use crate::error::Result;
use crate::normalizer::ClaimsTable;
use crate::schema::{ClaimField, StatusCategory, StatusVocabulary};
use crate::subset::ClaimSubset;
use polars::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

pub struct ClaimClassifier {
    vocabulary: StatusVocabulary,
}

/// Status subsets of one table. Every category is present, possibly empty.
#[derive(Debug, Clone)]
pub struct ClassifiedClaims {
    subsets: BTreeMap<StatusCategory, ClaimSubset>,
}

impl ClassifiedClaims {
    pub fn get(&self, category: StatusCategory) -> Option<&ClaimSubset> {
        self.subsets.get(&category)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StatusCategory, &ClaimSubset)> {
        self.subsets.iter()
    }

    /// Rows that landed in some category.
    pub fn classified_rows(&self) -> usize {
        self.subsets.values().map(|s| s.len()).sum()
    }
}

impl ClaimClassifier {
    pub fn new(vocabulary: StatusVocabulary) -> Result<Self> {
        vocabulary.validate()?;
        Ok(Self { vocabulary })
    }

    pub fn classify(&self, table: &ClaimsTable) -> Result<ClassifiedClaims> {
        let whole = ClaimSubset::from_table(table);
        let mut subsets = BTreeMap::new();

        for category in StatusCategory::ALL {
            let subset = self.select(&whole, category)?;
            debug!(
                "Dataset '{}': {} rows classified as {}",
                table.dataset,
                subset.len(),
                category.as_str()
            );
            subsets.insert(category, subset);
        }

        let classified = ClassifiedClaims { subsets };
        let inert = table.height().saturating_sub(classified.classified_rows());
        if inert > 0 {
            debug!(
                "Dataset '{}': {} rows have a status outside the configured vocabulary",
                table.dataset, inert
            );
        }

        Ok(classified)
    }

    /// Rows of `subset` whose status is one of the category's spellings.
    pub fn select(&self, subset: &ClaimSubset, category: StatusCategory) -> Result<ClaimSubset> {
        let predicate = self
            .vocabulary
            .spellings(category)
            .iter()
            .map(|spelling| col(ClaimField::Status.canonical_name()).eq(lit(spelling.as_str())))
            .reduce(|acc, expr| acc.or(expr));

        let predicate = match predicate {
            Some(p) => p,
            None => return Ok(subset.empty_like()),
        };

        let frame = subset.frame().clone().lazy().filter(predicate).collect()?;
        Ok(ClaimSubset::new(frame, subset.availability().clone()))
    }
}
