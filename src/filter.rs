//! Temporal/Product Filter
//!
//! Narrows a subset to one incident year and, optionally, one product.

use crate::error::Result;
use crate::schema::ClaimField;
use crate::subset::ClaimSubset;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Product control value: every product, or one normalized category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "ProductSelectionValue")]
pub enum ProductSelection {
    #[default]
    All,
    Only(String),
}

/// Wire form of [`ProductSelection`]; deserialized values are normalized
/// through [`ProductSelection::only`].
#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum ProductSelectionValue {
    All,
    Only(String),
}

impl From<ProductSelectionValue> for ProductSelection {
    fn from(value: ProductSelectionValue) -> Self {
        match value {
            ProductSelectionValue::All => ProductSelection::All,
            ProductSelectionValue::Only(product) => ProductSelection::only(&product),
        }
    }
}

impl ProductSelection {
    /// Build from a control value; the product is compared uppercased, as
    /// the normalizer stores it.
    pub fn only(product: &str) -> Self {
        ProductSelection::Only(normalize_product(product))
    }

    /// The selected product in stored form, `None` for all products.
    pub fn normalized(&self) -> Option<String> {
        match self {
            ProductSelection::All => None,
            ProductSelection::Only(product) => Some(normalize_product(product)),
        }
    }
}

fn normalize_product(product: &str) -> String {
    product.trim().to_uppercase()
}

/// Rows of `subset` with an incident in `year` and, when given, the selected
/// product. Rows with no parseable incident date never match.
pub fn filter(subset: &ClaimSubset, year: i32, product: &ProductSelection) -> Result<ClaimSubset> {
    let mut predicate = col(ClaimField::IncidentDate.canonical_name())
        .dt()
        .year()
        .eq(lit(year));

    if let Some(name) = product.normalized() {
        if !subset.is_available(ClaimField::Product) {
            return Ok(subset.empty_like());
        }
        predicate = predicate.and(col(ClaimField::Product.canonical_name()).eq(lit(name)));
    }

    let frame = subset.frame().clone().lazy().filter(predicate).collect()?;
    Ok(ClaimSubset::new(frame, subset.availability().clone()))
}
