//! Insurance-claims aggregation: ingest a claims workbook or CSV export,
//! normalize it against a dataset schema, split by status, filter by year and
//! product, and compute the aggregates a claims dashboard displays.

pub mod aggregator;
pub mod classifier;
pub mod columns;
pub mod config;
pub mod error;
pub mod filter;
pub mod normalizer;
pub mod pipeline;
pub mod schema;
pub mod security;
pub mod session;
pub mod subset;

pub use aggregator::{Availability, CategoryCount, ReferencePoint};
pub use classifier::{ClaimClassifier, ClassifiedClaims};
pub use config::AppConfig;
pub use error::{ClaimsError, Result};
pub use filter::{filter, ProductSelection};
pub use normalizer::{normalize, read_csv, read_table, read_workbook, ClaimsTable, ColumnAvailability};
pub use pipeline::{AnalysisSelection, ClaimsPipeline, DashboardOutput, DashboardReport, Section};
pub use schema::{ClaimField, DatasetSchema, DaysOpenReference, StatusCategory, StatusVocabulary, ValueField};
pub use security::{CredentialVerifier, StaticCredentials};
pub use session::Session;
pub use subset::ClaimSubset;
