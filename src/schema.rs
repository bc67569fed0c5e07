//! Dataset Schema Descriptor
//!
//! Describes one claims workbook layout: which source header feeds each claim
//! field, how statuses are spelled, which monetary column the settled section
//! reports, and how "days open" is measured.

use crate::error::{ClaimsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Product value used when the product column is empty for a row.
pub const PRODUCT_NOT_SPECIFIED: &str = "NOT_SPECIFIED";

/// A claim attribute, independent of how a given workbook names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimField {
    IncidentDate,
    NotificationDate,
    ClosureDate,
    Status,
    Product,
    InsuredValue,
    IndemnifiedValue,
    Age,
    Cause,
    Relationship,
    Agency,
    Advisor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Date,
    Category,
    Numeric,
}

impl ClaimField {
    pub const ALL: [ClaimField; 12] = [
        ClaimField::IncidentDate,
        ClaimField::NotificationDate,
        ClaimField::ClosureDate,
        ClaimField::Status,
        ClaimField::Product,
        ClaimField::InsuredValue,
        ClaimField::IndemnifiedValue,
        ClaimField::Age,
        ClaimField::Cause,
        ClaimField::Relationship,
        ClaimField::Agency,
        ClaimField::Advisor,
    ];

    /// Column name used in the normalized frame.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            ClaimField::IncidentDate => "incident_date",
            ClaimField::NotificationDate => "notification_date",
            ClaimField::ClosureDate => "closure_date",
            ClaimField::Status => "status",
            ClaimField::Product => "product",
            ClaimField::InsuredValue => "insured_value",
            ClaimField::IndemnifiedValue => "indemnified_value",
            ClaimField::Age => "age",
            ClaimField::Cause => "cause",
            ClaimField::Relationship => "relationship",
            ClaimField::Agency => "agency",
            ClaimField::Advisor => "advisor",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            ClaimField::IncidentDate | ClaimField::NotificationDate | ClaimField::ClosureDate => {
                FieldKind::Date
            }
            ClaimField::InsuredValue | ClaimField::IndemnifiedValue | ClaimField::Age => {
                FieldKind::Numeric
            }
            _ => FieldKind::Category,
        }
    }

    /// Fields without which the pipeline cannot run at all.
    pub fn is_required(&self) -> bool {
        matches!(self, ClaimField::IncidentDate | ClaimField::Status)
    }
}

/// Monetary column a section reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueField {
    InsuredValue,
    IndemnifiedValue,
}

impl ValueField {
    pub fn field(&self) -> ClaimField {
        match self {
            ValueField::InsuredValue => ClaimField::InsuredValue,
            ValueField::IndemnifiedValue => ClaimField::IndemnifiedValue,
        }
    }
}

/// Status buckets the dashboard reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    Settled,
    Pending,
    Denied,
    InProcess,
}

impl StatusCategory {
    pub const ALL: [StatusCategory; 4] = [
        StatusCategory::Settled,
        StatusCategory::Pending,
        StatusCategory::Denied,
        StatusCategory::InProcess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCategory::Settled => "settled",
            StatusCategory::Pending => "pending",
            StatusCategory::Denied => "denied",
            StatusCategory::InProcess => "in_process",
        }
    }
}

/// Exact status spellings per category for one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusVocabulary(BTreeMap<StatusCategory, Vec<String>>);

impl StatusVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, category: StatusCategory, spellings: &[&str]) -> Self {
        self.0
            .entry(category)
            .or_default()
            .extend(spellings.iter().map(|s| s.to_string()));
        self
    }

    pub fn spellings(&self, category: StatusCategory) -> &[String] {
        self.0.get(&category).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Reverse lookup from a status string to its category.
    pub fn category_of(&self, status: &str) -> Option<StatusCategory> {
        self.0
            .iter()
            .find(|(_, spellings)| spellings.iter().any(|s| s == status))
            .map(|(category, _)| *category)
    }

    /// A spelling listed under two categories would break subset disjointness.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashMap<&str, StatusCategory> = HashMap::new();
        for (category, spellings) in &self.0 {
            for spelling in spellings {
                if let Some(previous) = seen.insert(spelling.as_str(), *category) {
                    if previous != *category {
                        return Err(ClaimsError::InvalidSchema(format!(
                            "Status '{}' is mapped to both '{}' and '{}'",
                            spelling,
                            previous.as_str(),
                            category.as_str()
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// How "days open" is measured for pending, denied and in-process claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DaysOpenReference {
    /// From the incident date to the reference time of the run.
    Now,
    /// From the incident date to another date column of the same row.
    Column { field: ClaimField },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub name: String,
    /// Claim field -> source column header, matched literally.
    pub columns: BTreeMap<ClaimField, String>,
    pub statuses: StatusVocabulary,
    pub settled_value: ValueField,
    pub days_open_reference: DaysOpenReference,
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
}

pub fn default_date_formats() -> Vec<String> {
    [
        "%Y-%m-%d",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%d/%m/%Y",
        "%d/%m/%Y %H:%M:%S",
        "%d-%m-%Y",
        "%Y/%m/%d",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl DatasetSchema {
    /// Life-insurance workbook: insured values, ages, relationship of the
    /// deceased, agency and advisor; pending time measured against now.
    pub fn life() -> Self {
        let columns = [
            (ClaimField::IncidentDate, "FECHA SINIESTRO"),
            (ClaimField::NotificationDate, "FECHA NOTIFICACION SINIESTRO"),
            (ClaimField::Status, "ESTADO"),
            (ClaimField::Product, "BASE"),
            (ClaimField::InsuredValue, "VALOR ASEGURADO"),
            (ClaimField::Age, "EDAD"),
            (ClaimField::Cause, "CAUSA SINIESTRO"),
            (ClaimField::Relationship, "PARENTESCO"),
            (ClaimField::Agency, "AGENCIA"),
            (ClaimField::Advisor, "ASESOR"),
        ];

        Self {
            name: "life".to_string(),
            columns: columns
                .iter()
                .map(|(field, header)| (*field, header.to_string()))
                .collect(),
            statuses: StatusVocabulary::new()
                .with(StatusCategory::Settled, &["LIQUIDADO"])
                .with(StatusCategory::Pending, &["PENDIENTE"]),
            settled_value: ValueField::InsuredValue,
            days_open_reference: DaysOpenReference::Now,
            date_formats: default_date_formats(),
        }
    }

    /// Property workbook: indemnified values, no age column, wider status
    /// vocabulary; days open measured up to the notification date.
    pub fn property() -> Self {
        let columns = [
            (ClaimField::IncidentDate, "FECHA SINIESTRO"),
            (ClaimField::NotificationDate, "FECHA NOTIFICACION SINIESTRO"),
            (ClaimField::ClosureDate, "FECHA LIQUIDACION"),
            (ClaimField::Status, "ESTADO"),
            (ClaimField::Product, "BASE"),
            (ClaimField::InsuredValue, "VALOR ASEGURADO"),
            (ClaimField::IndemnifiedValue, "VALOR INDEMNIZADO"),
            (ClaimField::Cause, "CAUSA SINIESTRO"),
            (ClaimField::Agency, "AGENCIA"),
            (ClaimField::Advisor, "ASESOR"),
        ];

        Self {
            name: "property".to_string(),
            columns: columns
                .iter()
                .map(|(field, header)| (*field, header.to_string()))
                .collect(),
            statuses: StatusVocabulary::new()
                .with(StatusCategory::Settled, &["LIQUIDADO"])
                .with(
                    StatusCategory::Pending,
                    &["PENDIENTE", "PENDIENTE DE DOCUMENTOS", "PENDIENTE DOCUMENTOS"],
                )
                .with(StatusCategory::Denied, &["NEGADO"])
                .with(StatusCategory::InProcess, &["EN PROCESO"]),
            settled_value: ValueField::IndemnifiedValue,
            days_open_reference: DaysOpenReference::Column {
                field: ClaimField::NotificationDate,
            },
            date_formats: default_date_formats(),
        }
    }

    /// Look up a built-in preset by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "life" => Some(Self::life()),
            "property" => Some(Self::property()),
            _ => None,
        }
    }

    /// Load a descriptor from a JSON file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let schema: DatasetSchema = serde_json::from_str(&content)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn source_column(&self, field: ClaimField) -> Option<&str> {
        self.columns.get(&field).map(|s| s.as_str())
    }

    pub fn validate(&self) -> Result<()> {
        for field in ClaimField::ALL.iter().filter(|f| f.is_required()) {
            if !self.columns.contains_key(field) {
                return Err(ClaimsError::InvalidSchema(format!(
                    "Schema '{}' does not map required field '{}'",
                    self.name,
                    field.canonical_name()
                )));
            }
        }

        if self.date_formats.is_empty() {
            return Err(ClaimsError::InvalidSchema(format!(
                "Schema '{}' lists no date formats",
                self.name
            )));
        }

        if let DaysOpenReference::Column { field } = self.days_open_reference {
            if field.kind() != FieldKind::Date {
                return Err(ClaimsError::InvalidSchema(format!(
                    "Days-open reference '{}' is not a date field",
                    field.canonical_name()
                )));
            }
        }

        self.statuses.validate()
    }
}
