use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClaimsError {
    /// The upload cannot be used at all: not tabular, empty, or unreadable.
    #[error("Unusable input: {0}")]
    UnusableInput(String),

    #[error("Required column '{column}' is missing from dataset '{dataset}'")]
    MissingRequiredColumn { dataset: String, column: String },

    #[error("Invalid dataset schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::error::PolarsError> for ClaimsError {
    fn from(err: polars::error::PolarsError) -> Self {
        ClaimsError::Polars(err.to_string())
    }
}

impl ClaimsError {
    /// True for errors that halt the pipeline before any aggregate is produced.
    pub fn is_unusable_input(&self) -> bool {
        matches!(
            self,
            ClaimsError::UnusableInput(_) | ClaimsError::MissingRequiredColumn { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ClaimsError>;
