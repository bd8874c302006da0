use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A trade payload that cannot become a [`crate::TradeIntent`].
///
/// Always names the offending field so callers can tell bad input apart
/// from a legitimate risk block.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("missing field: {0}")]
    MissingField(String),

    #[error("invalid field {field}: {detail}")]
    InvalidField { field: String, detail: String },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            detail: detail.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            ValidationError::MissingField(field) => field,
            ValidationError::InvalidField { field, .. } => field,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, ValidationError::MissingField(_))
    }
}
