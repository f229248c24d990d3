use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;

/// What is wrong with a rejected input value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidInput {
    MissingField,
    AmountType,
    Amount,
    Date,
    TooLong,
    Other,
}

#[derive(Error, Debug)]
pub enum ConsolidationError {
    #[error("{message}")]
    Validation { kind: InvalidInput, message: String },

    #[error("unsupported date format: {0:?}")]
    UnsupportedDateFormat(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error(
        "invoice {invoice_id} would be over-allocated: total {total_amount}, \
         already matched {existing_matched}, requested {requested_amount}"
    )]
    OverAllocation {
        invoice_id: String,
        total_amount: Decimal,
        existing_matched: Decimal,
        requested_amount: Decimal,
    },

    #[error("{0}")]
    Duplicate(String),

    #[error("Store error: {0}")]
    Store(anyhow::Error),
}

impl ConsolidationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::invalid(InvalidInput::Other, message)
    }

    pub fn invalid(kind: InvalidInput, message: impl Into<String>) -> Self {
        Self::Validation {
            kind,
            message: message.into(),
        }
    }

    pub fn bank_entry_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: "bank entry",
            id: id.to_string(),
        }
    }

    pub fn invoice_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: "invoice",
            id: id.to_string(),
        }
    }

    /// Label used for the error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::UnsupportedDateFormat(_) => "unsupported_date_format",
            Self::NotFound { .. } => "not_found",
            Self::OverAllocation { .. } => "over_allocation",
            Self::Duplicate(_) => "duplicate",
            Self::Store(_) => "store",
        }
    }
}

impl From<ConsolidationError> for AppError {
    fn from(err: ConsolidationError) -> Self {
        let message = err.to_string();
        match err {
            ConsolidationError::Validation { .. } | ConsolidationError::UnsupportedDateFormat(_) => {
                AppError::BadRequest(anyhow::anyhow!(message))
            }
            ConsolidationError::NotFound { .. } => AppError::NotFound(anyhow::anyhow!(message)),
            ConsolidationError::OverAllocation { .. } => {
                AppError::UnprocessableEntity(anyhow::anyhow!(message))
            }
            ConsolidationError::Duplicate(_) => AppError::Conflict(anyhow::anyhow!(message)),
            ConsolidationError::Store(e) => AppError::DatabaseError(e),
        }
    }
}
