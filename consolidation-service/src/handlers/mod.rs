//! HTTP handlers for consolidation-service.

pub mod bank_entries;
pub mod health;
pub mod invoices;

use axum::extract::rejection::JsonRejection;
use axum::Json;
use service_core::error::AppError;

use crate::services::{record_error, ConsolidationError};

/// Counts the failure and converts it for the response.
pub(crate) fn fail(err: ConsolidationError) -> AppError {
    record_error(err.kind());
    if let ConsolidationError::Store(ref e) = err {
        tracing::error!(error = %e, "Store operation failed");
    }
    err.into()
}

/// Unwraps a JSON body, turning decode failures into 400s.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        record_error("validation");
        AppError::BadRequest(anyhow::anyhow!("Invalid request body: {}", rejection.body_text()))
    })
}
