//! Services module for consolidation-service.

pub mod allocation;
pub mod database;
pub mod error;
pub mod fingerprint;
pub mod ingestion;
pub mod invoice;
pub mod metrics;
pub mod query;
pub mod seed;

pub use database::Database;
pub use error::ConsolidationError;
pub use metrics::{
    get_metrics, init_metrics, record_error, record_http_request, record_ingestion,
    record_reconciliation,
};
