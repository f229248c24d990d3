//! service-core: Shared HTTP, configuration and observability plumbing for the
//! bank consolidation services.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
