//! Consolidation Service - bank statement ingestion and invoice reconciliation.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
