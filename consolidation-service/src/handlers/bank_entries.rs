//! Bank entry ingestion, listing, maintenance and reconciliation.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use tracing::info;

use super::{fail, json_body};
use crate::dtos::{
    AttachedInvoiceResponse, BankEntryInput, BankEntryListResponse, BankEntryPage,
    BankEntryResponse, BulkCreateResponse, CreateBankEntryResponse, EntryIdResponse, ListParams,
    ReconcileRequest, ReconcileResponse,
};
use crate::services::allocation::plan_allocations;
use crate::services::ingestion::{plan_bulk, validate_new_entry, validate_update};
use crate::services::{record_ingestion, record_reconciliation, ConsolidationError};
use crate::startup::AppState;

pub async fn create_bank_entry(
    State(state): State<AppState>,
    payload: Result<Json<BankEntryInput>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateBankEntryResponse>), AppError> {
    let input = json_body(payload)?;
    let entry = validate_new_entry(&input).map_err(fail)?;

    let (id, created) = state.db.create_bank_entry(&entry).await.map_err(fail)?;
    record_ingestion(if created { "inserted" } else { "duplicate" }, 1);

    Ok((StatusCode::CREATED, Json(CreateBankEntryResponse { id, created })))
}

/// Candidates arrive as raw JSON values so that one malformed element is
/// skipped instead of failing the whole request.
pub async fn bulk_create_bank_entries(
    State(state): State<AppState>,
    payload: Result<Json<Vec<serde_json::Value>>, JsonRejection>,
) -> Result<Json<BulkCreateResponse>, AppError> {
    let candidates = json_body(payload)?;
    if candidates.is_empty() {
        return Err(fail(ConsolidationError::validation(
            "at least one bank entry is required",
        )));
    }

    let total = candidates.len();
    let plan = plan_bulk(candidates);

    let report = state
        .db
        .bulk_create_bank_entries(&plan.accepted)
        .await
        .map_err(fail)?;

    let outcome = plan.outcome(total, report);
    record_ingestion("inserted", outcome.inserted);
    record_ingestion("duplicate", outcome.duplicates);
    record_ingestion("skipped", outcome.skipped);

    info!(
        total = outcome.total,
        inserted = outcome.inserted,
        duplicates = outcome.duplicates,
        skipped = outcome.skipped,
        "Bulk ingestion finished"
    );

    Ok(Json(outcome.into()))
}

pub async fn list_bank_entries(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<BankEntryListResponse>, AppError> {
    let filter = params.filter().map_err(fail)?;
    let window = params.window(state.db.settings());

    let (entries, total) = state
        .db
        .list_bank_entries(&filter, window)
        .await
        .map_err(fail)?;
    let items: Vec<BankEntryResponse> = entries.into_iter().map(Into::into).collect();

    if params.wants_flat() {
        return Ok(Json(BankEntryListResponse::Flat(items)));
    }

    Ok(Json(BankEntryListResponse::Page(BankEntryPage {
        items,
        total,
        limit: window.limit,
        offset: window.offset,
        has_next: window.has_next(total),
        next_offset: window.next_offset(total),
    })))
}

pub async fn get_bank_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BankEntryResponse>, AppError> {
    let entry = state.db.get_bank_entry(&id).await.map_err(fail)?;
    Ok(Json(entry.into()))
}

pub async fn update_bank_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<BankEntryInput>, JsonRejection>,
) -> Result<Json<EntryIdResponse>, AppError> {
    let input = json_body(payload)?;
    let entry = validate_update(&id, &input).map_err(fail)?;

    state.db.update_bank_entry(&entry).await.map_err(fail)?;

    Ok(Json(EntryIdResponse { id }))
}

pub async fn delete_bank_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EntryIdResponse>, AppError> {
    state.db.delete_bank_entry(&id).await.map_err(fail)?;
    Ok(Json(EntryIdResponse { id }))
}

pub async fn reconcile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ReconcileRequest>, JsonRejection>,
) -> Result<Json<ReconcileResponse>, AppError> {
    let request = json_body(payload)?;
    let note = request.note.clone();
    let mode = request.mode.clone();

    let plan = plan_allocations(request.allocations(), note.as_deref(), mode.as_deref())
        .map_err(fail)?;

    match state.db.reconcile(&id, &plan).await {
        Ok(outcome) => {
            record_reconciliation(plan.mode.as_str(), "ok");
            Ok(Json(outcome.into()))
        }
        Err(e) => {
            record_reconciliation(plan.mode.as_str(), e.kind());
            Err(fail(e))
        }
    }
}

pub async fn list_attached_invoices(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AttachedInvoiceResponse>>, AppError> {
    let invoices = state.db.list_attached_invoices(&id).await.map_err(fail)?;
    Ok(Json(invoices.into_iter().map(Into::into).collect()))
}
