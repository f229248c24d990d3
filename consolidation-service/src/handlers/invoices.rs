use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use super::{fail, json_body};
use crate::dtos::{
    CreateInvoiceResponse, InvoiceDetailsResponse, InvoiceInput, InvoiceListParams, InvoicePage,
    InvoiceResponse,
};
use crate::services::invoice::validate_invoice;
use crate::startup::AppState;

pub async fn create_invoice(
    State(state): State<AppState>,
    payload: Result<Json<InvoiceInput>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateInvoiceResponse>), AppError> {
    let input = json_body(payload)?;
    let invoice = validate_invoice(&input).map_err(fail)?;

    state.db.create_invoice(&invoice).await.map_err(fail)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateInvoiceResponse {
            total_details: invoice.details.len(),
            invoice_header_id: invoice.id,
            invoice_no: invoice.invoice_no,
        }),
    ))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InvoiceDetailsResponse>, AppError> {
    let invoice = state.db.get_invoice(&id).await.map_err(fail)?;
    let details = state.db.list_invoice_details(&id).await.map_err(fail)?;

    Ok(Json(InvoiceDetailsResponse {
        invoice: invoice.into(),
        details: details.into_iter().map(Into::into).collect(),
    }))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    Query(params): Query<InvoiceListParams>,
) -> Result<Json<InvoicePage>, AppError> {
    let filter = params.filter().map_err(fail)?;
    let window = params.window(state.db.settings());

    let (invoices, total) = state
        .db
        .list_invoices(&filter, window)
        .await
        .map_err(fail)?;

    Ok(Json(InvoicePage {
        items: invoices.into_iter().map(InvoiceResponse::from).collect(),
        total,
        limit: window.limit,
        offset: window.offset,
        has_next: window.has_next(total),
        next_offset: window.next_offset(total),
    }))
}
