//! Request and response bodies of the HTTP API. Field names are camelCase;
//! money is rendered as decimal strings.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{AttachedInvoice, BankEntry, InvoiceDetail, InvoiceHeader, ReconcileOutcome};
use crate::services::allocation::AllocationRequest;
use crate::services::ingestion::{BulkOutcome, RejectReason};

pub use crate::services::ingestion::BankEntryInput;
pub use crate::services::invoice::{InvoiceInput, InvoiceListParams};
pub use crate::services::query::ListParams;

// ============================================================================
// Bank entries
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBankEntryResponse {
    pub id: String,
    pub created: bool,
}

#[derive(Debug, Serialize)]
pub struct EntryIdResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct RejectedRowResponse {
    pub index: usize,
    pub reason: RejectReason,
}

#[derive(Debug, Serialize)]
pub struct BulkCreateResponse {
    pub inserted: u64,
    pub skipped: u64,
    pub duplicates: u64,
    pub total: u64,
    pub rejected: Vec<RejectedRowResponse>,
}

impl From<BulkOutcome> for BulkCreateResponse {
    fn from(outcome: BulkOutcome) -> Self {
        Self {
            inserted: outcome.inserted,
            skipped: outcome.skipped,
            duplicates: outcome.duplicates,
            total: outcome.total,
            rejected: outcome
                .rejected
                .into_iter()
                .map(|r| RejectedRowResponse {
                    index: r.index,
                    reason: r.reason,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankEntryResponse {
    pub id: String,
    pub transaction_date: NaiveDateTime,
    pub description: String,
    pub branch: String,
    pub amount: Decimal,
    pub amount_type: String,
    pub balance: Decimal,
    pub bank_code: String,
    pub attached_count: i64,
    pub matched_total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BankEntry> for BankEntryResponse {
    fn from(entry: BankEntry) -> Self {
        Self {
            id: entry.id,
            transaction_date: entry.transaction_date,
            description: entry.description,
            branch: entry.branch,
            amount: entry.amount,
            amount_type: entry.amount_type,
            balance: entry.balance,
            bank_code: entry.bank_code,
            attached_count: entry.attached_count,
            matched_total: entry.matched_total,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankEntryPage {
    pub items: Vec<BankEntryResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_next: bool,
    pub next_offset: i64,
}

/// A listing is either a page envelope or, with `flat=1`, a bare array.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BankEntryListResponse {
    Page(BankEntryPage),
    Flat(Vec<BankEntryResponse>),
}

// ============================================================================
// Reconciliation
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct InvoiceAllocation {
    #[serde(default)]
    pub id: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    #[serde(default)]
    pub invoices: Vec<InvoiceAllocation>,
    pub note: Option<String>,
    pub mode: Option<String>,
}

impl ReconcileRequest {
    pub fn allocations(self) -> Vec<AllocationRequest> {
        self.invoices
            .into_iter()
            .map(|i| AllocationRequest {
                invoice_id: i.id,
                amount: i.amount,
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub inserted_count: u64,
    pub removed_count: u64,
    pub mode: &'static str,
}

impl From<ReconcileOutcome> for ReconcileResponse {
    fn from(outcome: ReconcileOutcome) -> Self {
        Self {
            inserted_count: outcome.inserted_count,
            removed_count: outcome.removed_count,
            mode: outcome.mode.as_str(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedInvoiceResponse {
    pub id: String,
    pub invoice_no: String,
    pub invoice_date: NaiveDateTime,
    pub customer_id: String,
    pub customer_name: String,
    pub status: String,
    pub total_amount: Decimal,
    pub total_tax: Decimal,
    pub company_code: String,
    pub matched_amount: Decimal,
    pub note: String,
}

impl From<AttachedInvoice> for AttachedInvoiceResponse {
    fn from(invoice: AttachedInvoice) -> Self {
        Self {
            id: invoice.id,
            invoice_no: invoice.invoice_no,
            invoice_date: invoice.invoice_date,
            customer_id: invoice.customer_id,
            customer_name: invoice.customer_name,
            status: invoice.status,
            total_amount: invoice.total_amount,
            total_tax: invoice.total_tax,
            company_code: invoice.company_code,
            matched_amount: invoice.matched_amount,
            note: invoice.note,
        }
    }
}

// ============================================================================
// Invoices
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceResponse {
    pub invoice_header_id: String,
    pub invoice_no: String,
    pub total_details: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResponse {
    pub id: String,
    pub invoice_no: String,
    pub invoice_date: NaiveDateTime,
    pub customer_id: String,
    pub customer_name: String,
    pub status: String,
    pub total_amount: Decimal,
    pub total_tax: Decimal,
    pub company_code: String,
    pub matched_total: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<InvoiceHeader> for InvoiceResponse {
    fn from(invoice: InvoiceHeader) -> Self {
        Self {
            id: invoice.id,
            invoice_no: invoice.invoice_no,
            invoice_date: invoice.invoice_date,
            customer_id: invoice.customer_id,
            customer_name: invoice.customer_name,
            status: invoice.status,
            total_amount: invoice.total_amount,
            total_tax: invoice.total_tax,
            company_code: invoice.company_code,
            matched_total: invoice.matched_total,
            created_at: invoice.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetailResponse {
    pub invoice_detail_id: String,
    pub product_id: String,
    pub product_name: String,
    pub qty: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
    pub ppn_percent: Decimal,
    pub ppn: Decimal,
}

impl From<InvoiceDetail> for InvoiceDetailResponse {
    fn from(detail: InvoiceDetail) -> Self {
        Self {
            invoice_detail_id: detail.id,
            product_id: detail.product_id,
            product_name: detail.product_name,
            qty: detail.quantity,
            unit_price: detail.unit_price,
            amount: detail.amount,
            ppn_percent: detail.tax_rate,
            ppn: detail.tax_amount,
        }
    }
}

/// A single invoice: the header fields at top level plus its lines.
#[derive(Debug, Serialize)]
pub struct InvoiceDetailsResponse {
    #[serde(flatten)]
    pub invoice: InvoiceResponse,
    pub details: Vec<InvoiceDetailResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePage {
    pub items: Vec<InvoiceResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_next: bool,
    pub next_offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reconcile_request_tolerates_missing_fields() {
        let req: ReconcileRequest = serde_json::from_value(json!({
            "invoices": [{"id": "INV-1", "amount": "10.50"}, {"amount": 3}]
        }))
        .unwrap();

        assert!(req.mode.is_none());
        let allocations = req.allocations();
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].amount, Decimal::new(1050, 2));
        assert_eq!(allocations[1].invoice_id, "");
    }

    #[test]
    fn flat_listing_serializes_as_array() {
        let flat = serde_json::to_value(BankEntryListResponse::Flat(vec![])).unwrap();
        assert_eq!(flat, json!([]));

        let page = serde_json::to_value(BankEntryListResponse::Page(BankEntryPage {
            items: vec![],
            total: 0,
            limit: 50,
            offset: 0,
            has_next: false,
            next_offset: 0,
        }))
        .unwrap();
        assert_eq!(page["hasNext"], json!(false));
        assert_eq!(page["nextOffset"], json!(0));
    }

    #[test]
    fn reject_reasons_are_snake_case() {
        let row = RejectedRowResponse {
            index: 2,
            reason: RejectReason::InvalidAmountType,
        };
        assert_eq!(
            serde_json::to_value(row).unwrap(),
            json!({"index": 2, "reason": "invalid_amount_type"})
        );
    }

    #[test]
    fn invoice_view_keeps_header_fields_at_top_level() {
        let view = InvoiceDetailsResponse {
            invoice: InvoiceResponse {
                id: "INV-1".into(),
                invoice_no: "NO-1".into(),
                invoice_date: chrono::NaiveDate::from_ymd_opt(2025, 11, 20)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
                customer_id: String::new(),
                customer_name: String::new(),
                status: "pending".into(),
                total_amount: Decimal::new(11100, 2),
                total_tax: Decimal::new(1100, 2),
                company_code: String::new(),
                matched_total: Decimal::ZERO,
                created_at: Utc::now(),
            },
            details: vec![InvoiceDetailResponse {
                invoice_detail_id: "D-1".into(),
                product_id: "SKU-1".into(),
                product_name: "Produk".into(),
                qty: Decimal::ONE,
                unit_price: Decimal::from(100),
                amount: Decimal::from(100),
                ppn_percent: Decimal::from(11),
                ppn: Decimal::from(11),
            }],
        };

        let value = serde_json::to_value(view).unwrap();
        assert_eq!(value["matchedTotal"], json!("0"));
        assert_eq!(value["totalAmount"], json!("111.00"));
        assert_eq!(value["details"][0]["invoiceDetailId"], json!("D-1"));
        assert_eq!(value["details"][0]["ppnPercent"], json!("11"));
    }
}
