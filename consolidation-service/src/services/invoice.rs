//! Invoice headers and detail lines registered by the invoicing side, and the
//! filters used to browse them.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::config::EngineSettings;
use crate::services::error::{ConsolidationError, InvalidInput};
use crate::services::fingerprint::canonical_amount;
use crate::services::ingestion::{check_length, check_magnitude};
use crate::services::query::{contains_pattern, PageWindow};

const MAX_KEY_LEN: usize = 64;
const MAX_NAME_LEN: usize = 255;
const MAX_STATUS_LEN: usize = 32;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetailInput {
    pub invoice_detail_id: Option<String>,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub qty: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub ppn_percent: Option<Decimal>,
    pub ppn: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceInput {
    pub invoice_header_id: Option<String>,
    pub invoice_no: Option<String>,
    pub invoice_date: Option<String>,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub status: Option<String>,
    pub total_amount: Option<Decimal>,
    pub total_tax: Option<Decimal>,
    pub company_code: Option<String>,
    #[serde(default)]
    pub details: Vec<InvoiceDetailInput>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewInvoiceDetail {
    pub id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewInvoice {
    pub id: String,
    pub invoice_no: String,
    pub invoice_date: NaiveDateTime,
    pub customer_id: String,
    pub customer_name: String,
    pub status: String,
    pub total_amount: Decimal,
    pub total_tax: Decimal,
    pub company_code: String,
    pub details: Vec<NewInvoiceDetail>,
}

fn parse_invoice_date(raw: &str) -> Result<NaiveDateTime, ConsolidationError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(ConsolidationError::invalid(
            InvalidInput::MissingField,
            "invoiceDate is required",
        ));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_local());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ConsolidationError::UnsupportedDateFormat(s.to_string()))
}

fn trimmed(value: &Option<String>) -> String {
    value.as_deref().unwrap_or_default().trim().to_string()
}

fn keyed(value: &Option<String>, field: &str, max: usize) -> Result<String, ConsolidationError> {
    let value = trimmed(value);
    check_length(&value, field, max)?;
    Ok(value)
}

/// Detail quantities and prices are stored as `NUMERIC(15, 4)`.
fn line_value(value: Option<Decimal>, field: &str) -> Result<Decimal, ConsolidationError> {
    check_magnitude(value.unwrap_or_default().round_dp(4), field, 15, 4)
}

fn validate_detail(
    index: usize,
    input: &InvoiceDetailInput,
) -> Result<NewInvoiceDetail, ConsolidationError> {
    let field = |name: &str| format!("details[{}].{}", index, name);

    let id = keyed(&input.invoice_detail_id, &field("invoiceDetailId"), MAX_KEY_LEN)?;
    if id.is_empty() {
        return Err(ConsolidationError::invalid(
            InvalidInput::MissingField,
            format!("{} is required", field("invoiceDetailId")),
        ));
    }
    let product_id = keyed(&input.product_id, &field("productId"), MAX_KEY_LEN)?;
    if product_id.is_empty() {
        return Err(ConsolidationError::invalid(
            InvalidInput::MissingField,
            format!("{} is required", field("productId")),
        ));
    }

    Ok(NewInvoiceDetail {
        id,
        product_id,
        product_name: keyed(&input.product_name, &field("productName"), MAX_NAME_LEN)?,
        quantity: line_value(input.qty, &field("qty"))?,
        unit_price: line_value(input.unit_price, &field("unitPrice"))?,
        amount: line_value(input.amount, &field("amount"))?,
        tax_rate: check_magnitude(
            canonical_amount(input.ppn_percent.unwrap_or_default()),
            &field("ppnPercent"),
            5,
            2,
        )?,
        tax_amount: line_value(input.ppn, &field("ppn"))?,
    })
}

pub fn validate_invoice(input: &InvoiceInput) -> Result<NewInvoice, ConsolidationError> {
    let id = keyed(&input.invoice_header_id, "invoiceHeaderId", MAX_KEY_LEN)?;
    if id.is_empty() {
        return Err(ConsolidationError::invalid(
            InvalidInput::MissingField,
            "invoiceHeaderId is required",
        ));
    }
    let invoice_no = keyed(&input.invoice_no, "invoiceNo", MAX_KEY_LEN)?;
    if invoice_no.is_empty() {
        return Err(ConsolidationError::invalid(
            InvalidInput::MissingField,
            "invoiceNo is required",
        ));
    }

    let total_amount = canonical_amount(input.total_amount.unwrap_or_default());
    let total_tax = canonical_amount(input.total_tax.unwrap_or_default());
    if total_amount < Decimal::ZERO || total_tax < Decimal::ZERO {
        return Err(ConsolidationError::invalid(
            InvalidInput::Amount,
            "totalAmount and totalTax must not be negative",
        ));
    }
    check_magnitude(total_amount, "totalAmount", 15, 2)?;
    check_magnitude(total_tax, "totalTax", 15, 2)?;

    let status = match keyed(&input.status, "status", MAX_STATUS_LEN)? {
        s if s.is_empty() => "pending".to_string(),
        s => s,
    };

    let details = input
        .details
        .iter()
        .enumerate()
        .map(|(i, d)| validate_detail(i, d))
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen = HashSet::new();
    if let Some(repeated) = details.iter().find(|d| !seen.insert(d.id.as_str())) {
        return Err(ConsolidationError::validation(format!(
            "invoiceDetailId {} appears more than once",
            repeated.id
        )));
    }

    Ok(NewInvoice {
        id,
        invoice_no,
        invoice_date: parse_invoice_date(input.invoice_date.as_deref().unwrap_or_default())?,
        customer_id: keyed(&input.customer_id, "customerId", MAX_KEY_LEN)?,
        customer_name: keyed(&input.customer_name, "customerName", MAX_NAME_LEN)?,
        status,
        total_amount,
        total_tax,
        company_code: keyed(&input.company_code, "companyCode", MAX_KEY_LEN)?,
        details,
    })
}

// ============================================================================
// Listing
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceListParams {
    pub status: Option<String>,
    pub customer_id: Option<String>,
    pub invoice_no: Option<String>,
    pub company_code: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

/// Resolved invoice filter; both date bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceFilter {
    pub status: Option<String>,
    pub customer_id: Option<String>,
    /// Already escaped and wrapped in `%` for ILIKE.
    pub invoice_no_pattern: Option<String>,
    pub company_code: Option<String>,
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    Some(trimmed(value)).filter(|v| !v.is_empty())
}

impl InvoiceListParams {
    pub fn window(&self, settings: &EngineSettings) -> PageWindow {
        PageWindow::resolve(self.limit.as_deref(), self.offset.as_deref(), settings)
    }

    pub fn filter(&self) -> Result<InvoiceFilter, ConsolidationError> {
        Ok(InvoiceFilter {
            status: non_blank(&self.status),
            customer_id: non_blank(&self.customer_id),
            invoice_no_pattern: non_blank(&self.invoice_no).map(|n| contains_pattern(&n)),
            company_code: non_blank(&self.company_code),
            from: non_blank(&self.start_date)
                .map(|d| parse_invoice_date(&d))
                .transpose()?,
            to: non_blank(&self.end_date)
                .map(|d| parse_invoice_date(&d))
                .transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> InvoiceInput {
        InvoiceInput {
            invoice_header_id: Some("INV-1".into()),
            invoice_no: Some("SO/2025/0001".into()),
            invoice_date: Some("2025-11-20".into()),
            total_amount: Some(Decimal::new(100000, 2)),
            ..Default::default()
        }
    }

    fn detail(id: &str) -> InvoiceDetailInput {
        InvoiceDetailInput {
            invoice_detail_id: Some(id.into()),
            product_id: Some("SKU-9".into()),
            product_name: Some("Semen 50kg".into()),
            qty: Some(Decimal::new(25, 1)),
            unit_price: Some(Decimal::new(1234567, 5)),
            amount: Some(Decimal::new(3086, 2)),
            ppn_percent: Some(Decimal::from(11)),
            ppn: Some(Decimal::new(339, 2)),
        }
    }

    #[test]
    fn defaults_status_to_pending() {
        let invoice = validate_invoice(&input()).unwrap();
        assert_eq!(invoice.status, "pending");
        assert_eq!(invoice.total_tax, Decimal::ZERO);
        assert_eq!(invoice.invoice_date.to_string(), "2025-11-20 00:00:00");
        assert!(invoice.details.is_empty());
    }

    #[test]
    fn requires_ids_and_non_negative_total() {
        assert!(validate_invoice(&InvoiceInput { invoice_header_id: None, ..input() }).is_err());
        assert!(validate_invoice(&InvoiceInput { invoice_no: Some(" ".into()), ..input() }).is_err());
        assert!(validate_invoice(&InvoiceInput {
            total_amount: Some(Decimal::new(-1, 0)),
            ..input()
        })
        .is_err());
    }

    #[test]
    fn date_accepts_rfc3339_but_not_slashes() {
        let ok = validate_invoice(&InvoiceInput {
            invoice_date: Some("2025-11-20T10:00:00Z".into()),
            ..input()
        })
        .unwrap();
        assert_eq!(ok.invoice_date.to_string(), "2025-11-20 10:00:00");

        let err = validate_invoice(&InvoiceInput {
            invoice_date: Some("20/11/2025".into()),
            ..input()
        })
        .unwrap_err();
        assert!(matches!(err, ConsolidationError::UnsupportedDateFormat(_)));
    }

    #[test]
    fn rejects_header_values_beyond_column_limits() {
        let long_name = InvoiceInput {
            customer_name: Some("n".repeat(256)),
            ..input()
        };
        let huge_total = InvoiceInput {
            total_amount: Some(Decimal::from(10_000_000_000_000i64)),
            ..input()
        };

        assert!(matches!(
            validate_invoice(&long_name).unwrap_err(),
            ConsolidationError::Validation { kind: InvalidInput::TooLong, .. }
        ));
        assert!(matches!(
            validate_invoice(&huge_total).unwrap_err(),
            ConsolidationError::Validation { kind: InvalidInput::Amount, .. }
        ));
    }

    #[test]
    fn detail_lines_are_validated_and_rounded() {
        let invoice = validate_invoice(&InvoiceInput {
            details: vec![detail("D-1"), detail("D-2")],
            ..input()
        })
        .unwrap();

        assert_eq!(invoice.details.len(), 2);
        assert_eq!(invoice.details[0].unit_price, Decimal::new(123457, 4));
        assert_eq!(invoice.details[1].tax_rate, Decimal::from(11));

        let missing_product = InvoiceInput {
            details: vec![InvoiceDetailInput {
                product_id: None,
                ..detail("D-1")
            }],
            ..input()
        };
        let err = validate_invoice(&missing_product).unwrap_err();
        assert_eq!(err.to_string(), "details[0].productId is required");

        let repeated = InvoiceInput {
            details: vec![detail("D-1"), detail("D-1")],
            ..input()
        };
        assert!(validate_invoice(&repeated).is_err());
    }

    #[test]
    fn list_filter_escapes_invoice_no_and_parses_dates() {
        let filter = InvoiceListParams {
            invoice_no: Some("2025_0".into()),
            status: Some(" ".into()),
            start_date: Some("2025-11-01".into()),
            end_date: Some("2025-11-30T23:59:59+07:00".into()),
            ..Default::default()
        }
        .filter()
        .unwrap();

        assert_eq!(filter.invoice_no_pattern.as_deref(), Some("%2025\\_0%"));
        assert_eq!(filter.status, None);
        assert_eq!(filter.from.unwrap().to_string(), "2025-11-01 00:00:00");
        assert_eq!(filter.to.unwrap().to_string(), "2025-11-30 23:59:59");

        let bad = InvoiceListParams {
            end_date: Some("30/11/2025".into()),
            ..Default::default()
        };
        assert!(bad.filter().is_err());
    }

    #[test]
    fn list_window_uses_shared_paging_rules() {
        let settings = EngineSettings::default();
        let params = InvoiceListParams {
            limit: Some("900".into()),
            offset: Some("-4".into()),
            ..Default::default()
        };
        assert_eq!(params.window(&settings), PageWindow { limit: 500, offset: 0 });
    }
}
