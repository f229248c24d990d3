//! Domain models for consolidation-service.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Bank Entry Models
// ============================================================================

/// Direction of a statement line as printed by the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AmountType {
    #[serde(rename = "CR")]
    Credit,
    #[serde(rename = "DB")]
    Debit,
}

impl AmountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "CR",
            Self::Debit => "DB",
        }
    }

    /// Accepts exactly `CR` or `DB`, ignoring surrounding whitespace.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "CR" => Some(Self::Credit),
            "DB" => Some(Self::Debit),
            _ => None,
        }
    }
}

/// A live bank entry together with the aggregates derived from its
/// allocation rows.
#[derive(Debug, Clone, FromRow)]
pub struct BankEntry {
    pub id: String,
    pub transaction_date: NaiveDateTime,
    pub description: String,
    pub branch: String,
    pub amount: Decimal,
    pub amount_type: String,
    pub balance: Decimal,
    pub bank_code: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub attached_count: i64,
    pub matched_total: Decimal,
}

// ============================================================================
// Invoice Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct InvoiceHeader {
    pub id: String,
    pub invoice_no: String,
    pub invoice_date: NaiveDateTime,
    pub customer_id: String,
    pub customer_name: String,
    pub status: String,
    pub total_amount: Decimal,
    pub total_tax: Decimal,
    pub company_code: String,
    pub created_at: DateTime<Utc>,
    pub matched_total: Decimal,
}

#[derive(Debug, Clone, FromRow)]
pub struct InvoiceDetail {
    pub id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
}

// ============================================================================
// Allocation Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileMode {
    #[default]
    Replace,
    Append,
}

impl ReconcileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Append => "append",
        }
    }

    /// Blank means the default (`replace`); unknown modes are rejected.
    pub fn parse(s: Option<&str>) -> Option<Self> {
        match s.map(str::trim) {
            None | Some("") => Some(Self::Replace),
            Some(m) if m.eq_ignore_ascii_case("replace") => Some(Self::Replace),
            Some(m) if m.eq_ignore_ascii_case("append") => Some(Self::Append),
            Some(_) => None,
        }
    }
}

/// An invoice a bank entry is allocated to, with the amount that entry
/// contributed.
#[derive(Debug, Clone, FromRow)]
pub struct AttachedInvoice {
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

/// Outcome of one reconcile call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub mode: ReconcileMode,
    pub inserted_count: u64,
    pub removed_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_type_accepts_only_exact_codes() {
        assert_eq!(AmountType::parse("CR"), Some(AmountType::Credit));
        assert_eq!(AmountType::parse(" DB "), Some(AmountType::Debit));
        assert_eq!(AmountType::parse("cr"), None);
        assert_eq!(AmountType::parse("CREDIT"), None);
        assert_eq!(AmountType::parse(""), None);
    }

    #[test]
    fn reconcile_mode_defaults_to_replace() {
        assert_eq!(ReconcileMode::parse(None), Some(ReconcileMode::Replace));
        assert_eq!(ReconcileMode::parse(Some("  ")), Some(ReconcileMode::Replace));
        assert_eq!(ReconcileMode::parse(Some("APPEND")), Some(ReconcileMode::Append));
        assert_eq!(ReconcileMode::parse(Some("Replace")), Some(ReconcileMode::Replace));
        assert_eq!(ReconcileMode::parse(Some("merge")), None);
    }
}
