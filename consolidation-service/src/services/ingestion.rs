//! Validation and normalization of incoming bank statement lines.
//!
//! Everything here is pure: candidates are turned into [`NewBankEntry`] values
//! (or rejected) before the store is touched.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::AmountType;
use crate::services::error::{ConsolidationError, InvalidInput};
use crate::services::fingerprint::{canonical_amount, fingerprint};

/// Column limits of `bank_entries`.
pub const MAX_ID_LEN: usize = 64;
pub const MAX_BRANCH_LEN: usize = 32;
pub const MAX_BANK_CODE_LEN: usize = 20;
/// `NUMERIC(18, 2)` for `amount` and `balance`.
pub const AMOUNT_PRECISION: u32 = 18;
pub const AMOUNT_SCALE: u32 = 2;

/// A bank entry as submitted by a caller. Every field is optional so that
/// missing values surface as validation errors instead of decode failures.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankEntryInput {
    pub id: Option<String>,
    pub transaction_date: Option<String>,
    pub description: Option<String>,
    pub branch: Option<String>,
    pub amount: Option<Decimal>,
    pub amount_type: Option<String>,
    pub balance: Option<Decimal>,
    pub bank_code: Option<String>,
}

/// A validated entry ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBankEntry {
    pub id: String,
    pub transaction_date: NaiveDateTime,
    pub description: String,
    pub branch: String,
    pub amount: Decimal,
    pub amount_type: AmountType,
    pub balance: Decimal,
    pub bank_code: String,
    pub fingerprint: String,
}

/// Why a bulk candidate was left out of the insert set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Malformed,
    MissingField,
    InvalidAmountType,
    InvalidAmount,
    InvalidDate,
    FieldTooLong,
    /// The row's id is already taken by an entry with different content.
    IdConflict,
}

impl From<InvalidInput> for RejectReason {
    fn from(kind: InvalidInput) -> Self {
        match kind {
            InvalidInput::MissingField => Self::MissingField,
            InvalidInput::AmountType => Self::InvalidAmountType,
            InvalidInput::Amount => Self::InvalidAmount,
            InvalidInput::Date => Self::InvalidDate,
            InvalidInput::TooLong => Self::FieldTooLong,
            InvalidInput::Other => Self::Malformed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub index: usize,
    pub reason: RejectReason,
}

/// Bulk candidates split into the rows to insert and the rows skipped.
#[derive(Debug, Default)]
pub struct BulkPlan {
    pub accepted: Vec<NewBankEntry>,
    /// Request index of each accepted row.
    pub accepted_index: Vec<usize>,
    pub rejected: Vec<RejectedRow>,
}

/// What the store did with the accepted rows of a bulk request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkInsertReport {
    pub inserted: u64,
    /// Positions within the accepted rows whose id belongs to an entry with
    /// other content.
    pub id_conflicts: Vec<usize>,
}

impl BulkPlan {
    /// Folds the store's report into the response counts. Id conflicts are
    /// reported as rejected rows, everything else not inserted is a duplicate.
    pub fn outcome(self, total: usize, report: BulkInsertReport) -> BulkOutcome {
        let mut rejected = self.rejected;
        rejected.extend(
            report
                .id_conflicts
                .iter()
                .filter_map(|pos| self.accepted_index.get(*pos))
                .map(|index| RejectedRow {
                    index: *index,
                    reason: RejectReason::IdConflict,
                }),
        );
        rejected.sort_by_key(|r| r.index);

        let settled = self.accepted.len().saturating_sub(report.id_conflicts.len());
        BulkOutcome::new(total, settled, report.inserted, rejected)
    }
}

/// Counts reported back for a bulk ingestion. `inserted + skipped +
/// duplicates == total` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOutcome {
    pub inserted: u64,
    pub skipped: u64,
    pub duplicates: u64,
    pub total: u64,
    pub rejected: Vec<RejectedRow>,
}

impl BulkOutcome {
    /// `inserted` is what the store reported for the accepted rows; whatever
    /// it did not insert was already present.
    pub fn new(total: usize, accepted: usize, inserted: u64, rejected: Vec<RejectedRow>) -> Self {
        let inserted = inserted.min(accepted as u64);
        Self {
            inserted,
            skipped: rejected.len() as u64,
            duplicates: accepted as u64 - inserted,
            total: total as u64,
            rejected,
        }
    }
}

/// Parses a statement date. Shapes are tried in order: `DD/MM/YYYY` when a
/// `/` is present, RFC 3339 with offset (kept as wall-clock time), bare
/// `YYYY-MM-DD`. Date-only shapes resolve to midnight.
pub fn parse_transaction_date(raw: &str) -> Result<NaiveDateTime, ConsolidationError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(ConsolidationError::invalid(
            InvalidInput::MissingField,
            "transactionDate is required",
        ));
    }

    let parsed = if s.contains('/') {
        NaiveDate::parse_from_str(s, "%d/%m/%Y")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    } else if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        Some(dt.naive_local())
    } else {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    };

    let parsed = parsed.ok_or_else(|| ConsolidationError::UnsupportedDateFormat(s.to_string()))?;

    if is_zero_date(parsed) {
        return Err(ConsolidationError::invalid(
            InvalidInput::Date,
            "transactionDate must not be the zero date",
        ));
    }

    Ok(parsed)
}

fn is_zero_date(dt: NaiveDateTime) -> bool {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .is_some_and(|zero| dt == zero)
}

/// Identity for entries submitted without one.
pub fn generate_entry_id() -> String {
    format!("BE-{}", Uuid::new_v4().simple())
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, ConsolidationError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ConsolidationError::invalid(InvalidInput::MissingField, format!("{} is required", field))
        })
}

/// Rejects values longer than a `VARCHAR(max)` column holds.
pub(crate) fn check_length(value: &str, field: &str, max: usize) -> Result<(), ConsolidationError> {
    if value.chars().count() > max {
        return Err(ConsolidationError::invalid(
            InvalidInput::TooLong,
            format!("{} must be at most {} characters", field, max),
        ));
    }
    Ok(())
}

/// Rejects values that do not fit a `NUMERIC(precision, scale)` column. The
/// value must already be rounded to `scale` places.
pub(crate) fn check_magnitude(
    value: Decimal,
    field: &str,
    precision: u32,
    scale: u32,
) -> Result<Decimal, ConsolidationError> {
    let bound = Decimal::from_i128_with_scale(10_i128.pow(precision.saturating_sub(scale)), 0);
    if value.abs() >= bound {
        return Err(ConsolidationError::invalid(
            InvalidInput::Amount,
            format!("{} must be below {}", field, bound),
        ));
    }
    Ok(value)
}

fn amount_type(value: &Option<String>) -> Result<AmountType, ConsolidationError> {
    value
        .as_deref()
        .and_then(AmountType::parse)
        .ok_or_else(|| {
            ConsolidationError::invalid(InvalidInput::AmountType, "amountType must be CR or DB")
        })
}

fn non_negative_amount(value: Option<Decimal>) -> Result<Decimal, ConsolidationError> {
    let amount = canonical_amount(value.unwrap_or_default());
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ConsolidationError::invalid(
            InvalidInput::Amount,
            "amount must not be negative",
        ));
    }
    check_magnitude(amount, "amount", AMOUNT_PRECISION, AMOUNT_SCALE)
}

fn balance(value: Option<Decimal>) -> Result<Decimal, ConsolidationError> {
    check_magnitude(
        canonical_amount(value.unwrap_or_default()),
        "balance",
        AMOUNT_PRECISION,
        AMOUNT_SCALE,
    )
}

fn check_columns(id: &str, branch: &str, bank_code: &str) -> Result<(), ConsolidationError> {
    check_length(id, "id", MAX_ID_LEN)?;
    check_length(branch, "branch", MAX_BRANCH_LEN)?;
    check_length(bank_code, "bankCode", MAX_BANK_CODE_LEN)
}

#[allow(clippy::too_many_arguments)]
fn build(
    id: String,
    transaction_date: NaiveDateTime,
    description: &str,
    branch: &str,
    amount: Decimal,
    amount_type: AmountType,
    balance: Decimal,
    bank_code: &str,
) -> NewBankEntry {
    NewBankEntry {
        fingerprint: fingerprint(
            transaction_date,
            description,
            branch,
            amount,
            amount_type,
            bank_code,
        ),
        id,
        transaction_date,
        description: description.to_string(),
        branch: branch.trim().to_string(),
        amount,
        amount_type,
        balance,
        bank_code: bank_code.trim().to_string(),
    }
}

/// Full validation used by single and bulk creation.
pub fn validate_new_entry(input: &BankEntryInput) -> Result<NewBankEntry, ConsolidationError> {
    required(&input.description, "description")?;
    let branch = required(&input.branch, "branch")?;
    let bank_code = required(&input.bank_code, "bankCode")?;
    let amount_type = amount_type(&input.amount_type)?;
    let transaction_date = parse_transaction_date(input.transaction_date.as_deref().unwrap_or(""))?;
    let amount = non_negative_amount(input.amount)?;
    let balance = balance(input.balance)?;

    let id = input
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
        .unwrap_or_else(generate_entry_id);
    check_columns(&id, branch, bank_code)?;

    // Description is kept verbatim; only the fingerprint normalizes it.
    let description = input.description.as_deref().unwrap_or_default();

    Ok(build(
        id,
        transaction_date,
        description,
        branch,
        amount,
        amount_type,
        balance,
        bank_code,
    ))
}

/// Validation for in-place updates: only the direction, bank code and date
/// are mandatory. The path id always wins over any id in the body.
pub fn validate_update(id: &str, input: &BankEntryInput) -> Result<NewBankEntry, ConsolidationError> {
    let amount_type = amount_type(&input.amount_type)?;
    let bank_code = required(&input.bank_code, "bankCode")?;
    let transaction_date = parse_transaction_date(input.transaction_date.as_deref().unwrap_or(""))?;
    let amount = non_negative_amount(input.amount)?;
    let balance = balance(input.balance)?;
    let branch = input.branch.as_deref().unwrap_or_default();
    check_columns(id, branch.trim(), bank_code)?;

    Ok(build(
        id.to_string(),
        transaction_date,
        input.description.as_deref().unwrap_or_default(),
        branch,
        amount,
        amount_type,
        balance,
        bank_code,
    ))
}

fn reject_reason(err: &ConsolidationError) -> RejectReason {
    match err {
        ConsolidationError::UnsupportedDateFormat(_) => RejectReason::InvalidDate,
        ConsolidationError::Validation { kind, .. } => (*kind).into(),
        _ => RejectReason::Malformed,
    }
}

/// Validates every candidate independently. A candidate that is not even a
/// well-formed entry object is rejected as malformed.
pub fn plan_bulk(candidates: Vec<serde_json::Value>) -> BulkPlan {
    let mut plan = BulkPlan::default();

    for (index, value) in candidates.into_iter().enumerate() {
        let outcome = serde_json::from_value::<BankEntryInput>(value)
            .map_err(|_| RejectReason::Malformed)
            .and_then(|input| validate_new_entry(&input).map_err(|e| reject_reason(&e)));

        match outcome {
            Ok(entry) => {
                plan.accepted.push(entry);
                plan.accepted_index.push(index);
            }
            Err(reason) => plan.rejected.push(RejectedRow { index, reason }),
        }
    }

    plan
}
