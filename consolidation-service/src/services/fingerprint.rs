//! Content fingerprint of a bank statement line.
//!
//! Two lines with the same normalized date, description, branch, amount,
//! direction and bank produce the same fingerprint, which is what makes
//! re-importing a statement a no-op.

use chrono::NaiveDateTime;
use rust_decimal::{Decimal, RoundingStrategy};
use sha2::{Digest, Sha256};

use crate::models::AmountType;

const FIELD_DELIMITER: &str = "|";
const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders an amount the way it is stored: two decimals, midpoint away from
/// zero.
pub fn canonical_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn fingerprint(
    transaction_date: NaiveDateTime,
    description: &str,
    branch: &str,
    amount: Decimal,
    amount_type: AmountType,
    bank_code: &str,
) -> String {
    let date = transaction_date.format(CANONICAL_DATE_FORMAT).to_string();
    let description = description.trim().to_lowercase();
    let amount = format!("{:.2}", canonical_amount(amount));

    let base = [
        date.as_str(),
        description.as_str(),
        branch.trim(),
        amount.as_str(),
        amount_type.as_str(),
        bank_code.trim(),
    ]
    .join(FIELD_DELIMITER);

    hex::encode(Sha256::digest(base.as_bytes()))
}
