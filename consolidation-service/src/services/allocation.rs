//! Allocation planning for reconcile requests.

use std::collections::HashSet;

use rust_decimal::Decimal;

use crate::models::ReconcileMode;
use crate::services::error::ConsolidationError;
use crate::services::fingerprint::canonical_amount;

/// One requested (invoice, amount) pair as received.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRequest {
    pub invoice_id: String,
    pub amount: Decimal,
}

/// A normalized reconcile request, ready to be applied in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPlan {
    pub mode: ReconcileMode,
    pub note: String,
    pub allocations: Vec<AllocationRequest>,
}

impl AllocationPlan {
    pub fn invoice_ids(&self) -> Vec<String> {
        self.allocations.iter().map(|a| a.invoice_id.clone()).collect()
    }

    /// Nothing to write and nothing to clear.
    pub fn is_noop(&self) -> bool {
        self.allocations.is_empty() && self.mode == ReconcileMode::Append
    }
}

/// Drops blank ids, keeps the first occurrence of each invoice, rounds
/// amounts to cents and rejects negative amounts and unknown modes.
pub fn plan_allocations(
    requested: Vec<AllocationRequest>,
    note: Option<&str>,
    mode: Option<&str>,
) -> Result<AllocationPlan, ConsolidationError> {
    let mode = ReconcileMode::parse(mode).ok_or_else(|| {
        ConsolidationError::validation(format!(
            "mode must be replace or append, got {:?}",
            mode.unwrap_or_default()
        ))
    })?;

    let mut seen = HashSet::new();
    let mut allocations = Vec::with_capacity(requested.len());

    for request in requested {
        let invoice_id = request.invoice_id.trim();
        if invoice_id.is_empty() || !seen.insert(invoice_id.to_string()) {
            continue;
        }

        let amount = canonical_amount(request.amount);
        if amount < Decimal::ZERO {
            return Err(ConsolidationError::validation(format!(
                "amount for invoice {} must not be negative",
                invoice_id
            )));
        }

        allocations.push(AllocationRequest {
            invoice_id: invoice_id.to_string(),
            amount,
        });
    }

    Ok(AllocationPlan {
        mode,
        note: note.map(str::trim).unwrap_or_default().to_string(),
        allocations,
    })
}

/// Rejects a request that would push an invoice's matched total past its
/// total amount by more than `tolerance`. `existing_matched` must exclude
/// the entry being reconciled.
pub fn check_allocation(
    invoice_id: &str,
    total_amount: Decimal,
    existing_matched: Decimal,
    requested_amount: Decimal,
    tolerance: Decimal,
) -> Result<(), ConsolidationError> {
    if existing_matched + requested_amount > total_amount + tolerance {
        return Err(ConsolidationError::OverAllocation {
            invoice_id: invoice_id.to_string(),
            total_amount,
            existing_matched,
            requested_amount,
        });
    }
    Ok(())
}
