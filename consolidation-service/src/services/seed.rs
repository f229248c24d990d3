//! Development fixtures, loaded at startup when `SEED_DEV=1`.
//!
//! Everything goes through the normal ingestion path, so running the seed
//! twice leaves the store unchanged.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use crate::services::database::Database;
use crate::services::error::ConsolidationError;
use crate::services::ingestion::{validate_new_entry, BankEntryInput};
use crate::services::invoice::{NewInvoice, NewInvoiceDetail};

const SEED_INVOICE_COUNT: u32 = 20;

const CUSTOMERS: [(&str, &str); 5] = [
    ("CUST-001", "PT Contoh"),
    ("CUST-002", "CV Maju Jaya"),
    ("CUST-003", "Toko Abadi"),
    ("CUST-004", "UD Sentosa"),
    ("CUST-005", "PT Gemilang"),
];

/// Sample BRI statement lines: (id, description, branch, amount, balance).
const BRI_LINES: [(&str, &str, &str, &str, &str); 5] = [
    ("BE-001", "BI-FAST CR TANGGAL :28/11 TRANSFER   DR 002  DAHNIAR", "0000", "34244370.00", "342889691.38"),
    ("BE-002", "BI-FAST CR TRANSFER   DR 002 HAJAR NURUL A'IN", "0000", "1978000.00", "344867691.38"),
    ("BE-003", "TRSF E-BANKING CR 2911/FTSCY/WS95271 525150.00  Kaffeine ERIANSYAH, S.PI", "0000", "525150.00", "345392841.38"),
    ("BE-004", "TRSF E-BANKING CR 2911/FTSCY/WS95271 2961790.00  nota sinar anugrah 27 nov 2025  BUDI SANTOSO", "0000", "2961790.00", "348354631.38"),
    ("BE-005", "SWITCHING CR TRF 3 SRI ASTUTI  002  Web BRILink", "0998", "191000.00", "348545631.38"),
];

fn sample_invoices() -> Vec<NewInvoice> {
    (1..=SEED_INVOICE_COUNT)
        .filter_map(|i| {
            let (customer_id, customer_name) = CUSTOMERS[(i as usize) % CUSTOMERS.len()];
            let (month, day) = if i % 2 == 0 { (12, i) } else { (11, i + 5) };
            let invoice_date = NaiveDate::from_ymd_opt(2025, month, day)?.and_hms_opt(9, 0, 0)?;
            let net = Decimal::from(i * 125_000);
            let tax = (net * Decimal::new(11, 2)).round_dp(2);

            Some(NewInvoice {
                id: format!("INV-H-{:03}", i),
                invoice_no: format!("INV/2025/XII/{:04}", i),
                invoice_date,
                customer_id: customer_id.to_string(),
                customer_name: customer_name.to_string(),
                status: if i % 5 == 0 { "paid" } else { "pending" }.to_string(),
                total_amount: net + tax,
                total_tax: tax,
                company_code: if i % 3 == 0 { "COMP-02" } else { "COMP-01" }.to_string(),
                details: vec![NewInvoiceDetail {
                    id: format!("INV-D-{:03}", i),
                    product_id: format!("SKU-{:03}", i % 7 + 1),
                    product_name: format!("Produk {}", i % 7 + 1),
                    quantity: Decimal::from(i),
                    unit_price: Decimal::from(125_000),
                    amount: net,
                    tax_rate: Decimal::from(11),
                    tax_amount: tax,
                }],
            })
        })
        .collect()
}

fn sample_entries() -> Vec<BankEntryInput> {
    BRI_LINES
        .iter()
        .map(|(id, description, branch, amount, balance)| BankEntryInput {
            id: Some(id.to_string()),
            transaction_date: Some("2025-11-29".to_string()),
            description: Some(description.to_string()),
            branch: Some(branch.to_string()),
            amount: amount.parse().ok(),
            amount_type: Some("CR".to_string()),
            balance: balance.parse().ok(),
            bank_code: Some("BRI".to_string()),
        })
        .collect()
}

#[instrument(skip(db))]
pub async fn seed_dev_data(db: &Database) -> Result<(), ConsolidationError> {
    let mut invoices = 0;
    for invoice in sample_invoices() {
        if db.ensure_invoice(&invoice).await? {
            invoices += 1;
        }
    }

    let mut entries = 0;
    for input in sample_entries() {
        let entry = validate_new_entry(&input)?;
        match db.create_bank_entry(&entry).await {
            Ok((_, true)) => entries += 1,
            Ok((_, false)) | Err(ConsolidationError::Duplicate(_)) => {}
            Err(e) => return Err(e),
        }
    }

    info!(invoices = invoices, bank_entries = entries, "Development data seeded");
    Ok(())
}
