//! Integration tests for bank entry ingestion, listing and soft delete.

mod common;

use common::spawn_app;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;

fn dec(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("decimal string")).expect("decimal")
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn create_is_idempotent_on_content() {
    let app = spawn_app().await;

    let first = app.post("/bank-entries", &app.entry("BI-FAST CR TRANSFER", "100.00")).await;
    assert_eq!(first.status(), 201);
    let first: Value = first.json().await.unwrap();
    assert_eq!(first["created"], json!(true));

    let mut again = app.entry("  bi-fast cr transfer ", "100");
    again["transactionDate"] = json!("2025-11-29");
    let second: Value = app.post("/bank-entries", &again).await.json().await.unwrap();

    assert_eq!(second["created"], json!(false));
    assert_eq!(second["id"], first["id"]);

    let page: Value = app
        .get(&format!("/bank-entries?bankCode={}", app.bank_code))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], json!(1));
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn create_rejects_invalid_input() {
    let app = spawn_app().await;

    let mut missing_branch = app.entry("x", "1");
    missing_branch["branch"] = json!(" ");
    assert_eq!(app.post("/bank-entries", &missing_branch).await.status(), 400);

    let mut bad_date = app.entry("x", "1");
    bad_date["transactionDate"] = json!("Nov 29 2025");
    let response = app.post("/bank-entries", &bad_date).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("unsupported date format"));
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn bulk_skips_invalid_rows() {
    let app = spawn_app().await;

    let rows: Vec<Value> = (0..10)
        .map(|i| {
            let mut row = app.entry(&format!("transfer {i}"), &format!("{}.00", 1000 + i));
            if i % 3 == 0 && i > 0 {
                row["branch"] = json!("");
            }
            row
        })
        .collect();

    let response = app.post("/bank-entries/bulk", &json!(rows)).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();

    assert_eq!(body["inserted"], json!(7));
    assert_eq!(body["skipped"], json!(3));
    assert_eq!(body["duplicates"], json!(0));
    assert_eq!(body["total"], json!(10));
    assert_eq!(body["rejected"].as_array().unwrap().len(), 3);

    // Re-submitting in reverse order only finds duplicates.
    let mut reversed = rows.clone();
    reversed.reverse();
    let body: Value = app
        .post("/bank-entries/bulk", &json!(reversed))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["inserted"], json!(0));
    assert_eq!(body["duplicates"], json!(7));
    assert_eq!(body["skipped"], json!(3));
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn bulk_skips_row_exceeding_column_limits() {
    let app = spawn_app().await;

    let rows: Vec<Value> = (0..10)
        .map(|i| {
            let mut row = app.entry(&format!("limits {i}"), "10.00");
            if i == 5 {
                row["branch"] = json!("B".repeat(40));
            }
            row
        })
        .collect();

    let response = app.post("/bank-entries/bulk", &json!(rows)).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();

    assert_eq!(body["inserted"], json!(9));
    assert_eq!(body["skipped"], json!(1));
    assert_eq!(body["total"], json!(10));
    assert_eq!(body["rejected"], json!([{"index": 5, "reason": "field_too_long"}]));

    let page: Value = app
        .get(&format!("/bank-entries?bankCode={}", app.bank_code))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], json!(9));

    let mut single = app.entry("oversized single", "1.00");
    single["branch"] = json!("B".repeat(40));
    assert_eq!(app.post("/bank-entries", &single).await.status(), 400);

    let mut huge = app.entry("oversized amount", "1.00");
    huge["amount"] = json!("10000000000000000");
    assert_eq!(app.post("/bank-entries", &huge).await.status(), 400);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn bulk_reports_id_conflicts_instead_of_duplicates() {
    let app = spawn_app().await;
    let taken = format!("BE-{}-taken", app.bank_code);
    let shared = format!("BE-{}-shared", app.bank_code);

    let mut existing = app.entry("already stored", "5.00");
    existing["id"] = json!(taken);
    assert_eq!(app.post("/bank-entries", &existing).await.status(), 201);

    let mut first = app.entry("first claim", "1.00");
    first["id"] = json!(shared);
    let mut second = app.entry("second claim", "2.00");
    second["id"] = json!(shared);
    let mut clash = app.entry("other content", "3.00");
    clash["id"] = json!(taken);
    let repeat = existing.clone();

    let body: Value = app
        .post("/bank-entries/bulk", &json!([first, second, clash, repeat]))
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(body["inserted"], json!(1));
    assert_eq!(body["duplicates"], json!(1));
    assert_eq!(body["skipped"], json!(2));
    assert_eq!(
        body["rejected"],
        json!([
            {"index": 1, "reason": "id_conflict"},
            {"index": 2, "reason": "id_conflict"}
        ])
    );

    let stored: Value = app.get(&format!("/bank-entries/{}", shared)).await.json().await.unwrap();
    assert_eq!(stored["description"], json!("first claim"));
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn bulk_rejects_empty_list() {
    let app = spawn_app().await;
    assert_eq!(app.post("/bank-entries/bulk", &json!([])).await.status(), 400);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn list_requires_bank_code_and_paginates() {
    let app = spawn_app().await;

    assert_eq!(app.get("/bank-entries").await.status(), 400);

    for i in 0..3 {
        app.create_entry(&format!("entry {i}"), "10.00").await;
    }

    let page: Value = app
        .get(&format!("/bank-entries?bankCode={}&limit=2", app.bank_code))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], json!(3));
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
    assert_eq!(page["hasNext"], json!(true));
    assert_eq!(page["nextOffset"], json!(2));

    let last: Value = app
        .get(&format!("/bank-entries?bankCode={}&limit=2&offset=2", app.bank_code))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(last["hasNext"], json!(false));
    assert_eq!(last["nextOffset"], json!(2));

    let flat: Value = app
        .get(&format!("/bank-entries?bankCode={}&flat=true", app.bank_code))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(flat.as_array().unwrap().len(), 3);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn description_filter_treats_wildcards_literally() {
    let app = spawn_app().await;
    app.create_entry("discount 50% off", "1.00").await;
    app.create_entry("discount 500 off", "2.00").await;

    let page: Value = app
        .get(&format!("/bank-entries?bankCode={}&desc=50%25", app.bank_code))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], json!(1));
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn fresh_entry_has_zero_aggregates() {
    let app = spawn_app().await;
    let id = app.create_entry("no allocations", "5.00").await;

    let entry: Value = app.get(&format!("/bank-entries/{}", id)).await.json().await.unwrap();
    assert_eq!(entry["attachedCount"], json!(0));
    assert_eq!(dec(&entry["matchedTotal"]), Decimal::ZERO);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn soft_deleted_entry_disappears() {
    let app = spawn_app().await;
    let id = app.create_entry("to be deleted", "7.00").await;

    let response = app
        .client
        .delete(app.api(&format!("/bank-entries/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    assert_eq!(app.get(&format!("/bank-entries/{}", id)).await.status(), 404);
    assert_eq!(
        app.get(&format!("/bank-entries/{}/invoices", id)).await.status(),
        404
    );

    let page: Value = app
        .get(&format!("/bank-entries?bankCode={}", app.bank_code))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], json!(0));

    let again = app
        .client
        .delete(app.api(&format!("/bank-entries/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 404);

    // Same content can be ingested again once the old row is tombstoned.
    let recreated: Value = app
        .post("/bank-entries", &app.entry("to be deleted", "7.00"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(recreated["created"], json!(true));
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn update_recomputes_fingerprint_and_detects_collisions() {
    let app = spawn_app().await;
    let a = app.create_entry("first", "1.00").await;
    app.create_entry("second", "2.00").await;

    let collide = app
        .client
        .put(app.api(&format!("/bank-entries/{}", a)))
        .json(&app.entry("SECOND", "2.00"))
        .send()
        .await
        .unwrap();
    assert_eq!(collide.status(), 409);

    let ok = app
        .client
        .put(app.api(&format!("/bank-entries/{}", a)))
        .json(&app.entry("first, corrected", "1.50"))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), 200);

    let entry: Value = app.get(&format!("/bank-entries/{}", a)).await.json().await.unwrap();
    assert_eq!(entry["description"], json!("first, corrected"));
    assert_eq!(dec(&entry["amount"]), Decimal::new(150, 2));

    let missing = app
        .client
        .put(app.api("/bank-entries/BE-does-not-exist"))
        .json(&app.entry("x", "1"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}
