//! Common test utilities for consolidation-service integration tests.

#![allow(dead_code)]

use consolidation_service::config::{ConsolidationConfig, DatabaseConfig, EngineSettings};
use consolidation_service::startup::Application;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use service_core::config::Config as CommonConfig;
use std::sync::Once;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,consolidation_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn test_config() -> ConsolidationConfig {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run integration tests");

    ConsolidationConfig {
        common: CommonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        service_name: "consolidation-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: database_url,
            max_connections: 5,
            min_connections: 1,
        },
        engine: EngineSettings::default(),
        cors_allowed_origins: vec![],
        seed_dev: false,
    }
}

/// Test application wrapper. Every app gets its own bank code so tests do
/// not see each other's entries.
pub struct TestApp {
    pub client: Client,
    pub base_url: String,
    pub bank_code: String,
    pub http_port: u16,
}

pub async fn spawn_app() -> TestApp {
    init_tracing();

    let app = Application::build(test_config())
        .await
        .expect("Failed to build application");

    let http_port = app.http_port();
    let base_url = format!("http://127.0.0.1:{}", http_port);

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let client = Client::new();

    // Wait for server to be ready with retry
    let mut attempts = 0;
    loop {
        match client.get(format!("{}/health", base_url)).send().await {
            Ok(_) => break,
            Err(_) if attempts < 20 => {
                attempts += 1;
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            }
            Err(e) => panic!("Server did not come up after 20 attempts: {}", e),
        }
    }

    TestApp {
        client,
        base_url,
        bank_code: format!("T{}", &Uuid::new_v4().simple().to_string()[..12]),
        http_port,
    }
}

impl TestApp {
    pub fn api(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    pub async fn post(&self, path: &str, body: &Value) -> Response {
        self.client
            .post(self.api(path))
            .json(body)
            .send()
            .await
            .expect("request failed")
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.api(path))
            .send()
            .await
            .expect("request failed")
    }

    /// A valid entry body for this app's bank code.
    pub fn entry(&self, description: &str, amount: &str) -> Value {
        json!({
            "transactionDate": "29/11/2025",
            "description": description,
            "branch": "0000",
            "amount": amount,
            "amountType": "CR",
            "balance": "0",
            "bankCode": self.bank_code,
        })
    }

    /// Creates an entry and returns its id.
    pub async fn create_entry(&self, description: &str, amount: &str) -> String {
        let response = self.post("/bank-entries", &self.entry(description, amount)).await;
        assert_eq!(response.status(), 201);
        let body: Value = response.json().await.expect("invalid json");
        body["id"].as_str().expect("missing id").to_string()
    }

    /// Creates an invoice with a fresh id and returns the id.
    pub async fn create_invoice(&self, total_amount: &str) -> String {
        let id = format!("INV-{}", Uuid::new_v4().simple());
        let response = self
            .post(
                "/invoices",
                &json!({
                    "invoiceHeaderId": id,
                    "invoiceNo": format!("NO-{}", id),
                    "invoiceDate": "2025-11-20",
                    "customerId": "CUST-001",
                    "customerName": "PT Contoh",
                    "totalAmount": total_amount,
                    "companyCode": "COMP-01",
                }),
            )
            .await;
        assert_eq!(response.status(), 201);
        id
    }

    pub async fn reconcile(&self, entry_id: &str, body: &Value) -> Response {
        self.post(&format!("/bank-entries/{}/reconcile", entry_id), body)
            .await
    }

    pub async fn matched_total(&self, invoice_id: &str) -> String {
        let body: Value = self
            .get(&format!("/invoices/{}", invoice_id))
            .await
            .json()
            .await
            .expect("invalid json");
        body["matchedTotal"]
            .as_str()
            .expect("missing matchedTotal")
            .to_string()
    }
}
