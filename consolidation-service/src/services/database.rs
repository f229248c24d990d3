//! Database service for consolidation-service.

use crate::config::EngineSettings;
use crate::models::{
    AttachedInvoice, BankEntry, InvoiceDetail, InvoiceHeader, ReconcileMode, ReconcileOutcome,
};
use crate::services::allocation::{check_allocation, AllocationPlan, AllocationRequest};
use crate::services::error::ConsolidationError;
use crate::services::ingestion::{BulkInsertReport, NewBankEntry};
use crate::services::invoice::{InvoiceFilter, NewInvoice};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::query::{EntryFilter, PageWindow};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Columns of a bank entry plus its allocation aggregates. Allocation rows
/// only count when their invoice is live.
const BANK_ENTRY_SELECT: &str = r#"
    SELECT be.id, be.transaction_date, be.description, be.branch, be.amount, be.amount_type,
           be.balance, be.bank_code, be.fingerprint, be.created_at, be.updated_at,
           COALESCE(st.attached_count, 0) AS attached_count,
           COALESCE(st.matched_total, 0) AS matched_total
    FROM bank_entries be
    LEFT JOIN (
        SELECT bei.bank_entry_id,
               COUNT(*) AS attached_count,
               SUM(bei.matched_amount) AS matched_total
        FROM bank_entry_invoices bei
        JOIN invoice_headers ih ON ih.id = bei.invoice_header_id AND ih.deleted_at IS NULL
        GROUP BY bei.bank_entry_id
    ) st ON st.bank_entry_id = be.id
    WHERE be.deleted_at IS NULL
"#;

/// Invoice header columns plus the amount matched to it by live entries.
const INVOICE_SELECT: &str = r#"
    SELECT ih.id, ih.invoice_no, ih.invoice_date, ih.customer_id, ih.customer_name, ih.status,
           ih.total_amount, ih.total_tax, ih.company_code, ih.created_at,
           COALESCE((
               SELECT SUM(bei.matched_amount)
               FROM bank_entry_invoices bei
               JOIN bank_entries be ON be.id = bei.bank_entry_id AND be.deleted_at IS NULL
               WHERE bei.invoice_header_id = ih.id
           ), 0) AS matched_total
    FROM invoice_headers ih
    WHERE ih.deleted_at IS NULL
"#;

fn store_error(context: &str, e: sqlx::Error) -> ConsolidationError {
    ConsolidationError::Store(anyhow::anyhow!("Failed to {}: {}", context, e))
}

fn push_entry_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &EntryFilter) {
    qb.push(" AND be.bank_code = ").push_bind(filter.bank_code.clone());

    if let Some(branch) = &filter.branch {
        qb.push(" AND be.branch = ").push_bind(branch.clone());
    }
    if let Some(amount_type) = &filter.amount_type {
        qb.push(" AND be.amount_type = ").push_bind(amount_type.clone());
    }
    if let Some(pattern) = &filter.description_pattern {
        qb.push(" AND be.description ILIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\'");
    }
    if let Some(from) = filter.from {
        qb.push(" AND be.transaction_date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND be.transaction_date <= ").push_bind(to);
    }
    if let Some(month_start) = filter.month_start {
        qb.push(" AND be.transaction_date >= ").push_bind(month_start);
    }
    if let Some(before) = filter.before {
        qb.push(" AND be.transaction_date < ").push_bind(before);
    }
}

fn push_invoice_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &InvoiceFilter) {
    if let Some(status) = &filter.status {
        qb.push(" AND ih.status = ").push_bind(status.clone());
    }
    if let Some(customer_id) = &filter.customer_id {
        qb.push(" AND ih.customer_id = ").push_bind(customer_id.clone());
    }
    if let Some(pattern) = &filter.invoice_no_pattern {
        qb.push(" AND ih.invoice_no ILIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\'");
    }
    if let Some(company_code) = &filter.company_code {
        qb.push(" AND ih.company_code = ").push_bind(company_code.clone());
    }
    if let Some(from) = filter.from {
        qb.push(" AND ih.invoice_date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND ih.invoice_date <= ").push_bind(to);
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    settings: EngineSettings,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url, settings), fields(service = "consolidation-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        settings: EngineSettings,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool, settings })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Bank Entry Operations
    // =========================================================================

    /// Insert a bank entry unless a live entry with the same fingerprint
    /// exists. Returns the id of the live entry and whether it was created.
    #[instrument(skip(self, entry), fields(bank_code = %entry.bank_code, fingerprint = %entry.fingerprint))]
    pub async fn create_bank_entry(
        &self,
        entry: &NewBankEntry,
    ) -> Result<(String, bool), ConsolidationError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_bank_entry"])
            .start_timer();

        let inserted = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO bank_entries (id, transaction_date, description, branch, amount, amount_type, balance, bank_code, fingerprint)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&entry.id)
        .bind(entry.transaction_date)
        .bind(&entry.description)
        .bind(&entry.branch)
        .bind(entry.amount)
        .bind(entry.amount_type.as_str())
        .bind(entry.balance)
        .bind(&entry.bank_code)
        .bind(&entry.fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("create bank entry", e))?;

        if let Some(id) = inserted {
            timer.observe_duration();
            info!(bank_entry_id = %id, "Bank entry created");
            return Ok((id, true));
        }

        let existing = sqlx::query_scalar::<_, String>(
            "SELECT id FROM bank_entries WHERE fingerprint = $1 AND deleted_at IS NULL",
        )
        .bind(&entry.fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("look up duplicate bank entry", e))?;

        timer.observe_duration();

        match existing {
            Some(id) => {
                info!(bank_entry_id = %id, "Bank entry already present");
                Ok((id, false))
            }
            // The conflict was on the caller-supplied id, not on content.
            None => Err(ConsolidationError::Duplicate(format!(
                "bank entry id {} is already in use",
                entry.id
            ))),
        }
    }

    /// Insert validated entries in fixed-size chunks, skipping duplicates.
    ///
    /// A row the store refuses is a duplicate when a live entry carries its
    /// fingerprint afterwards; otherwise its id is held by other content and
    /// it is reported as an id conflict.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub async fn bulk_create_bank_entries(
        &self,
        entries: &[NewBankEntry],
    ) -> Result<BulkInsertReport, ConsolidationError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["bulk_create_bank_entries"])
            .start_timer();

        let mut report = BulkInsertReport::default();
        let chunk_size = self.settings.bulk_chunk_size.max(1);

        for (chunk_no, chunk) in entries.chunks(chunk_size).enumerate() {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO bank_entries (id, transaction_date, description, branch, amount, amount_type, balance, bank_code, fingerprint) ",
            );
            qb.push_values(chunk, |mut row, entry| {
                row.push_bind(entry.id.clone())
                    .push_bind(entry.transaction_date)
                    .push_bind(entry.description.clone())
                    .push_bind(entry.branch.clone())
                    .push_bind(entry.amount)
                    .push_bind(entry.amount_type.as_str())
                    .push_bind(entry.balance)
                    .push_bind(entry.bank_code.clone())
                    .push_bind(entry.fingerprint.clone());
            });
            qb.push(" ON CONFLICT DO NOTHING RETURNING fingerprint");

            let stored: HashSet<String> = qb
                .build_query_scalar::<String>()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| store_error("insert bank entry chunk", e))?
                .into_iter()
                .collect();

            report.inserted += stored.len() as u64;

            let refused: Vec<String> = chunk
                .iter()
                .filter(|entry| !stored.contains(&entry.fingerprint))
                .map(|entry| entry.fingerprint.clone())
                .collect();
            if refused.is_empty() {
                continue;
            }

            let live: HashSet<String> = sqlx::query_scalar::<_, String>(
                "SELECT fingerprint FROM bank_entries WHERE fingerprint = ANY($1) AND deleted_at IS NULL",
            )
            .bind(&refused)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("look up refused bank entries", e))?
            .into_iter()
            .collect();

            report.id_conflicts.extend(
                chunk
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| !stored.contains(&entry.fingerprint))
                    .filter(|(_, entry)| !live.contains(&entry.fingerprint))
                    .map(|(pos, _)| chunk_no * chunk_size + pos),
            );
        }

        timer.observe_duration();

        info!(
            candidates = entries.len(),
            inserted = report.inserted,
            id_conflicts = report.id_conflicts.len(),
            "Bulk bank entries stored"
        );

        Ok(report)
    }

    /// List live entries matching the filter. Returns the page and the total
    /// count under the same filter.
    #[instrument(skip(self), fields(bank_code = %filter.bank_code))]
    pub async fn list_bank_entries(
        &self,
        filter: &EntryFilter,
        window: PageWindow,
    ) -> Result<(Vec<BankEntry>, i64), ConsolidationError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_bank_entries"])
            .start_timer();

        let mut count_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM bank_entries be WHERE be.deleted_at IS NULL");
        push_entry_filters(&mut count_qb, filter);

        let total = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_error("count bank entries", e))?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(BANK_ENTRY_SELECT);
        push_entry_filters(&mut qb, filter);
        qb.push(" ORDER BY be.transaction_date DESC, be.id LIMIT ")
            .push_bind(window.limit)
            .push(" OFFSET ")
            .push_bind(window.offset);

        let items = qb
            .build_query_as::<BankEntry>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("list bank entries", e))?;

        timer.observe_duration();

        Ok((items, total))
    }

    /// Get a live bank entry by ID.
    #[instrument(skip(self), fields(bank_entry_id = %id))]
    pub async fn get_bank_entry(&self, id: &str) -> Result<BankEntry, ConsolidationError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_bank_entry"])
            .start_timer();

        let sql = format!("{} AND be.id = $1", BANK_ENTRY_SELECT);
        let entry = sqlx::query_as::<_, BankEntry>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("get bank entry", e))?;

        timer.observe_duration();

        entry.ok_or_else(|| ConsolidationError::bank_entry_not_found(id))
    }

    /// Replace the content of a live entry and recompute its fingerprint.
    #[instrument(skip(self, entry), fields(bank_entry_id = %entry.id))]
    pub async fn update_bank_entry(&self, entry: &NewBankEntry) -> Result<(), ConsolidationError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_bank_entry"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE bank_entries
            SET transaction_date = $2, description = $3, branch = $4, amount = $5, amount_type = $6,
                balance = $7, bank_code = $8, fingerprint = $9, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(&entry.id)
        .bind(entry.transaction_date)
        .bind(&entry.description)
        .bind(&entry.branch)
        .bind(entry.amount)
        .bind(entry.amount_type.as_str())
        .bind(entry.balance)
        .bind(&entry.bank_code)
        .bind(&entry.fingerprint)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                ConsolidationError::Duplicate(format!(
                    "another bank entry already has the content of {}",
                    entry.id
                ))
            }
            _ => store_error("update bank entry", e),
        })?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(ConsolidationError::bank_entry_not_found(&entry.id));
        }

        info!(bank_entry_id = %entry.id, "Bank entry updated");
        Ok(())
    }

    /// Soft-delete a live entry. Its allocation rows stay but stop counting.
    #[instrument(skip(self), fields(bank_entry_id = %id))]
    pub async fn delete_bank_entry(&self, id: &str) -> Result<(), ConsolidationError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_bank_entry"])
            .start_timer();

        let result = sqlx::query(
            "UPDATE bank_entries SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("delete bank entry", e))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(ConsolidationError::bank_entry_not_found(id));
        }

        info!(bank_entry_id = %id, "Bank entry deleted");
        Ok(())
    }

    // =========================================================================
    // Allocation Operations
    // =========================================================================

    /// Apply an allocation plan to a bank entry in one transaction.
    ///
    /// The entry row and then every requested invoice row (ascending id) are
    /// locked before any sum is read, so concurrent calls touching the same
    /// invoice run one after the other and each validates against the
    /// other's committed rows.
    #[instrument(skip(self, plan), fields(bank_entry_id = %bank_entry_id, mode = plan.mode.as_str(), invoices = plan.allocations.len()))]
    pub async fn reconcile(
        &self,
        bank_entry_id: &str,
        plan: &AllocationPlan,
    ) -> Result<ReconcileOutcome, ConsolidationError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reconcile"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("begin transaction", e))?;

        let locked = sqlx::query_scalar::<_, String>(
            "SELECT id FROM bank_entries WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(bank_entry_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| store_error("lock bank entry", e))?;

        if locked.is_none() {
            return Err(ConsolidationError::bank_entry_not_found(bank_entry_id));
        }

        if plan.is_noop() {
            tx.rollback().await.ok();
            timer.observe_duration();
            return Ok(ReconcileOutcome {
                mode: plan.mode,
                inserted_count: 0,
                removed_count: 0,
            });
        }

        let invoice_ids = plan.invoice_ids();

        let totals: HashMap<String, Decimal> = sqlx::query_as::<_, (String, Decimal)>(
            r#"
            SELECT id, total_amount
            FROM invoice_headers
            WHERE id = ANY($1) AND deleted_at IS NULL
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(&invoice_ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| store_error("lock invoices", e))?
        .into_iter()
        .collect();

        if let Some(missing) = invoice_ids.iter().find(|id| !totals.contains_key(*id)) {
            return Err(ConsolidationError::invoice_not_found(missing));
        }

        let existing: HashMap<String, Decimal> = sqlx::query_as::<_, (String, Decimal)>(
            r#"
            SELECT bei.invoice_header_id, COALESCE(SUM(bei.matched_amount), 0)
            FROM bank_entry_invoices bei
            JOIN bank_entries be ON be.id = bei.bank_entry_id AND be.deleted_at IS NULL
            WHERE bei.invoice_header_id = ANY($1) AND bei.bank_entry_id <> $2
            GROUP BY bei.invoice_header_id
            "#,
        )
        .bind(&invoice_ids)
        .bind(bank_entry_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| store_error("sum existing allocations", e))?
        .into_iter()
        .collect();

        let already_held: HashSet<String> = if plan.mode == ReconcileMode::Append {
            sqlx::query_scalar::<_, String>(
                "SELECT invoice_header_id FROM bank_entry_invoices WHERE bank_entry_id = $1 AND invoice_header_id = ANY($2)",
            )
            .bind(bank_entry_id)
            .bind(&invoice_ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| store_error("load held allocations", e))?
            .into_iter()
            .collect()
        } else {
            HashSet::new()
        };

        let mut to_insert: Vec<&AllocationRequest> = Vec::with_capacity(plan.allocations.len());
        for allocation in &plan.allocations {
            if already_held.contains(&allocation.invoice_id) {
                continue;
            }
            let total_amount = totals
                .get(&allocation.invoice_id)
                .copied()
                .ok_or_else(|| ConsolidationError::invoice_not_found(&allocation.invoice_id))?;
            check_allocation(
                &allocation.invoice_id,
                total_amount,
                existing.get(&allocation.invoice_id).copied().unwrap_or_default(),
                allocation.amount,
                self.settings.allocation_tolerance,
            )?;
            to_insert.push(allocation);
        }

        let removed_count = if plan.mode == ReconcileMode::Replace {
            sqlx::query("DELETE FROM bank_entry_invoices WHERE bank_entry_id = $1")
                .bind(bank_entry_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| store_error("clear allocations", e))?
                .rows_affected()
        } else {
            0
        };

        let mut inserted_count = 0u64;
        for chunk in to_insert.chunks(self.settings.allocation_chunk_size) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO bank_entry_invoices (bank_entry_id, invoice_header_id, matched_amount, note) ",
            );
            qb.push_values(chunk, |mut row, allocation| {
                row.push_bind(bank_entry_id.to_string())
                    .push_bind(allocation.invoice_id.clone())
                    .push_bind(allocation.amount)
                    .push_bind(plan.note.clone());
            });
            qb.push(" ON CONFLICT (bank_entry_id, invoice_header_id) DO NOTHING");

            inserted_count += qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| store_error("insert allocations", e))?
                .rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| store_error("commit reconciliation", e))?;

        timer.observe_duration();

        info!(
            bank_entry_id = %bank_entry_id,
            mode = plan.mode.as_str(),
            inserted = inserted_count,
            removed = removed_count,
            "Bank entry reconciled"
        );

        Ok(ReconcileOutcome {
            mode: plan.mode,
            inserted_count,
            removed_count,
        })
    }

    /// Live invoices a live entry is allocated to, newest invoice first.
    #[instrument(skip(self), fields(bank_entry_id = %bank_entry_id))]
    pub async fn list_attached_invoices(
        &self,
        bank_entry_id: &str,
    ) -> Result<Vec<AttachedInvoice>, ConsolidationError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_attached_invoices"])
            .start_timer();

        let live = sqlx::query_scalar::<_, String>(
            "SELECT id FROM bank_entries WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(bank_entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("get bank entry", e))?;

        if live.is_none() {
            return Err(ConsolidationError::bank_entry_not_found(bank_entry_id));
        }

        let invoices = sqlx::query_as::<_, AttachedInvoice>(
            r#"
            SELECT ih.id, ih.invoice_no, ih.invoice_date, ih.customer_id, ih.customer_name, ih.status,
                   ih.total_amount, ih.total_tax, ih.company_code, bei.matched_amount, bei.note
            FROM bank_entry_invoices bei
            JOIN invoice_headers ih ON ih.id = bei.invoice_header_id AND ih.deleted_at IS NULL
            WHERE bei.bank_entry_id = $1
            ORDER BY ih.invoice_date DESC, ih.id
            "#,
        )
        .bind(bank_entry_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("list attached invoices", e))?;

        timer.observe_duration();

        Ok(invoices)
    }

    // =========================================================================
    // Invoice Operations
    // =========================================================================

    /// Insert an invoice and its detail lines in one transaction.
    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id, details = invoice.details.len()))]
    pub async fn create_invoice(&self, invoice: &NewInvoice) -> Result<(), ConsolidationError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("begin transaction", e))?;

        self.insert_invoice(&mut *tx, invoice, false)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    if db_err.constraint() == Some("invoice_details_pkey") {
                        ConsolidationError::Duplicate(format!(
                            "a detail line of invoice {} reuses an existing invoiceDetailId",
                            invoice.id
                        ))
                    } else {
                        ConsolidationError::Duplicate(format!("invoice {} already exists", invoice.id))
                    }
                }
                _ => store_error("create invoice", e),
            })?;

        tx.commit()
            .await
            .map_err(|e| store_error("commit invoice", e))?;

        timer.observe_duration();
        info!(invoice_id = %invoice.id, invoice_no = %invoice.invoice_no, "Invoice created");
        Ok(())
    }

    /// Insert an invoice unless one with the same id exists. Returns whether
    /// a row was written.
    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id))]
    pub async fn ensure_invoice(&self, invoice: &NewInvoice) -> Result<bool, ConsolidationError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("begin transaction", e))?;

        let inserted = self
            .insert_invoice(&mut *tx, invoice, true)
            .await
            .map_err(|e| store_error("ensure invoice", e))?;

        tx.commit()
            .await
            .map_err(|e| store_error("commit invoice", e))?;

        if !inserted {
            debug!(invoice_id = %invoice.id, "Invoice already present, left unchanged");
        }
        Ok(inserted)
    }

    /// Writes the header and, when it was written, the detail lines.
    async fn insert_invoice(
        &self,
        conn: &mut PgConnection,
        invoice: &NewInvoice,
        if_absent: bool,
    ) -> Result<bool, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO invoice_headers (id, invoice_no, invoice_date, customer_id, customer_name, status, total_amount, total_tax, company_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            {}
            "#,
            if if_absent { "ON CONFLICT (id) DO NOTHING" } else { "" }
        );

        let result = sqlx::query(&sql)
            .bind(&invoice.id)
            .bind(&invoice.invoice_no)
            .bind(invoice.invoice_date)
            .bind(&invoice.customer_id)
            .bind(&invoice.customer_name)
            .bind(&invoice.status)
            .bind(invoice.total_amount)
            .bind(invoice.total_tax)
            .bind(&invoice.company_code)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        for chunk in invoice.details.chunks(self.settings.bulk_chunk_size.max(1)) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO invoice_details (id, header_id, product_id, description, quantity, unit_price, amount, tax_rate, tax_amount) ",
            );
            qb.push_values(chunk, |mut row, detail| {
                row.push_bind(detail.id.clone())
                    .push_bind(invoice.id.clone())
                    .push_bind(detail.product_id.clone())
                    .push_bind(detail.product_name.clone())
                    .push_bind(detail.quantity)
                    .push_bind(detail.unit_price)
                    .push_bind(detail.amount)
                    .push_bind(detail.tax_rate)
                    .push_bind(detail.tax_amount);
            });
            qb.build().execute(&mut *conn).await?;
        }

        Ok(true)
    }

    /// Get a live invoice with the amount matched to it by live entries.
    #[instrument(skip(self), fields(invoice_id = %id))]
    pub async fn get_invoice(&self, id: &str) -> Result<InvoiceHeader, ConsolidationError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let sql = format!("{} AND ih.id = $1", INVOICE_SELECT);
        let invoice = sqlx::query_as::<_, InvoiceHeader>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("get invoice", e))?;

        timer.observe_duration();

        invoice.ok_or_else(|| ConsolidationError::invoice_not_found(id))
    }

    /// Live detail lines of an invoice.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn list_invoice_details(
        &self,
        invoice_id: &str,
    ) -> Result<Vec<InvoiceDetail>, ConsolidationError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoice_details"])
            .start_timer();

        let details = sqlx::query_as::<_, InvoiceDetail>(
            r#"
            SELECT id, product_id, description AS product_name, quantity, unit_price, amount,
                   tax_rate, tax_amount
            FROM invoice_details
            WHERE header_id = $1 AND deleted_at IS NULL
            ORDER BY id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("list invoice details", e))?;

        timer.observe_duration();

        Ok(details)
    }

    /// List live invoices matching the filter, newest first, with the total
    /// count under the same filter.
    #[instrument(skip(self))]
    pub async fn list_invoices(
        &self,
        filter: &InvoiceFilter,
        window: PageWindow,
    ) -> Result<(Vec<InvoiceHeader>, i64), ConsolidationError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let mut count_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM invoice_headers ih WHERE ih.deleted_at IS NULL");
        push_invoice_filters(&mut count_qb, filter);

        let total = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_error("count invoices", e))?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(INVOICE_SELECT);
        push_invoice_filters(&mut qb, filter);
        qb.push(" ORDER BY ih.invoice_date DESC, ih.id LIMIT ")
            .push_bind(window.limit)
            .push(" OFFSET ")
            .push_bind(window.offset);

        let items = qb
            .build_query_as::<InvoiceHeader>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("list invoices", e))?;

        timer.observe_duration();

        Ok((items, total))
    }
}
