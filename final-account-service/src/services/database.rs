//! Database service for final-account-service.
//!
//! Every item mutation runs inside one transaction covering the row change,
//! the P&A child cascade, the history snapshot, and the section re-aggregate,
//! so a failure partway through rolls back instead of leaving children or
//! totals stale.

use crate::calc;
use crate::models::{
    Bill, CreateBill, CreateFinalAccount, CreateLineItem, CreateSection, CreateSectionReview,
    FinalAccount, ItemHistoryEntry, LineItem, ReviewRequestStatus, Section, SectionReview,
    SectionReviewStatus, UpdateBill, UpdateFinalAccount, UpdateLineItem, UpdateSection,
};
use crate::services::metrics::{
    record_cascade_children, record_item_operation, record_section_recompute, DB_QUERY_DURATION,
};
use account_core::error::AppError;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::Transaction;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const ITEM_COLUMNS: &str = "item_id, section_id, item_code, description, unit, \
    contract_quantity, final_quantity, supply_rate, install_rate, \
    contract_amount, final_amount, variation_amount, is_rate_only, \
    is_prime_cost, pc_allowance, pc_actual_cost, is_pa_item, \
    pa_parent_item_id, pa_percentage, display_order, shop_subsection_id, \
    created_utc, updated_utc";

const SECTION_COLUMNS: &str = "section_id, bill_id, name, display_order, \
    contract_total, final_total, variation_total, boq_stated_total, \
    review_status, created_utc, updated_utc";

/// Result of a transactional item mutation: the row itself, any P&A children
/// recomputed by the cascade, and the section with its fresh totals.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ItemMutation {
    pub item: LineItem,
    pub cascaded_children: Vec<LineItem>,
    pub section: Section,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "final-account-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
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

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
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
    // Final Account Operations
    // =========================================================================

    /// Create a final account.
    #[instrument(skip(self, input))]
    pub async fn create_account(
        &self,
        input: &CreateFinalAccount,
    ) -> Result<FinalAccount, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_account"])
            .start_timer();

        let account = sqlx::query_as::<_, FinalAccount>(
            r#"
            INSERT INTO final_accounts (account_id, project_name, contract_reference, source_boq_upload_id)
            VALUES ($1, $2, $3, $4)
            RETURNING account_id, project_name, contract_reference, source_boq_upload_id, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.project_name)
        .bind(&input.contract_reference)
        .bind(input.source_boq_upload_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create account: {}", e)))?;

        timer.observe_duration();
        info!(account_id = %account.account_id, project_name = %account.project_name, "Final account created");

        Ok(account)
    }

    /// Get a final account by ID.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn get_account(&self, account_id: Uuid) -> Result<Option<FinalAccount>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_account"])
            .start_timer();

        let account = sqlx::query_as::<_, FinalAccount>(
            r#"
            SELECT account_id, project_name, contract_reference, source_boq_upload_id, created_utc, updated_utc
            FROM final_accounts
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get account: {}", e)))?;

        timer.observe_duration();

        Ok(account)
    }

    /// List final accounts, newest first.
    #[instrument(skip(self))]
    pub async fn list_accounts(&self) -> Result<Vec<FinalAccount>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_accounts"])
            .start_timer();

        let accounts = sqlx::query_as::<_, FinalAccount>(
            r#"
            SELECT account_id, project_name, contract_reference, source_boq_upload_id, created_utc, updated_utc
            FROM final_accounts
            ORDER BY created_utc DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list accounts: {}", e)))?;

        timer.observe_duration();

        Ok(accounts)
    }

    /// Update a final account.
    #[instrument(skip(self, input), fields(account_id = %account_id))]
    pub async fn update_account(
        &self,
        account_id: Uuid,
        input: &UpdateFinalAccount,
    ) -> Result<Option<FinalAccount>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_account"])
            .start_timer();

        let account = sqlx::query_as::<_, FinalAccount>(
            r#"
            UPDATE final_accounts
            SET project_name = COALESCE($2, project_name),
                contract_reference = COALESCE($3, contract_reference),
                updated_utc = NOW()
            WHERE account_id = $1
            RETURNING account_id, project_name, contract_reference, source_boq_upload_id, created_utc, updated_utc
            "#,
        )
        .bind(account_id)
        .bind(&input.project_name)
        .bind(&input.contract_reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update account: {}", e)))?;

        timer.observe_duration();

        Ok(account)
    }

    /// Delete a final account (bills, sections, and items cascade).
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn delete_account(&self, account_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_account"])
            .start_timer();

        let result = sqlx::query("DELETE FROM final_accounts WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete account: {}", e))
            })?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Bill Operations
    // =========================================================================

    /// Create a bill under an account.
    #[instrument(skip(self, input), fields(account_id = %account_id))]
    pub async fn create_bill(
        &self,
        account_id: Uuid,
        input: &CreateBill,
    ) -> Result<Bill, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_bill"])
            .start_timer();

        let bill = sqlx::query_as::<_, Bill>(
            r#"
            INSERT INTO final_account_bills (bill_id, account_id, name, display_order)
            VALUES ($1, $2, $3,
                (SELECT COALESCE(MAX(display_order), 0) + 1 FROM final_account_bills WHERE account_id = $2))
            RETURNING bill_id, account_id, name, display_order, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(&input.name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create bill: {}", e)))?;

        timer.observe_duration();
        info!(bill_id = %bill.bill_id, "Bill created");

        Ok(bill)
    }

    /// Get a bill by ID.
    #[instrument(skip(self), fields(bill_id = %bill_id))]
    pub async fn get_bill(&self, bill_id: Uuid) -> Result<Option<Bill>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_bill"])
            .start_timer();

        let bill = sqlx::query_as::<_, Bill>(
            r#"
            SELECT bill_id, account_id, name, display_order, created_utc
            FROM final_account_bills
            WHERE bill_id = $1
            "#,
        )
        .bind(bill_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get bill: {}", e)))?;

        timer.observe_duration();

        Ok(bill)
    }

    /// List bills for an account.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn list_bills(&self, account_id: Uuid) -> Result<Vec<Bill>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_bills"])
            .start_timer();

        let bills = sqlx::query_as::<_, Bill>(
            r#"
            SELECT bill_id, account_id, name, display_order, created_utc
            FROM final_account_bills
            WHERE account_id = $1
            ORDER BY display_order
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list bills: {}", e)))?;

        timer.observe_duration();

        Ok(bills)
    }

    /// Update a bill.
    #[instrument(skip(self, input), fields(bill_id = %bill_id))]
    pub async fn update_bill(
        &self,
        bill_id: Uuid,
        input: &UpdateBill,
    ) -> Result<Option<Bill>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_bill"])
            .start_timer();

        let bill = sqlx::query_as::<_, Bill>(
            r#"
            UPDATE final_account_bills
            SET name = COALESCE($2, name),
                display_order = COALESCE($3, display_order)
            WHERE bill_id = $1
            RETURNING bill_id, account_id, name, display_order, created_utc
            "#,
        )
        .bind(bill_id)
        .bind(&input.name)
        .bind(input.display_order)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update bill: {}", e)))?;

        timer.observe_duration();

        Ok(bill)
    }

    /// Delete a bill (sections and items cascade).
    #[instrument(skip(self), fields(bill_id = %bill_id))]
    pub async fn delete_bill(&self, bill_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_bill"])
            .start_timer();

        let result = sqlx::query("DELETE FROM final_account_bills WHERE bill_id = $1")
            .bind(bill_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete bill: {}", e)))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Section Operations
    // =========================================================================

    /// Create a section under a bill.
    #[instrument(skip(self, input), fields(bill_id = %bill_id))]
    pub async fn create_section(
        &self,
        bill_id: Uuid,
        input: &CreateSection,
    ) -> Result<Section, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_section"])
            .start_timer();

        let section = sqlx::query_as::<_, Section>(&format!(
            r#"
            INSERT INTO final_account_sections (section_id, bill_id, name, display_order, boq_stated_total)
            VALUES ($1, $2, $3,
                (SELECT COALESCE(MAX(display_order), 0) + 1 FROM final_account_sections WHERE bill_id = $2),
                $4)
            RETURNING {SECTION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(bill_id)
        .bind(&input.name)
        .bind(input.boq_stated_total)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create section: {}", e)))?;

        timer.observe_duration();
        info!(section_id = %section.section_id, "Section created");

        Ok(section)
    }

    /// Get a section by ID.
    #[instrument(skip(self), fields(section_id = %section_id))]
    pub async fn get_section(&self, section_id: Uuid) -> Result<Option<Section>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_section"])
            .start_timer();

        let section = sqlx::query_as::<_, Section>(&format!(
            "SELECT {SECTION_COLUMNS} FROM final_account_sections WHERE section_id = $1"
        ))
        .bind(section_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get section: {}", e)))?;

        timer.observe_duration();

        Ok(section)
    }

    /// List sections for a bill.
    #[instrument(skip(self), fields(bill_id = %bill_id))]
    pub async fn list_sections(&self, bill_id: Uuid) -> Result<Vec<Section>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_sections"])
            .start_timer();

        let sections = sqlx::query_as::<_, Section>(&format!(
            r#"
            SELECT {SECTION_COLUMNS}
            FROM final_account_sections
            WHERE bill_id = $1
            ORDER BY display_order
            "#
        ))
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list sections: {}", e)))?;

        timer.observe_duration();

        Ok(sections)
    }

    /// Update a section's descriptive fields. Totals are owned by the
    /// aggregator and cannot be set here.
    #[instrument(skip(self, input), fields(section_id = %section_id))]
    pub async fn update_section(
        &self,
        section_id: Uuid,
        input: &UpdateSection,
    ) -> Result<Option<Section>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_section"])
            .start_timer();

        let review_status = input.review_status.map(|s| s.as_str().to_string());

        let section = sqlx::query_as::<_, Section>(&format!(
            r#"
            UPDATE final_account_sections
            SET name = COALESCE($2, name),
                display_order = COALESCE($3, display_order),
                boq_stated_total = COALESCE($4, boq_stated_total),
                review_status = COALESCE($5, review_status),
                updated_utc = NOW()
            WHERE section_id = $1
            RETURNING {SECTION_COLUMNS}
            "#
        ))
        .bind(section_id)
        .bind(&input.name)
        .bind(input.display_order)
        .bind(input.boq_stated_total)
        .bind(review_status)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update section: {}", e)))?;

        timer.observe_duration();

        Ok(section)
    }

    /// Delete a section (items, history, and reviews cascade).
    #[instrument(skip(self), fields(section_id = %section_id))]
    pub async fn delete_section(&self, section_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_section"])
            .start_timer();

        let result = sqlx::query("DELETE FROM final_account_sections WHERE section_id = $1")
            .bind(section_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete section: {}", e))
            })?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    /// Recompute and persist a section's totals, returning the fresh section.
    #[instrument(skip(self), fields(section_id = %section_id))]
    pub async fn recompute_section(&self, section_id: Uuid) -> Result<Option<Section>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["recompute_section"])
            .start_timer();

        let mut tx = self.begin().await?;

        let exists: Option<Uuid> =
            sqlx::query_scalar("SELECT section_id FROM final_account_sections WHERE section_id = $1")
                .bind(section_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to check section: {}", e))
                })?;

        if exists.is_none() {
            return Ok(None);
        }

        let section = refresh_section_totals(&mut tx, section_id).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();
        record_section_recompute("explicit");

        Ok(Some(section))
    }

    // =========================================================================
    // Line Item Operations
    // =========================================================================

    /// List a section's items in display order.
    #[instrument(skip(self), fields(section_id = %section_id))]
    pub async fn list_items(&self, section_id: Uuid) -> Result<Vec<LineItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_items"])
            .start_timer();

        let items = sqlx::query_as::<_, LineItem>(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM final_account_items
            WHERE section_id = $1
            ORDER BY display_order
            "#
        ))
        .bind(section_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list items: {}", e)))?;

        timer.observe_duration();

        Ok(items)
    }

    /// Get a line item by ID.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn get_item(&self, item_id: Uuid) -> Result<Option<LineItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_item"])
            .start_timer();

        let item = sqlx::query_as::<_, LineItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM final_account_items WHERE item_id = $1"
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get item: {}", e)))?;

        timer.observe_duration();

        Ok(item)
    }

    /// Create a line item at the end of its section and re-aggregate.
    #[instrument(skip(self, input), fields(section_id = %section_id))]
    pub async fn create_item(
        &self,
        section_id: Uuid,
        input: &CreateLineItem,
    ) -> Result<ItemMutation, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_item"])
            .start_timer();

        let mut tx = self.begin().await?;

        section_must_exist(&mut tx, section_id).await?;

        let display_order: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(display_order), 0) + 1 FROM final_account_items WHERE section_id = $1",
        )
        .bind(section_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to allocate row position: {}", e)))?;

        let mut item = LineItem::new(section_id, display_order, input);
        let parent = resolve_and_validate_parent(&mut tx, &item).await?;
        set_amounts(&mut item, parent.as_ref());

        insert_item(&mut tx, &item).await?;

        let section = refresh_section_totals(&mut tx, section_id).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();
        record_item_operation("create");
        record_section_recompute("item_create");
        info!(item_id = %item.item_id, section_id = %section_id, "Line item created");

        Ok(ItemMutation {
            item,
            cascaded_children: Vec::new(),
            section,
        })
    }

    /// Bulk-insert pre-populated rows (the BOQ import path) and re-aggregate
    /// once at the end.
    #[instrument(skip(self, inputs), fields(section_id = %section_id, rows = inputs.len()))]
    pub async fn import_items(
        &self,
        section_id: Uuid,
        inputs: &[CreateLineItem],
    ) -> Result<(Vec<LineItem>, Section), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["import_items"])
            .start_timer();

        let mut tx = self.begin().await?;

        section_must_exist(&mut tx, section_id).await?;

        let base_order: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(display_order), 0) FROM final_account_items WHERE section_id = $1",
        )
        .bind(section_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to allocate row position: {}", e)))?;

        let mut inserted = Vec::with_capacity(inputs.len());
        for (offset, input) in inputs.iter().enumerate() {
            let mut item = LineItem::new(section_id, base_order + 1 + offset as i32, input);
            let parent = resolve_and_validate_parent(&mut tx, &item).await?;
            set_amounts(&mut item, parent.as_ref());
            insert_item(&mut tx, &item).await?;
            inserted.push(item);
        }

        let section = refresh_section_totals(&mut tx, section_id).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();
        record_item_operation("import");
        record_section_recompute("item_import");
        info!(section_id = %section_id, rows = inserted.len(), "Line items imported");

        Ok((inserted, section))
    }

    /// Apply a per-cell partial update. Recomputes the row's amounts, cascades
    /// to any P&A children referencing it, snapshots the change into history,
    /// and re-aggregates the section, all in one transaction.
    #[instrument(skip(self, input), fields(item_id = %item_id))]
    pub async fn update_item(
        &self,
        item_id: Uuid,
        input: &UpdateLineItem,
    ) -> Result<Option<ItemMutation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_item"])
            .start_timer();

        let mut tx = self.begin().await?;

        let existing = sqlx::query_as::<_, LineItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM final_account_items WHERE item_id = $1 FOR UPDATE"
        ))
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load item: {}", e)))?;

        let Some(mut item) = existing else {
            return Ok(None);
        };

        item.apply(input);
        item.updated_utc = Utc::now();

        let parent = resolve_and_validate_parent(&mut tx, &item).await?;
        set_amounts(&mut item, parent.as_ref());

        store_item(&mut tx, &item).await?;
        insert_history(&mut tx, item_id, input).await?;

        let cascaded_children = cascade_to_children(&mut tx, &item).await?;

        let section = refresh_section_totals(&mut tx, item.section_id).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();
        record_item_operation("update");
        record_cascade_children("update", cascaded_children.len() as u64);
        record_section_recompute("item_update");

        Ok(Some(ItemMutation {
            item,
            cascaded_children,
            section,
        }))
    }

    /// Delete a line item, zero out orphaned P&A children, and re-aggregate.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn delete_item(&self, item_id: Uuid) -> Result<Option<Section>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_item"])
            .start_timer();

        let mut tx = self.begin().await?;

        let section_id: Option<Uuid> =
            sqlx::query_scalar("SELECT section_id FROM final_account_items WHERE item_id = $1")
                .bind(item_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load item: {}", e)))?;

        let Some(section_id) = section_id else {
            return Ok(None);
        };

        // Children lose their parent reference via ON DELETE SET NULL;
        // their amounts drop to zero with no resolvable parent.
        let children_ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT item_id FROM final_account_items WHERE pa_parent_item_id = $1",
        )
        .bind(item_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load children: {}", e)))?;

        sqlx::query("DELETE FROM final_account_items WHERE item_id = $1")
            .bind(item_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete item: {}", e)))?;

        for child_id in &children_ids {
            sqlx::query(
                r#"
                UPDATE final_account_items
                SET contract_amount = 0, final_amount = 0, variation_amount = 0, updated_utc = NOW()
                WHERE item_id = $1
                "#,
            )
            .bind(child_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to zero orphaned child: {}", e))
            })?;
        }

        let section = refresh_section_totals(&mut tx, section_id).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();
        record_item_operation("delete");
        record_cascade_children("delete", children_ids.len() as u64);
        record_section_recompute("item_delete");
        info!(item_id = %item_id, section_id = %section_id, "Line item deleted");

        Ok(Some(section))
    }

    /// Fetch the edit history of an item, oldest first.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn item_history(&self, item_id: Uuid) -> Result<Vec<ItemHistoryEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["item_history"])
            .start_timer();

        let entries = sqlx::query_as::<_, ItemHistoryEntry>(
            r#"
            SELECT history_id, item_id, changed_fields, recorded_utc
            FROM final_account_item_history
            WHERE item_id = $1
            ORDER BY recorded_utc
            "#,
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get item history: {}", e)))?;

        timer.observe_duration();

        Ok(entries)
    }

    // =========================================================================
    // Section Review Operations
    // =========================================================================

    /// Create a review request for a section and mark the section in review.
    #[instrument(skip(self, input), fields(section_id = %section_id))]
    pub async fn create_review(
        &self,
        section_id: Uuid,
        input: &CreateSectionReview,
    ) -> Result<SectionReview, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_review"])
            .start_timer();

        let mut tx = self.begin().await?;

        section_must_exist(&mut tx, section_id).await?;

        let access_token = Uuid::new_v4().simple().to_string();
        let review = sqlx::query_as::<_, SectionReview>(
            r#"
            INSERT INTO final_account_section_reviews (review_id, section_id, access_token, recipient_name, recipient_email, message)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING review_id, section_id, access_token, recipient_name, recipient_email, message, status, created_utc, responded_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(section_id)
        .bind(&access_token)
        .bind(&input.recipient_name)
        .bind(&input.recipient_email)
        .bind(&input.message)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create review: {}", e)))?;

        sqlx::query(
            "UPDATE final_account_sections SET review_status = $2, updated_utc = NOW() WHERE section_id = $1",
        )
        .bind(section_id)
        .bind(SectionReviewStatus::InReview.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark section in review: {}", e))
        })?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();
        info!(review_id = %review.review_id, section_id = %section_id, "Section review created");

        Ok(review)
    }

    /// List review requests for a section.
    #[instrument(skip(self), fields(section_id = %section_id))]
    pub async fn list_reviews(&self, section_id: Uuid) -> Result<Vec<SectionReview>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_reviews"])
            .start_timer();

        let reviews = sqlx::query_as::<_, SectionReview>(
            r#"
            SELECT review_id, section_id, access_token, recipient_name, recipient_email, message, status, created_utc, responded_utc
            FROM final_account_section_reviews
            WHERE section_id = $1
            ORDER BY created_utc
            "#,
        )
        .bind(section_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list reviews: {}", e)))?;

        timer.observe_duration();

        Ok(reviews)
    }

    /// Look up a review request by its access token.
    #[instrument(skip(self, token))]
    pub async fn get_review_by_token(&self, token: &str) -> Result<Option<SectionReview>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_review_by_token"])
            .start_timer();

        let review = sqlx::query_as::<_, SectionReview>(
            r#"
            SELECT review_id, section_id, access_token, recipient_name, recipient_email, message, status, created_utc, responded_utc
            FROM final_account_section_reviews
            WHERE access_token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get review: {}", e)))?;

        timer.observe_duration();

        Ok(review)
    }

    /// Record the reviewer's decision and mirror it onto the section.
    #[instrument(skip(self), fields(review_id = %review_id))]
    pub async fn update_review_status(
        &self,
        review_id: Uuid,
        status: ReviewRequestStatus,
    ) -> Result<Option<SectionReview>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_review_status"])
            .start_timer();

        let mut tx = self.begin().await?;

        let review = sqlx::query_as::<_, SectionReview>(
            r#"
            UPDATE final_account_section_reviews
            SET status = $2, responded_utc = NOW()
            WHERE review_id = $1
            RETURNING review_id, section_id, access_token, recipient_name, recipient_email, message, status, created_utc, responded_utc
            "#,
        )
        .bind(review_id)
        .bind(status.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update review: {}", e)))?;

        let Some(review) = review else {
            return Ok(None);
        };

        let section_status = match status {
            ReviewRequestStatus::Approved => Some(SectionReviewStatus::Approved),
            ReviewRequestStatus::Rejected => Some(SectionReviewStatus::Rejected),
            ReviewRequestStatus::Pending => None,
        };

        if let Some(section_status) = section_status {
            sqlx::query(
                "UPDATE final_account_sections SET review_status = $2, updated_utc = NOW() WHERE section_id = $1",
            )
            .bind(review.section_id)
            .bind(section_status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update section status: {}", e))
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();

        Ok(Some(review))
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        self.pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e)))
    }
}

// =========================================================================
// Transaction helpers
// =========================================================================

async fn section_must_exist(
    tx: &mut Transaction<'_, Postgres>,
    section_id: Uuid,
) -> Result<(), AppError> {
    let exists: Option<Uuid> =
        sqlx::query_scalar("SELECT section_id FROM final_account_sections WHERE section_id = $1")
            .bind(section_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to check section: {}", e)))?;

    exists
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Section not found")))
}

/// Validate the P&A fields of a row and resolve its parent when it has one.
///
/// A P&A row must reference a Prime Cost row in the same section, must not
/// reference itself, and its percentage must lie in 0..=100.
async fn resolve_and_validate_parent(
    tx: &mut Transaction<'_, Postgres>,
    item: &LineItem,
) -> Result<Option<LineItem>, AppError> {
    if let Some(pct) = item.pa_percentage {
        if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "pa_percentage must be between 0 and 100"
            )));
        }
    }

    if !item.is_pa_item {
        if item.pa_parent_item_id.is_some() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "pa_parent_item_id requires is_pa_item"
            )));
        }
        return Ok(None);
    }

    let Some(parent_id) = item.pa_parent_item_id else {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "P&A item requires pa_parent_item_id"
        )));
    };

    if parent_id == item.item_id {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "P&A item cannot reference itself"
        )));
    }

    let parent = sqlx::query_as::<_, LineItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM final_account_items WHERE item_id = $1"
    ))
    .bind(parent_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load parent item: {}", e)))?
    .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("P&A parent item not found")))?;

    if parent.section_id != item.section_id {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "P&A parent must belong to the same section"
        )));
    }

    if !parent.is_prime_cost {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "P&A parent must be a Prime Cost item"
        )));
    }

    Ok(Some(parent))
}

fn set_amounts(item: &mut LineItem, parent: Option<&LineItem>) {
    let amounts = calc::derive_amounts(item, parent);
    item.contract_amount = Some(amounts.contract_amount);
    item.final_amount = Some(amounts.final_amount);
    item.variation_amount = Some(amounts.variation_amount);
}

async fn insert_item(tx: &mut Transaction<'_, Postgres>, item: &LineItem) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO final_account_items (item_id, section_id, item_code, description, unit,
            contract_quantity, final_quantity, supply_rate, install_rate,
            contract_amount, final_amount, variation_amount, is_rate_only,
            is_prime_cost, pc_allowance, pc_actual_cost, is_pa_item,
            pa_parent_item_id, pa_percentage, display_order, shop_subsection_id,
            created_utc, updated_utc)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
        "#,
    )
    .bind(item.item_id)
    .bind(item.section_id)
    .bind(&item.item_code)
    .bind(&item.description)
    .bind(&item.unit)
    .bind(item.contract_quantity)
    .bind(item.final_quantity)
    .bind(item.supply_rate)
    .bind(item.install_rate)
    .bind(item.contract_amount)
    .bind(item.final_amount)
    .bind(item.variation_amount)
    .bind(item.is_rate_only)
    .bind(item.is_prime_cost)
    .bind(item.pc_allowance)
    .bind(item.pc_actual_cost)
    .bind(item.is_pa_item)
    .bind(item.pa_parent_item_id)
    .bind(item.pa_percentage)
    .bind(item.display_order)
    .bind(item.shop_subsection_id)
    .bind(item.created_utc)
    .bind(item.updated_utc)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert item: {}", e)))?;

    Ok(())
}

/// Persist the full merged row back to storage.
async fn store_item(tx: &mut Transaction<'_, Postgres>, item: &LineItem) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE final_account_items
        SET item_code = $2, description = $3, unit = $4,
            contract_quantity = $5, final_quantity = $6, supply_rate = $7, install_rate = $8,
            contract_amount = $9, final_amount = $10, variation_amount = $11,
            is_rate_only = $12, is_prime_cost = $13, pc_allowance = $14, pc_actual_cost = $15,
            is_pa_item = $16, pa_parent_item_id = $17, pa_percentage = $18,
            display_order = $19, shop_subsection_id = $20, updated_utc = $21
        WHERE item_id = $1
        "#,
    )
    .bind(item.item_id)
    .bind(&item.item_code)
    .bind(&item.description)
    .bind(&item.unit)
    .bind(item.contract_quantity)
    .bind(item.final_quantity)
    .bind(item.supply_rate)
    .bind(item.install_rate)
    .bind(item.contract_amount)
    .bind(item.final_amount)
    .bind(item.variation_amount)
    .bind(item.is_rate_only)
    .bind(item.is_prime_cost)
    .bind(item.pc_allowance)
    .bind(item.pc_actual_cost)
    .bind(item.is_pa_item)
    .bind(item.pa_parent_item_id)
    .bind(item.pa_percentage)
    .bind(item.display_order)
    .bind(item.shop_subsection_id)
    .bind(item.updated_utc)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to store item: {}", e)))?;

    Ok(())
}

async fn insert_history(
    tx: &mut Transaction<'_, Postgres>,
    item_id: Uuid,
    input: &UpdateLineItem,
) -> Result<(), AppError> {
    let changed_fields = serde_json::to_value(input)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode history: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO final_account_item_history (history_id, item_id, changed_fields)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(item_id)
    .bind(changed_fields)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert history: {}", e)))?;

    Ok(())
}

/// Recompute every P&A child referencing the given row and persist each one.
async fn cascade_to_children(
    tx: &mut Transaction<'_, Postgres>,
    parent: &LineItem,
) -> Result<Vec<LineItem>, AppError> {
    let children = sqlx::query_as::<_, LineItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM final_account_items WHERE pa_parent_item_id = $1 FOR UPDATE"
    ))
    .bind(parent.item_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load P&A children: {}", e)))?;

    let mut updated = Vec::with_capacity(children.len());
    for mut child in children {
        set_amounts(&mut child, Some(parent));
        child.updated_utc = Utc::now();
        store_item(tx, &child).await?;
        updated.push(child);
    }

    Ok(updated)
}

/// Re-aggregate a section from its current items and persist the totals,
/// returning the fresh section row.
async fn refresh_section_totals(
    tx: &mut Transaction<'_, Postgres>,
    section_id: Uuid,
) -> Result<Section, AppError> {
    let items = sqlx::query_as::<_, LineItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM final_account_items WHERE section_id = $1 ORDER BY display_order"
    ))
    .bind(section_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load section items: {}", e)))?;

    let totals = calc::aggregate_section(&items);

    let section = sqlx::query_as::<_, Section>(&format!(
        r#"
        UPDATE final_account_sections
        SET contract_total = $2, final_total = $3, variation_total = $4, updated_utc = NOW()
        WHERE section_id = $1
        RETURNING {SECTION_COLUMNS}
        "#
    ))
    .bind(section_id)
    .bind(totals.contract_total)
    .bind(totals.final_total)
    .bind(totals.variation_total)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to store section totals: {}", e)))?;

    Ok(section)
}
