pub mod analyses;
pub mod object;
pub mod receipts;
pub mod trades;

use crate::domain::analysis::{AnalysisFields, AnalysisKey, FinancialAnalysis, UpsertOutcome};
use crate::domain::receipt::{ExtractedReceipt, NewReceipt, Receipt};
use anyhow::Context;
use uuid::Uuid;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Persistence for the monthly `financial_analyses` rows. Writes are last-writer-wins.
#[async_trait::async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Updates the supplied fields of an existing row, or inserts a row when none exists and the
    /// fields are complete. `monthly_available` is rederived on every write.
    async fn upsert(
        &self,
        key: AnalysisKey,
        fields: &AnalysisFields,
    ) -> anyhow::Result<UpsertOutcome>;

    async fn get(&self, key: AnalysisKey) -> anyhow::Result<Option<FinancialAnalysis>>;

    /// Newest month first.
    async fn recent(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<FinancialAnalysis>>;
}

#[async_trait::async_trait]
pub trait ReceiptStore: Send + Sync {
    async fn insert(&self, receipt: &NewReceipt) -> anyhow::Result<Receipt>;

    async fn record_extraction(
        &self,
        receipt_id: Uuid,
        extracted: &ExtractedReceipt,
    ) -> anyhow::Result<()>;

    async fn list_for_period(
        &self,
        user_id: Uuid,
        month: u32,
        year: i32,
    ) -> anyhow::Result<Vec<Receipt>>;

    async fn get(&self, user_id: Uuid, receipt_id: Uuid) -> anyhow::Result<Option<Receipt>>;

    async fn delete(&self, user_id: Uuid, receipt_id: Uuid) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}
