use crate::domain::analysis::{
    merge_fields, AnalysisFields, AnalysisKey, FinancialAnalysis, Recommendations, UpsertOutcome,
};
use crate::storage::{AnalysisStore, PgStore};
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const SELECT_COLUMNS: &str = "id, user_id, month, year, monthly_income, monthly_expenses, \
     debt_amount, credit_score, financial_score, credit_utilization, debt_to_income_ratio, \
     monthly_available, recommendations, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct AnalysisRow {
    id: Uuid,
    user_id: Uuid,
    month: i32,
    year: i32,
    monthly_income: f64,
    monthly_expenses: f64,
    debt_amount: f64,
    credit_score: i32,
    financial_score: i32,
    credit_utilization: Option<f64>,
    debt_to_income_ratio: Option<f64>,
    monthly_available: Option<f64>,
    recommendations: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AnalysisRow {
    fn into_analysis(self) -> anyhow::Result<FinancialAnalysis> {
        let month = u32::try_from(self.month)
            .with_context(|| format!("invalid month in DB for analysis id={}", self.id))?;
        let recommendations = match self.recommendations {
            Some(v) if !v.is_null() => Some(
                serde_json::from_value::<Recommendations>(v)
                    .with_context(|| format!("invalid recommendations JSON for id={}", self.id))?,
            ),
            _ => None,
        };
        Ok(FinancialAnalysis {
            id: self.id,
            key: AnalysisKey {
                user_id: self.user_id,
                month,
                year: self.year,
            },
            monthly_income: self.monthly_income,
            monthly_expenses: self.monthly_expenses,
            debt_amount: self.debt_amount,
            credit_score: self.credit_score,
            financial_score: self.financial_score,
            credit_utilization: self.credit_utilization,
            debt_to_income_ratio: self.debt_to_income_ratio,
            monthly_available: self.monthly_available,
            recommendations,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

async fn fetch_for_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    key: AnalysisKey,
) -> anyhow::Result<Option<FinancialAnalysis>> {
    let row = sqlx::query_as::<_, AnalysisRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM financial_analyses \
         WHERE user_id = $1 AND month = $2 AND year = $3 \
         FOR UPDATE"
    ))
    .bind(key.user_id)
    .bind(key.month as i32)
    .bind(key.year)
    .fetch_optional(&mut **tx)
    .await
    .context("select financial_analyses for update failed")?;

    row.map(AnalysisRow::into_analysis).transpose()
}

async fn write_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    row: &FinancialAnalysis,
    is_update: bool,
) -> anyhow::Result<()> {
    let recommendations = row
        .recommendations
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .context("serialize recommendations failed")?;

    let sql = if is_update {
        "UPDATE financial_analyses SET \
           monthly_income = $5, monthly_expenses = $6, debt_amount = $7, credit_score = $8, \
           financial_score = $9, credit_utilization = $10, debt_to_income_ratio = $11, \
           monthly_available = $12, recommendations = $13, updated_at = $15 \
         WHERE id = $1 AND user_id = $2 AND month = $3 AND year = $4"
    } else {
        // A concurrent insert for the same month resolves to last-writer-wins.
        "INSERT INTO financial_analyses (id, user_id, month, year, monthly_income, \
           monthly_expenses, debt_amount, credit_score, financial_score, credit_utilization, \
           debt_to_income_ratio, monthly_available, recommendations, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
         ON CONFLICT (user_id, month, year) DO UPDATE SET \
           monthly_income = EXCLUDED.monthly_income, \
           monthly_expenses = EXCLUDED.monthly_expenses, \
           debt_amount = EXCLUDED.debt_amount, \
           credit_score = EXCLUDED.credit_score, \
           financial_score = EXCLUDED.financial_score, \
           credit_utilization = EXCLUDED.credit_utilization, \
           debt_to_income_ratio = EXCLUDED.debt_to_income_ratio, \
           monthly_available = EXCLUDED.monthly_available, \
           recommendations = EXCLUDED.recommendations, \
           updated_at = EXCLUDED.updated_at"
    };

    sqlx::query(sql)
        .bind(row.id)
        .bind(row.key.user_id)
        .bind(row.key.month as i32)
        .bind(row.key.year)
        .bind(row.monthly_income)
        .bind(row.monthly_expenses)
        .bind(row.debt_amount)
        .bind(row.credit_score)
        .bind(row.financial_score)
        .bind(row.credit_utilization)
        .bind(row.debt_to_income_ratio)
        .bind(row.monthly_available)
        .bind(recommendations)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&mut **tx)
        .await
        .with_context(|| {
            if is_update {
                "update financial_analyses failed"
            } else {
                "insert financial_analyses failed"
            }
        })?;
    Ok(())
}

#[async_trait::async_trait]
impl AnalysisStore for PgStore {
    async fn upsert(
        &self,
        key: AnalysisKey,
        fields: &AnalysisFields,
    ) -> anyhow::Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await.context("begin transaction failed")?;

        let existing = fetch_for_update(&mut tx, key).await?;
        let Some(merged) = merge_fields(existing.as_ref(), key, fields, Utc::now()) else {
            tx.rollback().await.context("rollback failed")?;
            return Ok(UpsertOutcome::Skipped);
        };

        let is_update = existing.is_some();
        write_row(&mut tx, &merged, is_update).await?;
        tx.commit().await.context("commit transaction failed")?;

        tracing::debug!(
            user_id = %key.user_id,
            month = key.month,
            year = key.year,
            is_update,
            "financial analysis written"
        );

        Ok(if is_update {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    async fn get(&self, key: AnalysisKey) -> anyhow::Result<Option<FinancialAnalysis>> {
        let row = sqlx::query_as::<_, AnalysisRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM financial_analyses \
             WHERE user_id = $1 AND month = $2 AND year = $3"
        ))
        .bind(key.user_id)
        .bind(key.month as i32)
        .bind(key.year)
        .fetch_optional(&self.pool)
        .await
        .context("select financial_analyses failed")?;

        row.map(AnalysisRow::into_analysis).transpose()
    }

    async fn recent(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<FinancialAnalysis>> {
        let rows = sqlx::query_as::<_, AnalysisRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM financial_analyses \
             WHERE user_id = $1 \
             ORDER BY year DESC, month DESC \
             LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("select recent financial_analyses failed")?;

        rows.into_iter().map(AnalysisRow::into_analysis).collect()
    }
}
