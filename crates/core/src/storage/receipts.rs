use crate::domain::receipt::{ExtractedReceipt, NewReceipt, Receipt};
use crate::storage::{PgStore, ReceiptStore};
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

type ReceiptRow = (
    Uuid,
    Uuid,
    i32,
    i32,
    String,
    String,
    Option<f64>,
    Option<String>,
    DateTime<Utc>,
);

fn into_receipt(row: ReceiptRow) -> anyhow::Result<Receipt> {
    let (id, user_id, month, year, file_path, file_name, amount, description, upload_date) = row;
    let month =
        u32::try_from(month).with_context(|| format!("invalid month in DB for receipt id={id}"))?;
    Ok(Receipt {
        id,
        user_id,
        month,
        year,
        file_path,
        file_name,
        amount,
        description,
        upload_date,
    })
}

/// Sum of every extracted amount on record for the period. Receipts still awaiting extraction
/// contribute nothing.
pub fn total_amount(receipts: &[Receipt]) -> f64 {
    receipts.iter().filter_map(|r| r.amount).sum()
}

#[async_trait::async_trait]
impl ReceiptStore for PgStore {
    async fn insert(&self, receipt: &NewReceipt) -> anyhow::Result<Receipt> {
        let row = sqlx::query_as::<_, ReceiptRow>(
            "INSERT INTO receipts (id, user_id, month, year, file_path, file_name, upload_date) \
             VALUES ($1, $2, $3, $4, $5, $6, now()) \
             RETURNING id, user_id, month, year, file_path, file_name, amount, description, upload_date",
        )
        .bind(Uuid::new_v4())
        .bind(receipt.user_id)
        .bind(receipt.month as i32)
        .bind(receipt.year)
        .bind(&receipt.file_path)
        .bind(&receipt.file_name)
        .fetch_one(&self.pool)
        .await
        .context("insert receipts failed")?;

        into_receipt(row)
    }

    async fn record_extraction(
        &self,
        receipt_id: Uuid,
        extracted: &ExtractedReceipt,
    ) -> anyhow::Result<()> {
        let res = sqlx::query("UPDATE receipts SET amount = $2, description = $3 WHERE id = $1")
            .bind(receipt_id)
            .bind(extracted.amount)
            .bind(&extracted.description)
            .execute(&self.pool)
            .await
            .context("update receipts extraction failed")?;
        anyhow::ensure!(
            res.rows_affected() == 1,
            "receipt {receipt_id} not found when recording extraction"
        );
        Ok(())
    }

    async fn list_for_period(
        &self,
        user_id: Uuid,
        month: u32,
        year: i32,
    ) -> anyhow::Result<Vec<Receipt>> {
        let rows = sqlx::query_as::<_, ReceiptRow>(
            "SELECT id, user_id, month, year, file_path, file_name, amount, description, upload_date \
             FROM receipts \
             WHERE user_id = $1 AND month = $2 AND year = $3 \
             ORDER BY upload_date ASC",
        )
        .bind(user_id)
        .bind(month as i32)
        .bind(year)
        .fetch_all(&self.pool)
        .await
        .context("select receipts failed")?;

        rows.into_iter().map(into_receipt).collect()
    }

    async fn get(&self, user_id: Uuid, receipt_id: Uuid) -> anyhow::Result<Option<Receipt>> {
        let row = sqlx::query_as::<_, ReceiptRow>(
            "SELECT id, user_id, month, year, file_path, file_name, amount, description, upload_date \
             FROM receipts \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(receipt_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("select receipt failed")?;

        row.map(into_receipt).transpose()
    }

    async fn delete(&self, user_id: Uuid, receipt_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM receipts WHERE id = $1 AND user_id = $2")
            .bind(receipt_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("delete receipt failed")?;
        Ok(res.rows_affected() > 0)
    }
}
