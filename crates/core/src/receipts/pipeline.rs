use crate::domain::analysis::{AnalysisFields, AnalysisKey, UpsertOutcome};
use crate::domain::receipt::{ExtractedReceipt, NewReceipt, ReceiptFile, ReceiptState};
use crate::receipts::extractor::ReceiptExtractor;
use crate::storage::object::ObjectStore;
use crate::storage::receipts::total_amount;
use crate::storage::{AnalysisStore, ReceiptStore};
use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

pub const UPLOAD_FAILED_MESSAGE: &str = "Failed to upload receipt. Please try again.";
pub const EXTRACTION_FAILED_MESSAGE: &str = "Failed to extract receipt data";

/// A file refused by validation. It never enters the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptJob {
    pub file_name: String,
    #[serde(flatten)]
    pub state: ReceiptState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub finished: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.finished as f64 / self.total as f64 * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecomputeStatus {
    /// `monthly_expenses` was overwritten with `total`.
    Applied { total: f64 },
    /// No analysis row exists for the month; receipts alone never create one.
    Skipped { total: f64 },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub month: u32,
    pub year: i32,
    pub rejected: Vec<Rejection>,
    pub jobs: Vec<ReceiptJob>,
    pub progress: BatchProgress,
    /// Absent when no file passed validation.
    pub recompute: Option<RecomputeStatus>,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.count(|s| matches!(s, ReceiptState::Complete { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ReceiptState::Error { .. }))
    }

    fn count(&self, pred: impl Fn(&ReceiptState) -> bool) -> usize {
        self.jobs.iter().filter(|j| pred(&j.state)).count()
    }
}

#[derive(Clone)]
pub struct ReceiptPipeline {
    objects: Arc<dyn ObjectStore>,
    receipts: Arc<dyn ReceiptStore>,
    analyses: Arc<dyn AnalysisStore>,
    extractor: Arc<dyn ReceiptExtractor>,
}

impl ReceiptPipeline {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        receipts: Arc<dyn ReceiptStore>,
        analyses: Arc<dyn AnalysisStore>,
        extractor: Arc<dyn ReceiptExtractor>,
    ) -> Self {
        Self {
            objects,
            receipts,
            analyses,
            extractor,
        }
    }

    pub async fn run_batch(&self, key: AnalysisKey, files: Vec<ReceiptFile>) -> anyhow::Result<BatchReport> {
        self.run_batch_with(key, files, |_, _| {}).await
    }

    /// Processes `files` one at a time. `on_update` sees every state change together with the
    /// batch progress at that moment.
    pub async fn run_batch_with<F>(
        &self,
        key: AnalysisKey,
        files: Vec<ReceiptFile>,
        mut on_update: F,
    ) -> anyhow::Result<BatchReport>
    where
        F: FnMut(BatchProgress, &ReceiptJob) + Send,
    {
        let mut rejected = Vec::new();
        let mut accepted = Vec::new();
        for file in files {
            match file.validate() {
                Ok(()) => accepted.push(file),
                Err(err) => {
                    tracing::warn!(file_name = %file.file_name, error = %err, "receipt rejected");
                    rejected.push(Rejection {
                        file_name: file.file_name,
                        reason: err.message,
                    });
                }
            }
        }

        let mut progress = BatchProgress {
            finished: 0,
            total: accepted.len(),
        };
        let mut jobs = Vec::with_capacity(accepted.len());

        for file in accepted {
            let mut job = ReceiptJob {
                file_name: file.file_name.clone(),
                state: ReceiptState::Uploading,
            };
            on_update(progress, &job);

            self.process_file(key, file, &mut job, |job| on_update(progress, job))
                .await?;

            progress.finished += 1;
            on_update(progress, &job);
            jobs.push(job);
        }

        let recompute = if jobs.is_empty() {
            None
        } else {
            Some(match self.recompute_expenses(key).await {
                Ok(status) => status,
                Err(err) => {
                    tracing::warn!(user_id = %key.user_id, month = key.month, year = key.year, error = %format!("{err:#}"), "expense recompute failed");
                    RecomputeStatus::Failed {
                        error: format!("{err:#}"),
                    }
                }
            })
        };

        tracing::info!(
            user_id = %key.user_id,
            month = key.month,
            year = key.year,
            total = progress.total,
            rejected = rejected.len(),
            "receipt batch finished"
        );

        Ok(BatchReport {
            month: key.month,
            year: key.year,
            rejected,
            jobs,
            progress,
            recompute,
        })
    }

    /// Drives one file to a terminal state. Only an illegal state transition is an error here;
    /// upload and extraction failures end in `ReceiptState::Error`.
    async fn process_file(
        &self,
        key: AnalysisKey,
        file: ReceiptFile,
        job: &mut ReceiptJob,
        mut on_state: impl FnMut(&ReceiptJob) + Send,
    ) -> anyhow::Result<()> {
        let file_path = file.storage_path(key.user_id, Utc::now());
        let content_type = file.content_type.clone();

        let receipt_id = match self.upload(key, &file_path, file).await {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(file_name = %job.file_name, state = "uploading", error = %format!("{err:#}"), "receipt upload failed");
                job.state = job.state.transition(ReceiptState::Error {
                    message: UPLOAD_FAILED_MESSAGE.to_string(),
                })?;
                return Ok(());
            }
        };

        job.state = job.state.transition(ReceiptState::Extracting {
            receipt_id,
            file_path: file_path.clone(),
        })?;
        on_state(&*job);

        let next = match self.extract(receipt_id, &file_path, &content_type).await {
            Ok(extracted) => ReceiptState::Complete {
                receipt_id,
                amount: extracted.amount,
                description: extracted.description,
            },
            Err(err) => {
                tracing::warn!(file_name = %job.file_name, state = "extracting", error = %format!("{err:#}"), "receipt extraction failed");
                ReceiptState::Error {
                    message: EXTRACTION_FAILED_MESSAGE.to_string(),
                }
            }
        };
        job.state = job.state.transition(next)?;
        Ok(())
    }

    async fn upload(&self, key: AnalysisKey, file_path: &str, file: ReceiptFile) -> anyhow::Result<Uuid> {
        self.objects
            .upload(file_path, file.bytes, &file.content_type)
            .await
            .context("object upload failed")?;

        let inserted = self
            .receipts
            .insert(&NewReceipt {
                user_id: key.user_id,
                month: key.month,
                year: key.year,
                file_path: file_path.to_string(),
                file_name: file.file_name,
            })
            .await;

        match inserted {
            Ok(receipt) => Ok(receipt.id),
            Err(err) => {
                if let Err(cleanup) = self.objects.remove(&[file_path.to_string()]).await {
                    tracing::warn!(file_path, error = %cleanup, "failed to remove orphaned receipt object");
                }
                Err(err.context("receipt row insert failed"))
            }
        }
    }

    async fn extract(
        &self,
        receipt_id: Uuid,
        file_path: &str,
        content_type: &str,
    ) -> anyhow::Result<ExtractedReceipt> {
        let extracted = self.extractor.extract(file_path, Some(content_type)).await?;
        self.receipts
            .record_extraction(receipt_id, &extracted)
            .await?;
        Ok(extracted)
    }

    /// Sums every receipt on record for the month and overwrites that month's
    /// `monthly_expenses`, if an analysis row exists.
    pub async fn recompute_expenses(&self, key: AnalysisKey) -> anyhow::Result<RecomputeStatus> {
        let receipts = self
            .receipts
            .list_for_period(key.user_id, key.month, key.year)
            .await?;
        let total = total_amount(&receipts);

        let outcome = self
            .analyses
            .upsert(key, &AnalysisFields::expenses_only(total))
            .await?;

        Ok(match outcome {
            UpsertOutcome::Skipped => {
                tracing::info!(user_id = %key.user_id, month = key.month, year = key.year, total, "no analysis for month; expense recompute skipped");
                RecomputeStatus::Skipped { total }
            }
            UpsertOutcome::Updated | UpsertOutcome::Inserted => {
                tracing::info!(user_id = %key.user_id, month = key.month, year = key.year, total, "monthly expenses recomputed from receipts");
                RecomputeStatus::Applied { total }
            }
        })
    }

    pub async fn delete_receipt(&self, user_id: Uuid, receipt_id: Uuid) -> anyhow::Result<bool> {
        delete_receipt(self.objects.as_ref(), self.receipts.as_ref(), user_id, receipt_id).await
    }
}

/// Removes the stored object, then the row. Returns false when the receipt does not exist for
/// this user.
pub async fn delete_receipt(
    objects: &dyn ObjectStore,
    receipts: &dyn ReceiptStore,
    user_id: Uuid,
    receipt_id: Uuid,
) -> anyhow::Result<bool> {
    let Some(receipt) = receipts.get(user_id, receipt_id).await? else {
        return Ok(false);
    };
    objects
        .remove(&[receipt.file_path.clone()])
        .await
        .with_context(|| format!("failed to remove receipt object {}", receipt.file_path))?;
    receipts.delete(user_id, receipt_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::receipt::{Receipt, MAX_RECEIPT_BYTES};
    use crate::llm::prompts;
    use crate::receipts::extractor::VisionReceiptExtractor;
    use crate::testing::{
        MemoryAnalysisStore, MemoryObjectStore, MemoryReceiptStore, Scripted, ScriptedLlm,
    };
    use chrono::TimeZone;
    use serde_json::json;

    struct Harness {
        pipeline: ReceiptPipeline,
        llm: Arc<ScriptedLlm>,
        receipts: Arc<MemoryReceiptStore>,
        analyses: Arc<MemoryAnalysisStore>,
        objects: Arc<MemoryObjectStore>,
    }

    fn harness(replies: Vec<Scripted>, existing: Vec<Receipt>, objects: MemoryObjectStore) -> Harness {
        let llm = Arc::new(ScriptedLlm::new(replies));
        let objects = Arc::new(objects);
        let receipts = Arc::new(MemoryReceiptStore::with_existing(existing));
        let analyses = Arc::new(MemoryAnalysisStore::default());
        let extractor = Arc::new(VisionReceiptExtractor::new(llm.clone(), objects.clone()));
        Harness {
            pipeline: ReceiptPipeline::new(
                objects.clone(),
                receipts.clone(),
                analyses.clone(),
                extractor,
            ),
            llm,
            receipts,
            analyses,
            objects,
        }
    }

    fn key() -> AnalysisKey {
        AnalysisKey::new(Uuid::nil(), 3, 2026).unwrap()
    }

    fn image(name: &str) -> ReceiptFile {
        ReceiptFile {
            file_name: name.to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![1, 2, 3],
        }
    }

    fn amount(value: f64) -> Scripted {
        ScriptedLlm::tool(
            prompts::TOOL_EXTRACT_RECEIPT,
            json!({"amount": value, "description": "Shop"}),
        )
    }

    fn existing_receipt(amount: f64) -> Receipt {
        Receipt {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            month: 3,
            year: 2026,
            file_path: "old".into(),
            file_name: "old.png".into(),
            amount: Some(amount),
            description: Some("Earlier".into()),
            upload_date: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        }
    }

    async fn seed_analysis(analyses: &MemoryAnalysisStore) {
        analyses
            .upsert(
                key(),
                &AnalysisFields {
                    monthly_income: Some(2500.0),
                    monthly_expenses: Some(1900.0),
                    debt_amount: Some(1200.0),
                    credit_score: Some(700),
                    financial_score: Some(60),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_extraction_does_not_stop_the_batch() {
        let h = harness(
            vec![amount(10.0), Scripted::Fail("model timeout"), amount(5.5)],
            vec![existing_receipt(100.0)],
            MemoryObjectStore::default(),
        );
        seed_analysis(&h.analyses).await;

        let report = h
            .pipeline
            .run_batch(key(), vec![image("a.png"), image("b.png"), image("c.png")])
            .await
            .unwrap();

        assert_eq!(report.completed(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(
            report.jobs[1].state,
            ReceiptState::Error {
                message: EXTRACTION_FAILED_MESSAGE.to_string()
            }
        );
        assert_eq!(report.progress, BatchProgress { finished: 3, total: 3 });
        assert_eq!(report.recompute, Some(RecomputeStatus::Applied { total: 115.5 }));

        let row = h.analyses.row(key()).unwrap();
        assert_eq!(row.monthly_expenses, 115.5);
        assert_eq!(row.monthly_available, Some(2500.0 - 115.5));
        assert_eq!(row.monthly_income, 2500.0);
        assert_eq!(h.receipts.receipts.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn zero_amount_is_a_successful_extraction() {
        let h = harness(vec![amount(0.0)], vec![], MemoryObjectStore::default());
        let report = h.pipeline.run_batch(key(), vec![image("blank.png")]).await.unwrap();
        assert_eq!(report.completed(), 1);
        match &report.jobs[0].state {
            ReceiptState::Complete { amount, .. } => assert_eq!(*amount, 0.0),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_failure_errors_that_file_only() {
        let objects = MemoryObjectStore {
            fail_paths_containing: vec!["broken"],
            ..Default::default()
        };
        let h = harness(vec![amount(7.0)], vec![], objects);
        let report = h
            .pipeline
            .run_batch(key(), vec![image("broken.png"), image("ok.png")])
            .await
            .unwrap();

        assert_eq!(
            report.jobs[0].state,
            ReceiptState::Error {
                message: UPLOAD_FAILED_MESSAGE.to_string()
            }
        );
        assert_eq!(report.completed(), 1);
        assert_eq!(h.llm.request_count(), 1);
        assert_eq!(h.receipts.receipts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recompute_without_analysis_row_is_skipped() {
        let h = harness(vec![amount(12.0)], vec![], MemoryObjectStore::default());
        let report = h.pipeline.run_batch(key(), vec![image("a.png")]).await.unwrap();
        assert_eq!(report.recompute, Some(RecomputeStatus::Skipped { total: 12.0 }));
        assert!(h.analyses.row(key()).is_none());
    }

    #[tokio::test]
    async fn invalid_files_are_rejected_before_the_pipeline() {
        let h = harness(vec![], vec![], MemoryObjectStore::default());
        let pdf = ReceiptFile {
            file_name: "statement.pdf".into(),
            content_type: "application/pdf".into(),
            bytes: vec![1],
        };
        let huge = ReceiptFile {
            file_name: "huge.png".into(),
            content_type: "image/png".into(),
            bytes: vec![0; MAX_RECEIPT_BYTES + 1],
        };
        let report = h.pipeline.run_batch(key(), vec![pdf, huge]).await.unwrap();
        assert_eq!(report.rejected.len(), 2);
        assert!(report.jobs.is_empty());
        assert!(report.recompute.is_none());
        assert!(h.objects.objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn updates_report_each_state_in_order() {
        let h = harness(vec![amount(3.0)], vec![], MemoryObjectStore::default());
        let mut seen = Vec::new();
        h.pipeline
            .run_batch_with(key(), vec![image("a.png")], |progress, job| {
                seen.push((progress.finished, job.state.name()))
            })
            .await
            .unwrap();
        assert_eq!(
            seen,
            vec![(0, "uploading"), (0, "extracting"), (1, "complete")]
        );
    }

    #[tokio::test]
    async fn delete_removes_object_and_row() {
        let h = harness(vec![amount(4.0)], vec![], MemoryObjectStore::default());
        let report = h.pipeline.run_batch(key(), vec![image("a.png")]).await.unwrap();
        let ReceiptState::Complete { receipt_id, .. } = report.jobs[0].state.clone() else {
            panic!("expected a completed receipt");
        };

        assert!(h.pipeline.delete_receipt(Uuid::nil(), receipt_id).await.unwrap());
        assert!(h.objects.objects.lock().unwrap().is_empty());
        assert!(h.receipts.receipts.lock().unwrap().is_empty());
        assert!(!h.pipeline.delete_receipt(Uuid::nil(), receipt_id).await.unwrap());
    }
}
