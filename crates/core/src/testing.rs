//! In-memory stand-ins for the external collaborators.

use crate::domain::analysis::{
    merge_fields, AnalysisFields, AnalysisKey, FinancialAnalysis, UpsertOutcome,
};
use crate::domain::receipt::{ExtractedReceipt, NewReceipt, Receipt};
use crate::llm::error::{GatewayStatus, LlmDiagnosticsError};
use crate::llm::{GenerateRequest, Generation, LlmClient, Provider};
use crate::storage::object::ObjectStore;
use crate::storage::{AnalysisStore, ReceiptStore};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

pub enum Scripted {
    Reply(Generation),
    Fail(&'static str),
    Status(GatewayStatus),
}

#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Scripted>>,
    pub requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Scripted>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn text(s: impl Into<String>) -> Scripted {
        Scripted::Reply(Generation::Text(s.into()))
    }

    pub fn tool(name: &str, arguments: serde_json::Value) -> Scripted {
        Scripted::Reply(Generation::ToolCall {
            name: name.to_string(),
            arguments,
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider(&self) -> Provider {
        Provider::Scripted
    }

    async fn generate(&self, request: GenerateRequest) -> anyhow::Result<Generation> {
        self.requests.lock().unwrap().push(request);
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted reply left");
        match next {
            Scripted::Reply(g) => Ok(g),
            Scripted::Fail(msg) => Err(anyhow::anyhow!(msg)),
            Scripted::Status(status) => Err(LlmDiagnosticsError {
                provider: Provider::Scripted,
                stage: "http",
                status,
                detail: format!("{status:?}"),
                raw_output: None,
                raw_response_json: None,
            }
            .into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryAnalysisStore {
    pub rows: Mutex<HashMap<AnalysisKey, FinancialAnalysis>>,
    pub fail_writes: bool,
}

impl MemoryAnalysisStore {
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    pub fn row(&self, key: AnalysisKey) -> Option<FinancialAnalysis> {
        self.rows.lock().unwrap().get(&key).cloned()
    }
}

#[async_trait::async_trait]
impl AnalysisStore for MemoryAnalysisStore {
    async fn upsert(
        &self,
        key: AnalysisKey,
        fields: &AnalysisFields,
    ) -> anyhow::Result<UpsertOutcome> {
        anyhow::ensure!(!self.fail_writes, "database unavailable");
        let mut rows = self.rows.lock().unwrap();
        let existing = rows.get(&key).cloned();
        let Some(merged) = merge_fields(existing.as_ref(), key, fields, Utc::now()) else {
            return Ok(UpsertOutcome::Skipped);
        };
        rows.insert(key, merged);
        Ok(if existing.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    async fn get(&self, key: AnalysisKey) -> anyhow::Result<Option<FinancialAnalysis>> {
        Ok(self.row(key))
    }

    async fn recent(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<FinancialAnalysis>> {
        let mut out: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.key.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| (b.key.year, b.key.month).cmp(&(a.key.year, a.key.month)));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }
}

#[derive(Default)]
pub struct MemoryReceiptStore {
    pub receipts: Mutex<Vec<Receipt>>,
}

impl MemoryReceiptStore {
    pub fn with_existing(receipts: Vec<Receipt>) -> Self {
        Self {
            receipts: Mutex::new(receipts),
        }
    }
}

#[async_trait::async_trait]
impl ReceiptStore for MemoryReceiptStore {
    async fn insert(&self, receipt: &NewReceipt) -> anyhow::Result<Receipt> {
        let stored = Receipt {
            id: Uuid::new_v4(),
            user_id: receipt.user_id,
            month: receipt.month,
            year: receipt.year,
            file_path: receipt.file_path.clone(),
            file_name: receipt.file_name.clone(),
            amount: None,
            description: None,
            upload_date: Utc::now(),
        };
        self.receipts.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn record_extraction(
        &self,
        receipt_id: Uuid,
        extracted: &ExtractedReceipt,
    ) -> anyhow::Result<()> {
        let mut receipts = self.receipts.lock().unwrap();
        let r = receipts
            .iter_mut()
            .find(|r| r.id == receipt_id)
            .ok_or_else(|| anyhow::anyhow!("receipt {receipt_id} not found"))?;
        r.amount = Some(extracted.amount);
        r.description = Some(extracted.description.clone());
        Ok(())
    }

    async fn list_for_period(
        &self,
        user_id: Uuid,
        month: u32,
        year: i32,
    ) -> anyhow::Result<Vec<Receipt>> {
        Ok(self
            .receipts
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id && r.month == month && r.year == year)
            .cloned()
            .collect())
    }

    async fn get(&self, user_id: Uuid, receipt_id: Uuid) -> anyhow::Result<Option<Receipt>> {
        Ok(self
            .receipts
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == receipt_id && r.user_id == user_id)
            .cloned())
    }

    async fn delete(&self, user_id: Uuid, receipt_id: Uuid) -> anyhow::Result<bool> {
        let mut receipts = self.receipts.lock().unwrap();
        let before = receipts.len();
        receipts.retain(|r| !(r.id == receipt_id && r.user_id == user_id));
        Ok(receipts.len() < before)
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    /// Uploads whose path contains one of these fragments fail.
    pub fail_paths_containing: Vec<&'static str>,
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.fail_paths_containing.iter().any(|f| path.contains(f)),
            "storage rejected {path}"
        );
        self.objects.lock().unwrap().insert(path.to_string(), bytes);
        Ok(())
    }

    async fn download(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("object {path} not found"))
    }

    async fn remove(&self, paths: &[String]) -> anyhow::Result<()> {
        let mut objects = self.objects.lock().unwrap();
        for p in paths {
            objects.remove(p);
        }
        Ok(())
    }
}
