use crate::domain::validation::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_RECEIPT_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: Uuid,
    pub user_id: Uuid,
    pub month: u32,
    pub year: i32,
    pub file_path: String,
    pub file_name: String,
    pub amount: Option<f64>,
    pub description: Option<String>,
    pub upload_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReceipt {
    pub user_id: Uuid,
    pub month: u32,
    pub year: i32,
    pub file_path: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedReceipt {
    pub amount: f64,
    pub description: String,
}

/// A file submitted for ingestion, before validation.
#[derive(Debug, Clone)]
pub struct ReceiptFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ReceiptFile {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.content_type.trim().to_ascii_lowercase().starts_with("image/") {
            return Err(ValidationError::new(
                "file",
                format!("{} is not an image", self.file_name),
            ));
        }
        if self.bytes.len() > MAX_RECEIPT_BYTES {
            return Err(ValidationError::new(
                "file",
                format!("{} is larger than 5MB", self.file_name),
            ));
        }
        Ok(())
    }

    /// Storage path namespaced by user, qualified by upload time to avoid collisions.
    pub fn storage_path(&self, user_id: Uuid, uploaded_at: DateTime<Utc>) -> String {
        let name: String = self
            .file_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let name = if name.trim_matches('_').is_empty() {
            "receipt".to_string()
        } else {
            name
        };
        format!("{user_id}/{}-{name}", uploaded_at.timestamp_millis())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReceiptState {
    Uploading,
    Extracting {
        receipt_id: Uuid,
        file_path: String,
    },
    Complete {
        receipt_id: Uuid,
        amount: f64,
        description: String,
    },
    Error {
        message: String,
    },
}

impl ReceiptState {
    pub fn name(&self) -> &'static str {
        match self {
            ReceiptState::Uploading => "uploading",
            ReceiptState::Extracting { .. } => "extracting",
            ReceiptState::Complete { .. } => "complete",
            ReceiptState::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReceiptState::Complete { .. } | ReceiptState::Error { .. })
    }

    /// Moves to `next`, refusing skipped states and exits from a terminal state.
    pub fn transition(&self, next: ReceiptState) -> anyhow::Result<ReceiptState> {
        let allowed = matches!(
            (self, &next),
            (ReceiptState::Uploading, ReceiptState::Extracting { .. })
                | (ReceiptState::Uploading, ReceiptState::Error { .. })
                | (ReceiptState::Extracting { .. }, ReceiptState::Complete { .. })
                | (ReceiptState::Extracting { .. }, ReceiptState::Error { .. })
        );
        anyhow::ensure!(
            allowed,
            "illegal receipt transition: {} -> {}",
            self.name(),
            next.name()
        );
        Ok(next)
    }
}
