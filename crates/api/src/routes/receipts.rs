use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use finscope_core::domain::analysis::AnalysisKey;
use finscope_core::domain::receipt::{ExtractedReceipt, ReceiptFile};
use finscope_core::receipts::{delete_receipt, BatchReport, ReceiptExtractor};
use finscope_core::storage::object::content_type_for;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::period_or_current;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
}

pub async fn upload_receipts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<PeriodQuery>,
    mut multipart: Multipart,
) -> Result<Json<BatchReport>, ApiError> {
    let user = state.require_user(&headers).await?;
    let (month, year) = period_or_current(q.month, q.year)?;
    let key = AnalysisKey::new(user.id, month, year)?;

    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| content_type_for(&file_name).to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read {file_name}: {e}")))?;
        files.push(ReceiptFile {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
    if files.is_empty() {
        return Err(ApiError::BadRequest("no files uploaded".to_string()));
    }

    let report = state.receipt_pipeline()?.run_batch(key, files).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    /// Object path inside the receipts bucket.
    pub image_url: String,
}

pub async fn extract_receipt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ExtractRequest>,
) -> Result<Json<ExtractedReceipt>, ApiError> {
    let user = state.require_user(&headers).await?;
    let path = req.image_url.trim().trim_start_matches('/');
    if !path.starts_with(&format!("{}/", user.id)) || path.contains("..") {
        return Err(ApiError::NotFound("receipt"));
    }
    let extracted = state.extractor()?.extract(path, None).await?;
    Ok(Json(extracted))
}

pub async fn remove_receipt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(receipt_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user = state.require_user(&headers).await?;
    let store = state.store()?;
    let objects = state.objects()?;
    if delete_receipt(objects.as_ref(), store, user.id, receipt_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("receipt"))
    }
}
