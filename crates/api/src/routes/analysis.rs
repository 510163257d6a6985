use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use finscope_core::aggregator::PersistStatus;
use finscope_core::domain::analysis::{AnalysisKey, AnalysisResult, FinancialAnalysis};
use finscope_core::metrics::{FinancialForm, FinancialInputs};
use finscope_core::storage::AnalysisStore;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::period_or_current;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 6;
const MAX_HISTORY_LIMIT: i64 = 24;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(flatten)]
    pub form: FinancialForm,
    #[serde(default)]
    pub month: Option<u32>,
    #[serde(default)]
    pub year: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub result: AnalysisResult,
    pub partial: bool,
    pub persisted: PersistStatus,
}

pub async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let inputs = FinancialInputs::from_form(&req.form)?;
    let user = state.current_user(&headers).await?;

    let key = match user {
        Some(user) => {
            let (month, year) = period_or_current(req.month, req.year)?;
            Some(AnalysisKey::new(user.id, month, year)?)
        }
        None => None,
    };

    let report = state.aggregator()?.analyze(inputs, key).await?;

    Ok(Json(AnalyzeResponse {
        result: report.outcome.to_result(),
        partial: report.outcome.is_partial(),
        persisted: report.persisted,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

pub async fn list_analyses(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<FinancialAnalysis>>, ApiError> {
    let user = state.require_user(&headers).await?;
    let limit = q
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let rows = state.store()?.recent(user.id, limit).await?;
    Ok(Json(rows))
}
