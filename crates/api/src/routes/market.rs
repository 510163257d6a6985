use axum::extract::{Query, State};
use axum::Json;
use finscope_core::compare::{compare_investments, ComparisonForm, ComparisonRequest};
use finscope_core::domain::analysis::RiskLevel;
use finscope_core::domain::contract::InvestmentComparison;
use finscope_core::domain::trade::InvestmentGoal;
use finscope_core::market::{self, Quote, RecommendedAsset, SymbolMatch};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

const MAX_QUOTE_SYMBOLS: usize = 25;

pub async fn compare(
    State(state): State<AppState>,
    Json(form): Json<ComparisonForm>,
) -> Result<Json<InvestmentComparison>, ApiError> {
    let request = ComparisonRequest::from_form(&form)?;
    let llm = state.llm()?;
    let comparison = compare_investments(llm.as_ref(), &request).await?;
    Ok(Json(comparison))
}

#[derive(Debug, Deserialize)]
pub struct QuotesRequest {
    pub symbols: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct QuotesResponse {
    pub quotes: Vec<Quote>,
}

pub async fn quotes(
    State(state): State<AppState>,
    Json(req): Json<QuotesRequest>,
) -> Result<Json<QuotesResponse>, ApiError> {
    if req.symbols.len() > MAX_QUOTE_SYMBOLS {
        return Err(ApiError::BadRequest(format!(
            "at most {MAX_QUOTE_SYMBOLS} symbols per request"
        )));
    }
    let quotes = market::quotes(state.quotes.as_ref(), &req.symbols).await;
    Ok(Json(QuotesResponse { quotes }))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SymbolMatch>,
}

pub async fn search(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = q.q.as_deref().map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(ApiError::BadRequest("query parameter q is required".to_string()));
    }
    let results = state.quotes.search(query).await?;
    Ok(Json(SearchResponse { results }))
}

#[derive(Debug, Deserialize)]
pub struct RecommendationsQuery {
    pub risk: String,
    pub goal: String,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub recommendations: Vec<RecommendedAsset>,
}

pub async fn recommendations(
    State(state): State<AppState>,
    Query(q): Query<RecommendationsQuery>,
) -> Result<Json<RecommendationsResponse>, ApiError> {
    let risk = RiskLevel::parse(&q.risk)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown risk appetite: {}", q.risk)))?;
    let goal = InvestmentGoal::parse(&q.goal)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown investment goal: {}", q.goal)))?;
    let recommendations = market::recommendations(state.quotes.as_ref(), risk, goal).await;
    Ok(Json(RecommendationsResponse { recommendations }))
}
