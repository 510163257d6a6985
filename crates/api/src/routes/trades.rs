use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use finscope_core::domain::analysis::RiskLevel;
use finscope_core::domain::holding::HoldingsOverview;
use finscope_core::domain::trade::{InvestmentGoal, Portfolio, Trade, TradeInput, TradeStats};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioRequest {
    pub investment_goal: InvestmentGoal,
    pub risk_appetite: RiskLevel,
}

pub async fn upsert_portfolio(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PortfolioRequest>,
) -> Result<Json<Portfolio>, ApiError> {
    let user = state.require_user(&headers).await?;
    let portfolio = state
        .store()?
        .upsert_portfolio(user.id, req.investment_goal, req.risk_appetite)
        .await?;
    tracing::info!(user_id = %user.id, goal = req.investment_goal.as_str(), risk = req.risk_appetite.as_str(), "portfolio saved");
    Ok(Json(portfolio))
}

pub async fn list_portfolios(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Portfolio>>, ApiError> {
    let user = state.require_user(&headers).await?;
    Ok(Json(state.store()?.list_portfolios(user.id).await?))
}

pub async fn create_trade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<TradeInput>,
) -> Result<(StatusCode, Json<Trade>), ApiError> {
    let user = state.require_user(&headers).await?;
    let store = state.store()?;

    let owned = store
        .list_portfolios(user.id)
        .await?
        .iter()
        .any(|p| p.id == input.portfolio_id);
    if !owned {
        return Err(ApiError::NotFound("portfolio"));
    }

    let trade = input.into_trade(Uuid::new_v4(), user.id)?;
    store.insert_trade(&trade).await?;
    tracing::info!(user_id = %user.id, trade_id = %trade.id, symbol = %trade.symbol, status = trade.status.as_str(), "trade recorded");
    Ok((StatusCode::CREATED, Json(trade)))
}

#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    pub portfolio: Option<Uuid>,
}

pub async fn list_trades(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<TradesQuery>,
) -> Result<Json<Vec<Trade>>, ApiError> {
    let user = state.require_user(&headers).await?;
    Ok(Json(state.store()?.list_trades(user.id, q.portfolio).await?))
}

pub async fn trade_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<TradesQuery>,
) -> Result<Json<TradeStats>, ApiError> {
    let user = state.require_user(&headers).await?;
    let trades = state.store()?.list_trades(user.id, q.portfolio).await?;
    Ok(Json(TradeStats::from_trades(&trades)))
}

pub async fn holdings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<HoldingsOverview>, ApiError> {
    let user = state.require_user(&headers).await?;
    let holdings = state.store()?.list_holdings(user.id).await?;
    Ok(Json(HoldingsOverview::from_holdings(holdings)))
}
