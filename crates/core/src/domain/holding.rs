use serde::Serialize;
use uuid::Uuid;

/// A position as stored in `user_holdings`. Valuation columns are maintained outside this
/// service and may be missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub name: String,
    pub asset_type: String,
    pub quantity: f64,
    pub average_price: Option<f64>,
    pub current_price: Option<f64>,
    pub total_value: Option<f64>,
    pub profit_loss: Option<f64>,
    pub profit_loss_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingsOverview {
    pub holdings: Vec<Holding>,
    pub total_value: f64,
    pub total_profit_loss: f64,
    /// Profit relative to cost (value minus profit). Zero when there is no cost basis.
    pub total_profit_loss_percent: f64,
}

impl HoldingsOverview {
    pub fn from_holdings(holdings: Vec<Holding>) -> Self {
        let total_value: f64 = holdings.iter().filter_map(|h| h.total_value).sum();
        let total_profit_loss: f64 = holdings.iter().filter_map(|h| h.profit_loss).sum();
        let cost = total_value - total_profit_loss;
        let total_profit_loss_percent = if total_value > 0.0 && cost > 0.0 {
            total_profit_loss / cost * 100.0
        } else {
            0.0
        };
        Self {
            holdings,
            total_value,
            total_profit_loss,
            total_profit_loss_percent,
        }
    }
}
