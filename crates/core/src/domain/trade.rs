use crate::domain::analysis::RiskLevel;
use crate::domain::validation::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeDirection::Buy => "buy",
            TradeDirection::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl TradeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeStatus::Open => "open",
            TradeStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvestmentGoal {
    #[serde(rename = "short-term")]
    ShortTerm,
    #[serde(rename = "long-term")]
    LongTerm,
}

impl InvestmentGoal {
    pub fn as_str(self) -> &'static str {
        match self {
            InvestmentGoal::ShortTerm => "short-term",
            InvestmentGoal::LongTerm => "long-term",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "short-term" => Some(InvestmentGoal::ShortTerm),
            "long-term" => Some(InvestmentGoal::LongTerm),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: Uuid,
    pub user_id: Uuid,
    pub investment_goal: InvestmentGoal,
    pub risk_appetite: RiskLevel,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeInput {
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub trade_type: TradeDirection,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub entry_date: DateTime<Utc>,
    pub exit_date: Option<DateTime<Utc>>,
    /// Chosen by the user. When omitted, a trade with an exit price is closed.
    #[serde(default)]
    pub status: Option<TradeStatus>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub user_id: Uuid,
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub trade_type: TradeDirection,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub entry_date: DateTime<Utc>,
    pub exit_date: Option<DateTime<Utc>>,
    pub pnl: Option<f64>,
    pub pnl_percent: Option<f64>,
    pub status: TradeStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PnL {
    pub pnl: f64,
    pub pnl_percent: f64,
}

/// Profit and loss for a closed position. The percentage follows the price move and is not
/// flipped for short trades.
pub fn compute_pnl(direction: TradeDirection, entry: f64, exit: f64, quantity: f64) -> PnL {
    let pnl = match direction {
        TradeDirection::Buy => (exit - entry) * quantity,
        TradeDirection::Sell => (entry - exit) * quantity,
    };
    PnL {
        pnl,
        pnl_percent: ((exit - entry) / entry) * 100.0,
    }
}

impl TradeInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.trim().is_empty() {
            return Err(ValidationError::new("symbol", "must be non-empty"));
        }
        if !(self.quantity.is_finite() && self.quantity > 0.0) {
            return Err(ValidationError::new("quantity", "must be a positive number"));
        }
        if !(self.entry_price.is_finite() && self.entry_price > 0.0) {
            return Err(ValidationError::new("entry_price", "must be a positive number"));
        }
        if let Some(exit) = self.exit_price {
            if !(exit.is_finite() && exit >= 0.0) {
                return Err(ValidationError::new("exit_price", "must be a non-negative number"));
            }
        }
        if self.status == Some(TradeStatus::Closed) && self.exit_price.is_none() {
            return Err(ValidationError::new("status", "a closed trade needs an exit price"));
        }
        Ok(())
    }

    /// Builds the stored trade with PnL fixed at save time.
    pub fn into_trade(self, id: Uuid, user_id: Uuid) -> Result<Trade, ValidationError> {
        self.validate()?;
        let pnl = self
            .exit_price
            .map(|exit| compute_pnl(self.trade_type, self.entry_price, exit, self.quantity));
        let status = self.status.unwrap_or(if self.exit_price.is_some() {
            TradeStatus::Closed
        } else {
            TradeStatus::Open
        });
        Ok(Trade {
            id,
            user_id,
            portfolio_id: self.portfolio_id,
            symbol: self.symbol.trim().to_ascii_uppercase(),
            trade_type: self.trade_type,
            quantity: self.quantity,
            entry_price: self.entry_price,
            exit_price: self.exit_price,
            entry_date: self.entry_date,
            exit_date: self.exit_date,
            pnl: pnl.map(|p| p.pnl),
            pnl_percent: pnl.map(|p| p.pnl_percent),
            status,
            notes: self.notes.filter(|n| !n.trim().is_empty()),
        })
    }
}

/// Journal totals over a set of trades.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeStats {
    pub total_trades: usize,
    pub open_trades: usize,
    pub closed_trades: usize,
    /// Sum of every recorded PnL, open trades with an exit price included.
    pub total_pnl: f64,
    /// Share of closed trades with a recorded PnL that made money, as a percentage. Zero when
    /// there are none.
    pub win_rate: f64,
}

impl TradeStats {
    pub fn from_trades(trades: &[Trade]) -> Self {
        let total_pnl: f64 = trades.iter().filter_map(|t| t.pnl).sum();
        let closed_trades = trades
            .iter()
            .filter(|t| t.status == TradeStatus::Closed)
            .count();

        let scored: Vec<f64> = trades
            .iter()
            .filter(|t| t.status == TradeStatus::Closed)
            .filter_map(|t| t.pnl)
            .collect();
        let win_rate = if scored.is_empty() {
            0.0
        } else {
            let winners = scored.iter().filter(|pnl| **pnl > 0.0).count();
            winners as f64 / scored.len() as f64 * 100.0
        };

        Self {
            total_trades: trades.len(),
            open_trades: trades.len() - closed_trades,
            closed_trades,
            total_pnl,
            win_rate,
        }
    }
}
