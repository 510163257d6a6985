use crate::domain::analysis::RiskLevel;
use crate::domain::holding::Holding;
use crate::domain::trade::{InvestmentGoal, Portfolio, Trade, TradeDirection, TradeStatus};
use crate::storage::PgStore;
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

type PortfolioRow = (Uuid, Uuid, String, String, DateTime<Utc>);

fn into_portfolio(row: PortfolioRow) -> anyhow::Result<Portfolio> {
    let (id, user_id, goal, risk, updated_at) = row;
    Ok(Portfolio {
        id,
        user_id,
        investment_goal: InvestmentGoal::parse(&goal)
            .with_context(|| format!("invalid investment_goal in DB: {goal}"))?,
        risk_appetite: RiskLevel::parse(&risk)
            .with_context(|| format!("invalid risk_appetite in DB: {risk}"))?,
        updated_at,
    })
}

#[derive(Debug, sqlx::FromRow)]
struct TradeRow {
    id: Uuid,
    user_id: Uuid,
    portfolio_id: Uuid,
    symbol: String,
    trade_type: String,
    quantity: f64,
    entry_price: f64,
    exit_price: Option<f64>,
    entry_date: DateTime<Utc>,
    exit_date: Option<DateTime<Utc>>,
    pnl: Option<f64>,
    pnl_percent: Option<f64>,
    status: String,
    notes: Option<String>,
}

impl TradeRow {
    fn into_trade(self) -> anyhow::Result<Trade> {
        let trade_type = match self.trade_type.as_str() {
            "buy" => TradeDirection::Buy,
            "sell" => TradeDirection::Sell,
            other => anyhow::bail!("invalid trade_type in DB for trade id={}: {other}", self.id),
        };
        let status = match self.status.as_str() {
            "open" => TradeStatus::Open,
            "closed" => TradeStatus::Closed,
            other => anyhow::bail!("invalid status in DB for trade id={}: {other}", self.id),
        };
        Ok(Trade {
            id: self.id,
            user_id: self.user_id,
            portfolio_id: self.portfolio_id,
            symbol: self.symbol,
            trade_type,
            quantity: self.quantity,
            entry_price: self.entry_price,
            exit_price: self.exit_price,
            entry_date: self.entry_date,
            exit_date: self.exit_date,
            pnl: self.pnl,
            pnl_percent: self.pnl_percent,
            status,
            notes: self.notes,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HoldingRow {
    id: Uuid,
    user_id: Uuid,
    symbol: String,
    name: String,
    asset_type: String,
    quantity: f64,
    average_price: Option<f64>,
    current_price: Option<f64>,
    total_value: Option<f64>,
    profit_loss: Option<f64>,
    profit_loss_percent: Option<f64>,
}

impl From<HoldingRow> for Holding {
    fn from(row: HoldingRow) -> Self {
        Holding {
            id: row.id,
            user_id: row.user_id,
            symbol: row.symbol,
            name: row.name,
            asset_type: row.asset_type,
            quantity: row.quantity,
            average_price: row.average_price,
            current_price: row.current_price,
            total_value: row.total_value,
            profit_loss: row.profit_loss,
            profit_loss_percent: row.profit_loss_percent,
        }
    }
}

impl PgStore {
    pub async fn upsert_portfolio(
        &self,
        user_id: Uuid,
        goal: InvestmentGoal,
        risk: RiskLevel,
    ) -> anyhow::Result<Portfolio> {
        let row = sqlx::query_as::<_, PortfolioRow>(
            "INSERT INTO user_portfolios (id, user_id, investment_goal, risk_appetite) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, investment_goal) DO UPDATE \
               SET risk_appetite = EXCLUDED.risk_appetite, updated_at = now() \
             RETURNING id, user_id, investment_goal, risk_appetite, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(goal.as_str())
        .bind(risk.as_str())
        .fetch_one(&self.pool)
        .await
        .context("upsert user_portfolios failed")?;

        into_portfolio(row)
    }

    pub async fn list_portfolios(&self, user_id: Uuid) -> anyhow::Result<Vec<Portfolio>> {
        let rows = sqlx::query_as::<_, PortfolioRow>(
            "SELECT id, user_id, investment_goal, risk_appetite, updated_at \
             FROM user_portfolios \
             WHERE user_id = $1 \
             ORDER BY investment_goal ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("select user_portfolios failed")?;

        rows.into_iter().map(into_portfolio).collect()
    }

    /// Stores a trade whose PnL was fixed when it was built; it is never recomputed here.
    pub async fn insert_trade(&self, trade: &Trade) -> anyhow::Result<()> {
        let owned: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM user_portfolios WHERE id = $1 AND user_id = $2",
        )
        .bind(trade.portfolio_id)
        .bind(trade.user_id)
        .fetch_optional(&self.pool)
        .await
        .context("select portfolio owner failed")?;
        anyhow::ensure!(
            owned.is_some(),
            "portfolio {} does not belong to user {}",
            trade.portfolio_id,
            trade.user_id
        );

        sqlx::query(
            "INSERT INTO trades (id, user_id, portfolio_id, symbol, trade_type, quantity, \
               entry_price, exit_price, entry_date, exit_date, pnl, pnl_percent, status, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(trade.id)
        .bind(trade.user_id)
        .bind(trade.portfolio_id)
        .bind(&trade.symbol)
        .bind(trade.trade_type.as_str())
        .bind(trade.quantity)
        .bind(trade.entry_price)
        .bind(trade.exit_price)
        .bind(trade.entry_date)
        .bind(trade.exit_date)
        .bind(trade.pnl)
        .bind(trade.pnl_percent)
        .bind(trade.status.as_str())
        .bind(&trade.notes)
        .execute(&self.pool)
        .await
        .context("insert trades failed")?;

        Ok(())
    }

    pub async fn list_trades(
        &self,
        user_id: Uuid,
        portfolio_id: Option<Uuid>,
    ) -> anyhow::Result<Vec<Trade>> {
        let rows = sqlx::query_as::<_, TradeRow>(
            "SELECT id, user_id, portfolio_id, symbol, trade_type, quantity, entry_price, \
               exit_price, entry_date, exit_date, pnl, pnl_percent, status, notes \
             FROM trades \
             WHERE user_id = $1 AND ($2::uuid IS NULL OR portfolio_id = $2) \
             ORDER BY entry_date DESC",
        )
        .bind(user_id)
        .bind(portfolio_id)
        .fetch_all(&self.pool)
        .await
        .context("select trades failed")?;

        rows.into_iter().map(TradeRow::into_trade).collect()
    }

    pub async fn list_holdings(&self, user_id: Uuid) -> anyhow::Result<Vec<Holding>> {
        let rows = sqlx::query_as::<_, HoldingRow>(
            "SELECT id, user_id, symbol, name, asset_type, quantity, average_price, \
               current_price, total_value, profit_loss, profit_loss_percent \
             FROM user_holdings \
             WHERE user_id = $1 \
             ORDER BY symbol ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("select user_holdings failed")?;

        Ok(rows.into_iter().map(Holding::from).collect())
    }
}
