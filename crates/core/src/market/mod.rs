//! Market quotes, symbol search and the curated recommendation pools.

pub mod yahoo;

use crate::domain::analysis::RiskLevel;
use crate::domain::trade::InvestmentGoal;
use serde::{Deserialize, Serialize};

pub use yahoo::YahooQuoteClient;

pub const MAX_RECOMMENDED_SYMBOLS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub previous_close: Option<f64>,
    pub change: f64,
    pub change_percent: f64,
    pub volume: f64,
    pub market_cap: f64,
    pub high: f64,
    pub low: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolMatch {
    pub symbol: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub exchange: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Stock,
    Etf,
}

impl AssetKind {
    /// Short plain tickers are labelled stocks, everything else ETFs.
    pub fn classify(symbol: &str) -> Self {
        if symbol.len() <= 5 && !symbol.contains('.') {
            AssetKind::Stock
        } else {
            AssetKind::Etf
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedAsset {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    #[serde(rename = "type")]
    pub kind: AssetKind,
}

#[async_trait::async_trait]
pub trait QuoteProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn quote(&self, symbol: &str) -> anyhow::Result<Quote>;

    async fn search(&self, query: &str) -> anyhow::Result<Vec<SymbolMatch>>;
}

/// Quotes for every symbol that could be fetched. A symbol that fails is logged and left out.
pub async fn quotes(provider: &dyn QuoteProvider, symbols: &[String]) -> Vec<Quote> {
    let mut out = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            continue;
        }
        match provider.quote(symbol).await {
            Ok(q) => out.push(q),
            Err(err) => {
                tracing::warn!(provider = provider.provider_name(), symbol, error = %format!("{err:#}"), "quote fetch failed; dropping symbol");
            }
        }
    }
    out
}

pub fn recommended_symbols(risk: RiskLevel, goal: InvestmentGoal) -> &'static [&'static str] {
    let pool: &'static [&'static str] = match (risk, goal) {
        (RiskLevel::Low, InvestmentGoal::ShortTerm) => &["BND", "VCSH", "SHY", "AGG", "GOVT"],
        (RiskLevel::Low, InvestmentGoal::LongTerm) => &["VOO", "VTI", "BND", "VIG", "SCHD"],
        (RiskLevel::Medium, InvestmentGoal::ShortTerm) => &["SPY", "IWM", "QQQ", "DIA", "VEA"],
        (RiskLevel::Medium, InvestmentGoal::LongTerm) => &["VTI", "VOO", "VXUS", "VEA", "VWO"],
        (RiskLevel::High, InvestmentGoal::ShortTerm) => &["QQQ", "ARKK", "TSLA", "NVDA", "AMD"],
        (RiskLevel::High, InvestmentGoal::LongTerm) => {
            &["QQQ", "VUG", "ARKK", "TSLA", "NVDA", "MSFT", "GOOGL"]
        }
    };
    &pool[..pool.len().min(MAX_RECOMMENDED_SYMBOLS)]
}

pub async fn recommendations(
    provider: &dyn QuoteProvider,
    risk: RiskLevel,
    goal: InvestmentGoal,
) -> Vec<RecommendedAsset> {
    let symbols: Vec<String> = recommended_symbols(risk, goal)
        .iter()
        .map(|s| s.to_string())
        .collect();

    quotes(provider, &symbols)
        .await
        .into_iter()
        .map(|q| RecommendedAsset {
            kind: AssetKind::classify(&q.symbol),
            symbol: q.symbol,
            name: q.name,
            price: q.price,
            change: q.change,
            change_percent: q.change_percent,
        })
        .collect()
}
