use crate::config::Settings;
use crate::market::{Quote, QuoteProvider, SymbolMatch};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const SEARCH_QUOTES_COUNT: &str = "10";

#[derive(Debug, Clone)]
pub struct YahooQuoteClient {
    http: reqwest::Client,
    base_url: String,
}

impl YahooQuoteClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .market_data_base_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build market data http client")?;

        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("finscope/0.1"));
        headers
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let res = self
            .http
            .get(&url)
            .headers(self.headers())
            .query(query)
            .send()
            .await
            .with_context(|| format!("market data request failed: {url}"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read market data response")?;
        if !status.is_success() {
            anyhow::bail!("market data HTTP {status}: {text}");
        }
        serde_json::from_str::<T>(&text)
            .with_context(|| format!("market data response has unexpected shape: {text}"))
    }
}

#[async_trait::async_trait]
impl QuoteProvider for YahooQuoteClient {
    fn provider_name(&self) -> &'static str {
        "yahoo"
    }

    async fn quote(&self, symbol: &str) -> Result<Quote> {
        let symbol = chart_symbol(symbol)?;
        let url = self.url(&format!("/v8/finance/chart/{symbol}"));
        let chart: ChartResponse = self
            .get_json(url, &[("interval", "1d"), ("range", "1d")])
            .await?;
        chart.into_quote(&symbol)
    }

    async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>> {
        let url = self.url("/v1/finance/search");
        let resp: SearchResponse = self
            .get_json(
                url,
                &[
                    ("q", query),
                    ("quotesCount", SEARCH_QUOTES_COUNT),
                    ("newsCount", "0"),
                ],
            )
            .await?;
        Ok(resp.into_matches())
    }
}

/// Normalises a ticker for use as a URL path segment. Only `A-Z 0-9 . ^ = -` are allowed,
/// which covers indices (`^GSPC`), share classes (`BRK-B`), listings (`VOD.L`) and FX (`GBPUSD=X`).
fn chart_symbol(symbol: &str) -> Result<String> {
    let symbol = symbol.trim().to_ascii_uppercase();
    anyhow::ensure!(
        !symbol.is_empty()
            && symbol.len() <= 32
            && symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '^' | '=' | '-')),
        "invalid ticker symbol: {symbol:?}"
    );
    Ok(symbol)
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    symbol: String,
    long_name: Option<String>,
    short_name: Option<String>,
    regular_market_price: Option<f64>,
    previous_close: Option<f64>,
    chart_previous_close: Option<f64>,
    regular_market_change: Option<f64>,
    regular_market_change_percent: Option<f64>,
    regular_market_volume: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    market_cap: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<IndicatorQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct IndicatorQuote {
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
}

impl ChartResponse {
    fn into_quote(self, requested: &str) -> Result<Quote> {
        let result = self
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .with_context(|| format!("no chart result for {requested}"))?;
        let meta = result.meta;
        let bars = result
            .indicators
            .and_then(|i| i.quote.into_iter().next())
            .unwrap_or_default();

        let price = meta.regular_market_price.unwrap_or(0.0);
        let previous_close = meta.previous_close.or(meta.chart_previous_close);
        let change = meta
            .regular_market_change
            .or_else(|| previous_close.map(|p| price - p))
            .unwrap_or(0.0);
        let change_percent = meta
            .regular_market_change_percent
            .or_else(|| {
                previous_close
                    .filter(|p| *p != 0.0)
                    .map(|p| (price - p) / p * 100.0)
            })
            .unwrap_or(0.0);

        let first = |v: &[Option<f64>]| v.first().copied().flatten();

        Ok(Quote {
            name: meta
                .long_name
                .or(meta.short_name)
                .unwrap_or_else(|| meta.symbol.clone()),
            symbol: meta.symbol,
            price,
            previous_close,
            change,
            change_percent,
            volume: meta.regular_market_volume.unwrap_or(0.0),
            market_cap: meta.market_cap.unwrap_or(0.0),
            high: first(&bars.high)
                .or(meta.regular_market_day_high)
                .unwrap_or(0.0),
            low: first(&bars.low).or(meta.regular_market_day_low).unwrap_or(0.0),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    quotes: Vec<SearchQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuote {
    symbol: String,
    #[serde(rename = "longname")]
    long_name: Option<String>,
    #[serde(rename = "shortname")]
    short_name: Option<String>,
    quote_type: Option<String>,
    exchange: Option<String>,
}

impl SearchResponse {
    fn into_matches(self) -> Vec<SymbolMatch> {
        self.quotes
            .into_iter()
            .map(|q| SymbolMatch {
                name: q
                    .long_name
                    .or(q.short_name)
                    .unwrap_or_else(|| q.symbol.clone()),
                symbol: q.symbol,
                kind: q.quote_type,
                exchange: q.exchange,
            })
            .collect()
    }
}
