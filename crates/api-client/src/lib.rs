use crate::error::ApiError;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use core_types::{Kline, OpenOrders, OrderRequest};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::time::Duration;

pub mod error;
pub mod responses;
// --- Public API ---
pub use responses::{ChartEnvelope, ChartErrorResponse, ChartResult};

/// The abstract interface of the broker bridge.
///
/// Order placement is fire-and-forget: a successful return only means the
/// request was handed to the bridge. Confirmation arrives later, either as a
/// changed open-order snapshot or as an `INFO` record on the message stream.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Requests a new market order.
    async fn open_order(&self, order: &OrderRequest) -> Result<(), ApiError>;

    /// Requests the close of `lots` on an existing ticket.
    async fn close_order(&self, ticket: u64, lots: Decimal) -> Result<(), ApiError>;

    /// Returns the current snapshot of open orders, keyed by ticket.
    async fn open_orders(&self) -> Result<OpenOrders, ApiError>;
}

/// The abstract interface of the historical price source.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Fetches OHLCV bars in `[start, end)`, ordered by ascending timestamp.
    ///
    /// An empty vector is a valid answer (e.g. a weekend range).
    async fn get_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: &str,
    ) -> Result<Vec<Kline>, ApiError>;
}

/// A `PriceFeed` backed by the Yahoo Finance chart API.
#[derive(Clone)]
pub struct YahooFinanceClient {
    client: reqwest::Client,
    base_url: String,
}

impl YahooFinanceClient {
    /// Every request, body included, fails once `timeout` has elapsed.
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        Self::with_base_url("https://query1.finance.yahoo.com", timeout)
    }

    /// Builds a client against an alternative host (mirrors, recorded fixtures).
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        // The chart endpoint rejects requests without a browser-like agent.
        headers.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0 (cassandra)"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PriceFeed for YahooFinanceClient {
    async fn get_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: &str,
    ) -> Result<Vec<Kline>, ApiError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        tracing::debug!(%symbol, %start, %end, %interval, "Requesting chart bars");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", start.timestamp().to_string()),
                ("period2", end.timestamp().to_string()),
                ("interval", interval.to_string()),
                ("includePrePost", "false".to_string()),
            ])
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        let envelope: ChartEnvelope = serde_json::from_str(&text).map_err(|e| {
            ApiError::Deserialization(format!("{} (status {}): {}", e, status, text))
        })?;
        klines_from_chart(envelope, interval)
    }
}

/// Flattens the chart API's column-oriented payload into bars.
///
/// Rows without a close price (trading halts, the still-forming bar) are skipped.
pub fn klines_from_chart(envelope: ChartEnvelope, interval: &str) -> Result<Vec<Kline>, ApiError> {
    if let Some(err) = envelope.chart.error {
        return Err(ApiError::ApiError(format!("{}: {}", err.code, err.description)));
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };
    let timestamps = result.timestamp.unwrap_or_default();
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Ok(Vec::new());
    };

    let column = |values: &[Option<f64>], idx: usize| -> Option<Decimal> {
        values
            .get(idx)
            .copied()
            .flatten()
            .and_then(Decimal::from_f64)
            .map(|d| d.round_dp(6))
    };

    let mut klines = Vec::with_capacity(timestamps.len());
    for (idx, ts) in timestamps.iter().enumerate() {
        let Some(close) = column(&quote.close, idx) else {
            continue;
        };
        let open_time = Utc
            .timestamp_opt(*ts, 0)
            .single()
            .ok_or_else(|| ApiError::InvalidData(format!("Invalid timestamp: {}", ts)))?;

        klines.push(Kline {
            open_time,
            open: column(&quote.open, idx).unwrap_or(close),
            high: column(&quote.high, idx).unwrap_or(close),
            low: column(&quote.low, idx).unwrap_or(close),
            close,
            volume: column(&quote.volume, idx).unwrap_or(Decimal::ZERO),
            interval: interval.to_string(),
        });
    }

    Ok(klines)
}
