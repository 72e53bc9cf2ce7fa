use serde::Deserialize;

// The chart API is column-oriented: one timestamp array plus one array per
// OHLCV field, with `null` wherever the exchange published nothing.

/// The top-level body of `GET /v8/finance/chart/{ticker}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChartEnvelope {
    pub chart: ChartBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartBody {
    pub result: Option<Vec<ChartResult>>,
    pub error: Option<ChartErrorResponse>,
}

/// One instrument's worth of columns.
#[derive(Debug, Clone, Deserialize)]
pub struct ChartResult {
    /// Bar open times as unix seconds.
    #[serde(default)]
    pub timestamp: Option<Vec<i64>>,
    pub indicators: ChartIndicators,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartIndicators {
    #[serde(default)]
    pub quote: Vec<ChartQuote>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChartQuote {
    pub open: Vec<Option<f64>>,
    pub high: Vec<Option<f64>>,
    pub low: Vec<Option<f64>>,
    pub close: Vec<Option<f64>>,
    pub volume: Vec<Option<f64>>,
}

/// Represents an error response from the chart API.
#[derive(Debug, Clone, Deserialize)]
pub struct ChartErrorResponse {
    pub code: String,
    pub description: String,
}
