//! Yahoo Finance v8 chart endpoint as a price source.
//!
//! The latest price is the last non-null 1-minute close over the past five
//! minutes, falling back to `meta.regularMarketPrice` and then
//! `meta.previousClose`. The same endpoint seeds price history.

use super::circuit_breaker::CircuitBreaker;
use super::{Candle, FeedError, PriceFeed};
use chrono::DateTime;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteData>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn first_result(resp: ChartResponse) -> Result<ChartData, FeedError> {
    let results = resp.chart.result.ok_or_else(|| match resp.chart.error {
        Some(err) => FeedError::ResponseFormat(format!("{}: {}", err.code, err.description)),
        None => FeedError::ResponseFormat("empty result with no error".into()),
    })?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| FeedError::ResponseFormat("result array is empty".into()))
}

/// Latest trade price from a chart response body.
pub fn parse_latest_price(body: &str) -> Result<f64, FeedError> {
    let resp: ChartResponse =
        serde_json::from_str(body).map_err(|e| FeedError::ResponseFormat(e.to_string()))?;
    let data = first_result(resp)?;

    let last_close = data
        .indicators
        .quote
        .first()
        .and_then(|q| q.close.iter().rev().find_map(|c| *c))
        .filter(|p| p.is_finite() && *p > 0.0);
    let from_meta = data
        .meta
        .and_then(|m| m.regular_market_price.or(m.previous_close))
        .filter(|p| p.is_finite() && *p > 0.0);

    last_close.or(from_meta).ok_or(FeedError::NoData)
}

/// OHLCV candles from a chart response body. Rows with no close are skipped.
pub fn parse_candles(body: &str) -> Result<Vec<Candle>, FeedError> {
    let resp: ChartResponse =
        serde_json::from_str(body).map_err(|e| FeedError::ResponseFormat(e.to_string()))?;
    let data = first_result(resp)?;
    let timestamps = data
        .timestamp
        .ok_or_else(|| FeedError::ResponseFormat("no timestamps".into()))?;
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();

    let mut candles = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let Some(close) = quote.close.get(i).copied().flatten() else {
            continue;
        };
        let time = DateTime::from_timestamp(ts, 0)
            .ok_or_else(|| FeedError::ResponseFormat(format!("invalid timestamp: {ts}")))?;
        let open = quote.open.get(i).copied().flatten().unwrap_or(close);
        candles.push(Candle {
            time,
            open,
            high: quote.high.get(i).copied().flatten().unwrap_or(open.max(close)),
            low: quote.low.get(i).copied().flatten().unwrap_or(open.min(close)),
            close,
            volume: quote.volume.get(i).copied().flatten().unwrap_or(0.0),
        });
    }
    if candles.is_empty() {
        return Err(FeedError::NoData);
    }
    Ok(candles)
}

pub struct YahooQuoteFeed {
    client: reqwest::blocking::Client,
    breaker: Arc<CircuitBreaker>,
    symbol: String,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooQuoteFeed {
    pub fn new(symbol: impl Into<String>, breaker: Arc<CircuitBreaker>) -> Result<Self, FeedError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| FeedError::Network(e.to_string()))?;
        Ok(Self {
            client,
            breaker,
            symbol: symbol.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Point at another chart endpoint (mirrors, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    fn chart_url(&self, interval: &str, range: &str) -> String {
        format!("{}/{}?interval={interval}&range={range}", self.base_url, self.symbol)
    }

    /// GET with retries and breaker bookkeeping; returns the response body.
    fn fetch_body(&self, url: &str) -> Result<String, FeedError> {
        if !self.breaker.is_allowed() {
            return Err(FeedError::CircuitOpen);
        }

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                std::thread::sleep(self.base_delay * 2u32.pow(attempt - 1));
            }
            if !self.breaker.is_allowed() {
                return Err(FeedError::CircuitOpen);
            }

            let resp = match self.client.get(url).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    self.breaker.record_failure();
                    last_error = Some(FeedError::Network(e.to_string()));
                    continue;
                }
                Err(e) => return Err(FeedError::Network(e.to_string())),
            };

            let status = resp.status();
            if status == reqwest::StatusCode::FORBIDDEN {
                self.breaker.trip();
                return Err(FeedError::CircuitOpen);
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.breaker.record_failure();
                let retry_after_secs = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                last_error = Some(FeedError::RateLimited { retry_after_secs });
                continue;
            }
            if !status.is_success() {
                self.breaker.record_failure();
                last_error = Some(FeedError::Network(format!("HTTP {status} for {}", self.symbol)));
                continue;
            }

            let body = resp.text().map_err(|e| FeedError::Network(e.to_string()))?;
            self.breaker.record_success();
            return Ok(body);
        }
        Err(last_error.unwrap_or_else(|| FeedError::Network("max retries exceeded".into())))
    }

    pub fn latest_price(&self) -> Result<f64, FeedError> {
        let body = self.fetch_body(&self.chart_url("1m", "5m"))?;
        let price = parse_latest_price(&body)?;
        debug!(symbol = %self.symbol, price, "quote fetched");
        Ok(price)
    }

    /// Candles for e.g. `("5m", "1d")`.
    pub fn history(&self, interval: &str, range: &str) -> Result<Vec<Candle>, FeedError> {
        let body = self.fetch_body(&self.chart_url(interval, range))?;
        parse_candles(&body)
    }
}

impl PriceFeed for YahooQuoteFeed {
    fn name(&self) -> &str {
        "yahoo_quote"
    }

    fn fetch_price(&self) -> Result<f64, FeedError> {
        self.latest_price()
    }

    fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
      "chart": {
        "result": [{
          "meta": {"regularMarketPrice": 20511.25, "previousClose": 20400.0},
          "timestamp": [1700000000, 1700000060, 1700000120],
          "indicators": {"quote": [{
            "open":   [20500.0, 20502.0, null],
            "high":   [20505.0, 20508.0, null],
            "low":    [20498.0, 20501.0, null],
            "close":  [20502.0, 20507.5, null],
            "volume": [120, 98, null]
          }]}
        }],
        "error": null
      }
    }"#;

    #[test]
    fn latest_price_skips_trailing_nulls() {
        assert_eq!(parse_latest_price(BODY).unwrap(), 20_507.5);
    }

    #[test]
    fn latest_price_falls_back_to_meta() {
        let body = r#"{"chart":{"result":[{"meta":{"regularMarketPrice":null,"previousClose":20400.0},
            "timestamp":[1],"indicators":{"quote":[{"close":[null]}]}}],"error":null}}"#;
        assert_eq!(parse_latest_price(body).unwrap(), 20_400.0);
    }

    #[test]
    fn chart_error_is_reported() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#;
        let err = parse_latest_price(body).unwrap_err();
        assert!(matches!(err, FeedError::ResponseFormat(ref m) if m.contains("Not Found")));
    }

    #[test]
    fn candles_parse_and_skip_empty_rows() {
        let candles = parse_candles(BODY).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].close, 20_507.5);
        assert_eq!(candles[0].volume, 120.0);
        assert_eq!(candles[0].time.timestamp(), 1_700_000_000);
    }
}
