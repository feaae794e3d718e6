//! Binance historical klines as a [`BarSource`].

use crate::domain::market::bar::Bar;
use crate::domain::market::symbol::denormalize_crypto_symbol;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::BarSource;
use crate::infrastructure::core::http_client_factory::{
    HttpClientFactory, HttpClientSettings, build_url_with_query,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Binance caps one klines page at 1000 rows.
const KLINES_PAGE_LIMIT: usize = 1000;

pub struct BinanceBarSource {
    client: ClientWithMiddleware,
    api_key: String,
    base_url: String,
}

impl BinanceBarSource {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: HttpClientFactory::create_client(HttpClientSettings::default()),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_page(
        &self,
        api_symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<serde_json::Value>> {
        let start_ms_str = start_ms.to_string();
        // endTime is inclusive on Binance; the port contract is half-open
        let end_ms_str = (end_ms - 1).to_string();
        let limit_str = KLINES_PAGE_LIMIT.to_string();

        let url = build_url_with_query(
            &format!("{}/api/v3/klines", self.base_url),
            &[
                ("symbol", api_symbol),
                ("interval", interval),
                ("startTime", start_ms_str.as_str()),
                ("endTime", end_ms_str.as_str()),
                ("limit", limit_str.as_str()),
            ],
        )?;

        let response = self
            .client
            .get(url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("Failed to fetch klines from Binance")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance klines fetch failed ({}): {}", status, error_text);
        }

        response
            .json()
            .await
            .context("Failed to parse Binance klines response")
    }
}

/// Parses Binance klines (`[open_time, "open", "high", "low", "close", "volume", ...]`).
/// Malformed rows are skipped with a warning.
pub(crate) fn parse_klines(symbol: &str, klines: &[serde_json::Value]) -> Vec<Bar> {
    klines
        .iter()
        .filter_map(|k| {
            let bar = parse_kline(symbol, k);
            if bar.is_none() {
                warn!("BinanceBarSource: Skipping malformed kline for {}: {}", symbol, k);
            }
            bar
        })
        .collect()
}

fn parse_kline(symbol: &str, kline: &serde_json::Value) -> Option<Bar> {
    let arr = kline.as_array()?;
    if arr.len() < 6 {
        return None;
    }

    let decimal_at = |idx: usize| -> Option<Decimal> { arr[idx].as_str()?.parse().ok() };

    Some(Bar {
        symbol: symbol.to_string(),
        timestamp: arr[0].as_i64()?,
        open: decimal_at(1)?,
        high: decimal_at(2)?,
        low: decimal_at(3)?,
        close: decimal_at(4)?,
        volume: decimal_at(5)?,
    })
}

#[async_trait]
impl BarSource for BinanceBarSource {
    async fn fetch_bars(
        &self,
        instrument_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timeframe: Timeframe,
    ) -> Result<Vec<Bar>> {
        let api_symbol = denormalize_crypto_symbol(instrument_id);
        let interval = timeframe.to_binance_string();
        let end_ms = end.timestamp_millis();

        let mut bars: Vec<Bar> = Vec::new();
        let mut cursor = start.timestamp_millis();

        while cursor < end_ms {
            let page = self.fetch_page(&api_symbol, interval, cursor, end_ms).await?;
            let page_len = page.len();
            let parsed = parse_klines(instrument_id, &page);

            let Some(last_ts) = parsed.last().map(|b| b.timestamp) else {
                break;
            };
            bars.extend(parsed);

            if page_len < KLINES_PAGE_LIMIT {
                break;
            }
            cursor = last_ts + timeframe.to_millis();
            debug!(
                "BinanceBarSource: Paging {} klines from {}",
                instrument_id, cursor
            );
        }

        bars.retain(|b| b.timestamp < end_ms);

        info!(
            "BinanceBarSource: Fetched {} {} bars for {}",
            bars.len(),
            timeframe,
            instrument_id
        );
        Ok(bars)
    }
}
