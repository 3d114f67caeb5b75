use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::Value;

use crate::config::Settings;
use crate::domain::market::{ExternalIndicators, RsiZone};
use crate::market::error::ProviderError;

const PROVIDER: &str = "alphavantage";
const BASE_URL: &str = "https://www.alphavantage.co/query";
const RSI_KEY: &str = "Technical Analysis: RSI";
const MACD_KEY: &str = "Technical Analysis: MACD";

/// Dated rows keyed by `YYYY-MM-DD`, so the last entry is the most recent.
type IndicatorSeries = BTreeMap<String, BTreeMap<String, String>>;

/// Daily RSI and MACD from Alpha Vantage, used as a cross-check on the
/// locally computed indicators.
#[derive(Debug, Clone)]
pub struct AlphaVantageClient {
    http: reqwest::Client,
    api_key: String,
}

impl AlphaVantageClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_alpha_vantage_api_key()?.to_string();
        let http = reqwest::Client::builder()
            .timeout(settings.market_data_timeout)
            .build()
            .context("failed to build alphavantage http client")?;
        Ok(Self { http, api_key })
    }

    pub async fn indicators(&self, symbol: &str) -> Result<ExternalIndicators> {
        let symbol = symbol.trim().to_ascii_uppercase();

        let rsi_body = self
            .query(&symbol, "rsi", &[("function", "RSI"), ("time_period", "14")])
            .await?;
        let macd_body = self.query(&symbol, "macd", &[("function", "MACD")]).await?;

        let rsi = latest(&rsi_body, RSI_KEY).map_err(|e| e.for_symbol(&symbol))?;
        let macd = latest(&macd_body, MACD_KEY).map_err(|e| e.for_symbol(&symbol))?;

        Ok(combine(&symbol, rsi, macd))
    }

    async fn query(&self, symbol: &str, stage: &'static str, params: &[(&str, &str)]) -> Result<Value> {
        let res = self
            .http
            .get(BASE_URL)
            .query(params)
            .query(&[
                ("symbol", symbol),
                ("interval", "daily"),
                ("series_type", "close"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::new(PROVIDER, stage, e.to_string()).for_symbol(symbol))?;

        let status = res.status();
        if !status.is_success() {
            return Err(ProviderError::new(PROVIDER, stage, "request rejected")
                .for_symbol(symbol)
                .with_status(status.as_u16())
                .into());
        }

        res.json::<Value>()
            .await
            .map_err(|e| ProviderError::new(PROVIDER, stage, e.to_string()).for_symbol(symbol).into())
    }
}

type Latest = Option<(NaiveDate, BTreeMap<String, String>)>;

/// Latest row of an indicator series. Throttle and error notices come back
/// with HTTP 200 and are turned into errors here.
fn latest(body: &Value, key: &str) -> std::result::Result<Latest, ProviderError> {
    for notice in ["Error Message", "Note", "Information"] {
        if let Some(msg) = body.get(notice).and_then(Value::as_str) {
            return Err(ProviderError::new(PROVIDER, "parse", msg));
        }
    }

    let Some(raw) = body.get(key) else {
        return Ok(None);
    };
    let series: IndicatorSeries = serde_json::from_value(raw.clone())
        .map_err(|e| ProviderError::new(PROVIDER, "parse", format!("bad {key}: {e}")))?;

    Ok(series.into_iter().next_back().and_then(|(date, row)| {
        NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .ok()
            .map(|d| (d, row))
    }))
}

fn field(row: &BTreeMap<String, String>, name: &str) -> Option<f64> {
    row.get(name).and_then(|v| v.trim().parse::<f64>().ok())
}

fn combine(symbol: &str, rsi: Latest, macd: Latest) -> ExternalIndicators {
    let rsi_value = rsi.as_ref().and_then(|(_, row)| field(row, "RSI"));
    let as_of = match (&rsi, &macd) {
        (Some((a, _)), Some((b, _))) => Some((*a).max(*b)),
        (Some((d, _)), None) | (None, Some((d, _))) => Some(*d),
        (None, None) => None,
    };

    ExternalIndicators {
        symbol: symbol.to_string(),
        rsi: rsi_value,
        macd: macd.as_ref().and_then(|(_, row)| field(row, "MACD")),
        macd_signal: macd.as_ref().and_then(|(_, row)| field(row, "MACD_Signal")),
        rsi_zone: rsi_value.map(RsiZone::classify),
        as_of,
    }
}
