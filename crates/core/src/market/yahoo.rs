use crate::config::Settings;
use crate::domain::market::{
    AnalystData, FinancialInfo, HistoricalSeries, HistoryPeriod, KeyStatistics, PricePoint, Quote,
    Valuation,
};
use crate::market::error::ProviderError;
use crate::market::models::{
    ChartEnvelope, QuoteEnvelope, QuoteItem, SummaryEnvelope, SummaryResult,
};
use crate::market::MarketDataProvider;
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::time::Duration;

const PROVIDER: &str = "yahoo";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const QUOTE_BATCH_SIZE: usize = 10;
const FINANCIAL_MODULES: &str = "financialData,defaultKeyStatistics,summaryDetail";
const PROFILE_MODULES: &str = "summaryProfile";
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Clone)]
struct CrumbData {
    cookie: String,
    crumb: String,
}

#[derive(Debug)]
pub struct YahooProvider {
    http: reqwest::Client,
    base_url: String,
    req_delay: Duration,

    // Quote and quoteSummary endpoints need a cookie + crumb pair; reuse it
    // until the upstream rejects it.
    crumb_cache: tokio::sync::Mutex<Option<CrumbData>>,
}

impl YahooProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.market_data_timeout)
            .build()
            .context("failed to build yahoo http client")?;

        Ok(Self {
            http,
            base_url: settings.market_data_base_url.clone(),
            req_delay: settings.market_data_req_delay,
            crumb_cache: tokio::sync::Mutex::new(None),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("invalid MARKET_DATA_BASE_URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("MARKET_DATA_BASE_URL cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn ensure_crumb(&self) -> Result<CrumbData> {
        let mut guard = self.crumb_cache.lock().await;
        if let Some(c) = guard.as_ref() {
            return Ok(c.clone());
        }

        let fresh = self.fetch_crumb().await?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    async fn fetch_crumb(&self) -> Result<CrumbData> {
        let res = self
            .http
            .get(COOKIE_URL)
            .header(header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| ProviderError::new(PROVIDER, "cookie", e.to_string()))?;

        let cookie = res
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split_once(';').map(|(v, _)| v.to_string()))
            .ok_or_else(|| ProviderError::new(PROVIDER, "cookie", "missing Set-Cookie header"))?;

        let url = self.url(&["v1", "test", "getcrumb"])?;
        let res = self
            .http
            .get(url)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::COOKIE, &cookie)
            .send()
            .await
            .map_err(|e| ProviderError::new(PROVIDER, "crumb", e.to_string()))?;

        let status = res.status();
        let crumb = res
            .text()
            .await
            .map_err(|e| ProviderError::new(PROVIDER, "crumb", e.to_string()))?;

        if !status.is_success() || crumb.trim().is_empty() {
            return Err(ProviderError::new(PROVIDER, "crumb", truncate(&crumb))
                .with_status(status.as_u16())
                .into());
        }

        tracing::debug!("refreshed yahoo crumb");
        Ok(CrumbData {
            cookie,
            crumb: crumb.trim().to_string(),
        })
    }

    async fn clear_crumb(&self) {
        *self.crumb_cache.lock().await = None;
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        stage: &'static str,
        symbol: &str,
        mut url: Url,
        query: &[(&str, &str)],
        authed: bool,
    ) -> Result<T> {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));

        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }

        if authed {
            let crumb = self.ensure_crumb().await?;
            url.query_pairs_mut().append_pair("crumb", &crumb.crumb);
            headers.insert(header::COOKIE, HeaderValue::from_str(&crumb.cookie)?);
        }

        let res = self
            .http
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ProviderError::new(PROVIDER, stage, e.to_string()).for_symbol(symbol))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| ProviderError::new(PROVIDER, stage, e.to_string()).for_symbol(symbol))?;

        if !status.is_success() {
            let err = ProviderError::new(PROVIDER, stage, truncate(&text))
                .for_symbol(symbol)
                .with_status(status.as_u16());
            if authed && err.is_unauthorized() {
                self.clear_crumb().await;
            }
            return Err(err.into());
        }

        serde_json::from_str::<T>(&text).map_err(|e| {
            ProviderError::new(
                PROVIDER,
                stage,
                format!("unexpected response shape: {e}: {}", truncate(&text)),
            )
            .for_symbol(symbol)
            .into()
        })
    }

    async fn fetch_quote_batch(&self, symbols: &[String]) -> Result<Vec<Quote>> {
        let joined = symbols.join(",");
        let url = self.url(&["v7", "finance", "quote"])?;
        let envelope: QuoteEnvelope = self
            .get_json("quote", &joined, url, &[("symbols", joined.as_str())], true)
            .await?;

        if let Some(err) = envelope.quote_response.error {
            return Err(ProviderError::new(PROVIDER, "quote", err.describe())
                .for_symbol(&joined)
                .into());
        }

        let mut out = Vec::with_capacity(envelope.quote_response.result.len());
        for item in envelope.quote_response.result {
            match quote_from_item(item) {
                Ok(q) => out.push(q),
                Err(err) => tracing::warn!(error = %err, "skipping unusable quote"),
            }
        }
        Ok(out)
    }

    async fn fetch_summary(
        &self,
        stage: &'static str,
        symbol: &str,
        modules: &str,
    ) -> Result<SummaryResult> {
        let url = self.url(&["v10", "finance", "quoteSummary", symbol])?;
        let envelope: SummaryEnvelope = self
            .get_json(stage, symbol, url, &[("modules", modules)], true)
            .await?;

        if let Some(err) = envelope.quote_summary.error {
            return Err(ProviderError::new(PROVIDER, stage, err.describe())
                .for_symbol(symbol)
                .into());
        }

        envelope
            .quote_summary
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| {
                ProviderError::new(PROVIDER, stage, "empty quoteSummary result")
                    .for_symbol(symbol)
                    .into()
            })
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for YahooProvider {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    async fn quote(&self, symbol: &str) -> Result<Quote> {
        let symbol = symbol.trim().to_ascii_uppercase();
        let quotes = self
            .fetch_quote_batch(std::slice::from_ref(&symbol))
            .await
            .with_context(|| format!("Failed to fetch price for {symbol}"))?;

        quotes
            .into_iter()
            .find(|q| q.symbol.eq_ignore_ascii_case(&symbol))
            .ok_or_else(|| {
                anyhow::Error::from(
                    ProviderError::new(PROVIDER, "quote", "no quote returned").for_symbol(&symbol),
                )
                .context(format!("Failed to fetch price for {symbol}"))
            })
    }

    async fn quotes(&self, symbols: &[String]) -> Result<Vec<Quote>> {
        let symbols: Vec<String> = symbols
            .iter()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let mut out = Vec::with_capacity(symbols.len());
        for (idx, batch) in symbols.chunks(QUOTE_BATCH_SIZE).enumerate() {
            if idx != 0 && !self.req_delay.is_zero() {
                tokio::time::sleep(self.req_delay).await;
            }
            let quotes = self
                .fetch_quote_batch(batch)
                .await
                .with_context(|| format!("Failed to fetch prices for {}", batch.join(", ")))?;
            out.extend(quotes);
        }
        Ok(out)
    }

    async fn history(&self, symbol: &str, period: HistoryPeriod) -> Result<HistoricalSeries> {
        let symbol = symbol.trim().to_ascii_uppercase();
        let url = self.url(&["v8", "finance", "chart", &symbol])?;
        let envelope: ChartEnvelope = self
            .get_json(
                "chart",
                &symbol,
                url,
                &[("range", period.as_str()), ("interval", period.interval())],
                false,
            )
            .await
            .with_context(|| format!("Failed to fetch historical data for {symbol}"))?;

        series_from_chart(&symbol, period, envelope)
            .with_context(|| format!("Failed to fetch historical data for {symbol}"))
    }

    async fn financials(&self, symbol: &str) -> Result<FinancialInfo> {
        let symbol = symbol.trim().to_ascii_uppercase();
        let result = self
            .fetch_summary("financials", &symbol, FINANCIAL_MODULES)
            .await
            .with_context(|| format!("Failed to fetch financial info for {symbol}"))?;
        Ok(financial_info_from_summary(&symbol, result))
    }

    async fn sector(&self, symbol: &str) -> Result<Option<String>> {
        let symbol = symbol.trim().to_ascii_uppercase();
        let result = self
            .fetch_summary("profile", &symbol, PROFILE_MODULES)
            .await
            .with_context(|| format!("Failed to fetch sector for {symbol}"))?;
        Ok(result
            .summary_profile
            .and_then(|p| p.sector)
            .filter(|s| !s.trim().is_empty()))
    }
}

fn quote_from_item(item: QuoteItem) -> Result<Quote> {
    let price = item.regular_market_price.ok_or_else(|| {
        ProviderError::new(PROVIDER, "quote", "missing regularMarketPrice").for_symbol(&item.symbol)
    })?;

    let timestamp = item
        .regular_market_time
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now);

    Ok(Quote {
        name: item.long_name.or(item.short_name),
        symbol: item.symbol,
        price,
        change: item.regular_market_change,
        change_percent: item.regular_market_change_percent,
        volume: item.regular_market_volume,
        market_cap: item.market_cap,
        day_high: item.regular_market_day_high,
        day_low: item.regular_market_day_low,
        previous_close: item.regular_market_previous_close,
        timestamp,
    })
}

fn series_from_chart(
    symbol: &str,
    period: HistoryPeriod,
    envelope: ChartEnvelope,
) -> Result<HistoricalSeries> {
    if let Some(err) = envelope.chart.error {
        return Err(ProviderError::new(PROVIDER, "chart", err.describe())
            .for_symbol(symbol)
            .into());
    }

    let result = envelope
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| ProviderError::new(PROVIDER, "chart", "empty chart result").for_symbol(symbol))?;

    let bars = result.indicators.quote.into_iter().next().unwrap_or_default();
    let at = |v: &Vec<Option<f64>>, i: usize| v.get(i).copied().flatten();

    let data = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, secs)| {
            let date: DateTime<Utc> = Utc.timestamp_opt(*secs, 0).single()?;
            Some(PricePoint {
                date,
                open: at(&bars.open, i),
                high: at(&bars.high, i),
                low: at(&bars.low, i),
                close: at(&bars.close, i),
                volume: at(&bars.volume, i),
            })
        })
        .collect();

    Ok(HistoricalSeries {
        symbol: symbol.to_string(),
        period,
        data,
    })
}

fn financial_info_from_summary(symbol: &str, result: SummaryResult) -> FinancialInfo {
    let fin = result.financial_data.unwrap_or_default();
    let stats = result.default_key_statistics.unwrap_or_default();
    let detail = result.summary_detail.unwrap_or_default();

    let key_statistics = KeyStatistics {
        pe_ratio: stats.trailing_pe.or(detail.trailing_pe),
        forward_pe: stats.forward_pe.or(detail.forward_pe),
        peg_ratio: stats.peg_ratio,
        price_to_book: stats.price_to_book,
        profit_margins: stats.profit_margins.or(fin.profit_margins),
        beta: stats.beta.or(detail.beta),
    };

    let valuation = Valuation::from_ratios(key_statistics.pe_ratio, key_statistics.peg_ratio);

    FinancialInfo {
        symbol: symbol.to_string(),
        financial_data: AnalystData {
            current_price: fin.current_price,
            target_mean_price: fin.target_mean_price,
            recommendation_mean: fin.recommendation_mean,
            recommendation_key: fin.recommendation_key,
            number_of_analyst_opinions: fin.number_of_analyst_opinions,
        },
        key_statistics,
        valuation,
    }
}

fn truncate(text: &str) -> String {
    if text.len() <= MAX_ERROR_BODY {
        return text.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings_with_base(base: &str) -> Settings {
        Settings {
            email_user: None,
            email_app_password: None,
            notification_email: None,
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 465,
            alpha_vantage_api_key: None,
            sentry_dsn: None,
            portfolio_file: "my-portfolio.json".into(),
            market_data_base_url: base.to_string(),
            market_data_timeout: Duration::from_secs(5),
            market_data_req_delay: Duration::ZERO,
        }
    }

    #[test]
    fn builds_paths_with_encoded_symbols() {
        let p = YahooProvider::from_settings(&settings_with_base("https://example.test/")).unwrap();
        let url = p.url(&["v8", "finance", "chart", "BRK B"]).unwrap();
        assert_eq!(url.as_str(), "https://example.test/v8/finance/chart/BRK%20B");
    }

    #[test]
    fn quote_prefers_long_name_and_keeps_missing_fields_absent() {
        let item: QuoteItem = serde_json::from_value(json!({
            "symbol": "AAPL",
            "longName": "Apple Inc.",
            "shortName": "Apple",
            "regularMarketPrice": 190.1,
            "regularMarketChangePercent": 1.25,
            "regularMarketTime": 1700000000
        }))
        .unwrap();

        let q = quote_from_item(item).unwrap();
        assert_eq!(q.name.as_deref(), Some("Apple Inc."));
        assert_eq!(q.price, 190.1);
        assert_eq!(q.change_percent, Some(1.25));
        assert_eq!(q.volume, None);
        assert_eq!(q.timestamp.timestamp(), 1700000000);
    }

    #[test]
    fn quote_without_price_is_rejected() {
        let item: QuoteItem = serde_json::from_value(json!({"symbol": "ZZZZ"})).unwrap();
        let err = quote_from_item(item).unwrap_err();
        assert!(err.to_string().contains("missing regularMarketPrice"));
    }

    #[test]
    fn chart_maps_bars_by_timestamp_index() {
        let envelope: ChartEnvelope = serde_json::from_value(json!({
            "chart": {
                "result": [{
                    "timestamp": [1700000000, 1700086400, 1700172800],
                    "indicators": {"quote": [{
                        "open": [1.0, 2.0, 3.0],
                        "high": [1.1, 2.1, 3.1],
                        "low": [0.9, 1.9, 2.9],
                        "close": [1.05, null, 3.05],
                        "volume": [10, 20]
                    }]}
                }],
                "error": null
            }
        }))
        .unwrap();

        let series = series_from_chart("MSFT", HistoryPeriod::FiveDays, envelope).unwrap();
        assert_eq!(series.data.len(), 3);
        assert_eq!(series.closes(), vec![1.05, 3.05]);
        assert_eq!(series.data[2].volume, None);
        assert_eq!(series.period, HistoryPeriod::FiveDays);
    }

    #[test]
    fn financial_info_falls_back_to_summary_detail() {
        let result = SummaryResult {
            summary_detail: serde_json::from_value(json!({
                "trailingPE": {"raw": 12.0},
                "beta": {"raw": 0.9}
            }))
            .unwrap(),
            ..Default::default()
        };

        let info = financial_info_from_summary("INTC", result);
        assert_eq!(info.key_statistics.pe_ratio, Some(12.0));
        assert_eq!(info.key_statistics.beta, Some(0.9));
        assert_eq!(info.valuation, Valuation::Undervalued);
        assert_eq!(info.financial_data, AnalystData::default());
    }

    #[test]
    fn truncates_long_bodies_on_char_boundary() {
        let body = "é".repeat(400);
        let t = truncate(&body);
        assert!(t.ends_with('…'));
        assert!(t.len() <= MAX_ERROR_BODY + '…'.len_utf8());
    }
}
