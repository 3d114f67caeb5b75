use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};

use crate::domain::market::{
    AnalystData, FinancialInfo, HistoricalSeries, HistoryPeriod, KeyStatistics, PricePoint, Quote,
    Valuation,
};
use crate::domain::portfolio::Holding;
use crate::market::MarketDataProvider;
use crate::notify::{MailMessage, Mailer};

pub fn quote(symbol: &str, price: f64, change_percent: Option<f64>) -> Quote {
    Quote {
        symbol: symbol.to_string(),
        name: Some(format!("{symbol} Inc.")),
        price,
        change: change_percent.map(|p| price * p / 100.0),
        change_percent,
        volume: Some(1_000_000.0),
        market_cap: None,
        day_high: None,
        day_low: None,
        previous_close: None,
        timestamp: Utc::now(),
    }
}

pub fn series(symbol: &str, closes: &[f64], volumes: &[f64]) -> HistoricalSeries {
    let start = Utc.with_ymd_and_hms(2026, 1, 2, 21, 0, 0).unwrap();
    let data = closes
        .iter()
        .enumerate()
        .map(|(i, c)| PricePoint {
            date: start + Duration::days(i as i64),
            open: Some(*c),
            high: Some(*c),
            low: Some(*c),
            close: Some(*c),
            volume: volumes.get(i).copied(),
        })
        .collect();
    HistoricalSeries {
        symbol: symbol.to_string(),
        period: HistoryPeriod::ThreeMonths,
        data,
    }
}

pub fn financials(symbol: &str, pe: Option<f64>, forward_pe: Option<f64>) -> FinancialInfo {
    let key_statistics = KeyStatistics {
        pe_ratio: pe,
        forward_pe,
        ..Default::default()
    };
    FinancialInfo {
        symbol: symbol.to_string(),
        financial_data: AnalystData::default(),
        valuation: Valuation::from_ratios(pe, None),
        key_statistics,
    }
}

pub fn holding(symbol: &str, shares: f64, purchase_price: f64) -> Holding {
    let now = Utc::now();
    Holding {
        symbol: symbol.to_string(),
        shares,
        purchase_price,
        added_date: now,
        last_updated: now,
    }
}

/// In-memory provider. Unknown quotes and histories fail; unknown
/// financials come back empty.
#[derive(Default)]
pub struct FakeProvider {
    quotes: Mutex<HashMap<String, Quote>>,
    histories: Mutex<HashMap<String, HistoricalSeries>>,
    financials: Mutex<HashMap<String, FinancialInfo>>,
    sectors: Mutex<HashMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    quote_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn set_quote(&self, q: Quote) {
        self.quotes.lock().unwrap().insert(q.symbol.clone(), q);
    }

    pub fn set_history(&self, symbol: &str, closes: &[f64], volumes: &[f64]) {
        self.histories
            .lock()
            .unwrap()
            .insert(symbol.to_string(), series(symbol, closes, volumes));
    }

    pub fn set_financials(&self, info: FinancialInfo) {
        self.financials
            .lock()
            .unwrap()
            .insert(info.symbol.clone(), info);
    }

    pub fn set_sector(&self, symbol: &str, sector: &str) {
        self.sectors
            .lock()
            .unwrap()
            .insert(symbol.to_string(), sector.to_string());
    }

    pub fn fail(&self, symbol: &str) {
        self.failing.lock().unwrap().insert(symbol.to_string());
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    fn check(&self, symbol: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(symbol) {
            anyhow::bail!("upstream unavailable for {symbol}");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for FakeProvider {
    fn provider_name(&self) -> &'static str {
        "fake"
    }

    async fn quote(&self, symbol: &str) -> Result<Quote> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.check(symbol)?;
        self.quotes
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Failed to fetch price for {symbol}"))
    }

    async fn quotes(&self, symbols: &[String]) -> Result<Vec<Quote>> {
        self.quote_calls.fetch_add(symbols.len(), Ordering::SeqCst);
        let quotes = self.quotes.lock().unwrap();
        Ok(symbols.iter().filter_map(|s| quotes.get(s).cloned()).collect())
    }

    async fn history(&self, symbol: &str, _period: HistoryPeriod) -> Result<HistoricalSeries> {
        self.check(symbol)?;
        self.histories
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no history for {symbol}"))
    }

    async fn financials(&self, symbol: &str) -> Result<FinancialInfo> {
        self.check(symbol)?;
        Ok(self
            .financials
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| financials(symbol, None, None)))
    }

    async fn sector(&self, symbol: &str) -> Result<Option<String>> {
        self.check(symbol)?;
        Ok(self.sectors.lock().unwrap().get(symbol).cloned())
    }
}

/// Mailer that records messages, or fails every send when `failing`.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<MailMessage>>,
    pub failing: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.subject.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: MailMessage) -> Result<()> {
        if self.failing {
            anyhow::bail!("smtp relay rejected message");
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}
