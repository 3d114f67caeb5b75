use anyhow::{Context, Result};
use chrono::Utc;

use crate::domain::market::{HistoricalSeries, HistoryPeriod};
use crate::domain::signal::{Signal, SignalAction, TechnicalIndicators};
use crate::market::MarketDataProvider;

pub const SHORT_MA_PERIOD: usize = 20;
pub const LONG_MA_PERIOD: usize = 50;
pub const RSI_PERIOD: usize = 14;
const VOLUME_WINDOW: usize = 20;

const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;

/// Mean of the last `period` closes.
pub fn moving_average(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Simple-average RSI over the last `period` deltas.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let start = closes.len() - period;
    let (mut gains, mut losses) = (0.0, 0.0);
    for i in start..closes.len() {
        let delta = closes[i] - closes[i - 1];
        if delta > 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Latest volume relative to the mean of the trailing window (at most 20 bars).
pub fn volume_ratio(volumes: &[f64]) -> Option<f64> {
    let latest = *volumes.last()?;
    let window = &volumes[volumes.len().saturating_sub(VOLUME_WINDOW)..];
    let avg = window.iter().sum::<f64>() / window.len() as f64;
    if avg == 0.0 {
        return None;
    }
    Some(latest / avg)
}

pub fn derive_signal(price: f64, ma20: Option<f64>, ma50: Option<f64>, rsi: Option<f64>) -> Signal {
    let mut action = SignalAction::Neutral;
    let mut strength: i32 = 0;

    if let (Some(ma20), Some(ma50)) = (ma20, ma50) {
        if price > ma20 && ma20 > ma50 {
            action = SignalAction::Buy;
            strength += 2;
        } else if price < ma20 && ma20 < ma50 {
            action = SignalAction::Sell;
            strength -= 2;
        }
    }

    if let Some(rsi) = rsi {
        if rsi < RSI_OVERSOLD {
            action = if action == SignalAction::Buy {
                SignalAction::StrongBuy
            } else {
                SignalAction::Buy
            };
            strength += 1;
        } else if rsi > RSI_OVERBOUGHT {
            action = if action == SignalAction::Sell {
                SignalAction::StrongSell
            } else {
                SignalAction::Sell
            };
            strength -= 1;
        }
    }

    Signal {
        action,
        strength: strength.unsigned_abs(),
        reasoning: signal_reasoning(price, ma20, ma50, rsi),
    }
}

pub fn signal_reasoning(price: f64, ma20: Option<f64>, ma50: Option<f64>, rsi: Option<f64>) -> String {
    let mut reasons: Vec<&str> = Vec::new();

    if let Some(ma20) = ma20 {
        if price > ma20 {
            reasons.push("Price above 20-day MA");
        } else if price < ma20 {
            reasons.push("Price below 20-day MA");
        }
    }
    if let (Some(ma20), Some(ma50)) = (ma20, ma50) {
        if ma20 > ma50 {
            reasons.push("Golden cross pattern");
        } else if ma20 < ma50 {
            reasons.push("Death cross pattern");
        }
    }
    if let Some(rsi) = rsi {
        if rsi < RSI_OVERSOLD {
            reasons.push("RSI indicates oversold");
        } else if rsi > RSI_OVERBOUGHT {
            reasons.push("RSI indicates overbought");
        }
    }

    if reasons.is_empty() {
        "Neutral market conditions".to_string()
    } else {
        reasons.join(", ")
    }
}

/// Indicators from an already-fetched daily series. The latest close is the price.
pub fn compute_indicators(series: &HistoricalSeries) -> Result<TechnicalIndicators> {
    let closes = series.closes();
    let volumes = series.volumes();
    let price = *closes
        .last()
        .with_context(|| format!("no closing prices for {}", series.symbol))?;

    let ma20 = moving_average(&closes, SHORT_MA_PERIOD);
    let ma50 = moving_average(&closes, LONG_MA_PERIOD);
    let rsi = rsi(&closes, RSI_PERIOD);

    Ok(TechnicalIndicators {
        symbol: series.symbol.clone(),
        price,
        ma20,
        ma50,
        rsi,
        volume_ratio: volume_ratio(&volumes),
        signal: derive_signal(price, ma20, ma50, rsi),
        timestamp: Utc::now(),
    })
}

pub async fn technical_indicators(
    provider: &dyn MarketDataProvider,
    symbol: &str,
) -> Result<TechnicalIndicators> {
    let symbol = symbol.trim().to_ascii_uppercase();
    let series = provider
        .history(&symbol, HistoryPeriod::ThreeMonths)
        .await
        .with_context(|| format!("Failed to calculate indicators for {symbol}"))?;

    compute_indicators(&series).with_context(|| format!("Failed to calculate indicators for {symbol}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::series;

    #[test]
    fn short_series_yields_none() {
        let closes: Vec<f64> = (1..=19).map(f64::from).collect();
        assert_eq!(moving_average(&closes, 20), None);
        assert_eq!(rsi(&closes[..14], 14), None);
        assert_eq!(moving_average(&[], 1), None);
    }

    #[test]
    fn moving_average_uses_trailing_window() {
        let closes: Vec<f64> = (1..=25).map(f64::from).collect();
        // last 20 are 6..=25, mean 15.5
        assert_eq!(moving_average(&closes, 20), Some(15.5));
    }

    #[test]
    fn rsi_is_100_without_losses() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&closes, 14), Some(100.0));

        let flat = vec![50.0; 20];
        assert_eq!(rsi(&flat, 14), Some(100.0));
    }

    #[test]
    fn rsi_stays_in_range() {
        let falling: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        assert_eq!(rsi(&falling, 14), Some(0.0));

        let zigzag: Vec<f64> = (0..40)
            .map(|i| if i % 2 == 0 { 100.0 } else { 103.0 + (i % 5) as f64 })
            .collect();
        let v = rsi(&zigzag, 14).unwrap();
        assert!((0.0..=100.0).contains(&v), "rsi out of range: {v}");
        assert!(v < 100.0);
    }

    #[test]
    fn rsi_balanced_moves_is_fifty() {
        let mut closes = vec![100.0];
        for i in 0..14 {
            let last = *closes.last().unwrap();
            closes.push(if i % 2 == 0 { last + 1.0 } else { last - 1.0 });
        }
        let v = rsi(&closes, 14).unwrap();
        assert!((v - 50.0).abs() < 1e-9);
    }

    #[test]
    fn volume_ratio_against_trailing_mean() {
        let mut volumes = vec![100.0; 19];
        volumes.push(300.0);
        // mean of 20 = (1900 + 300) / 20 = 110
        let r = volume_ratio(&volumes).unwrap();
        assert!((r - 300.0 / 110.0).abs() < 1e-9);
        assert_eq!(volume_ratio(&[]), None);
        assert_eq!(volume_ratio(&[0.0, 0.0]), None);
    }

    #[test]
    fn uptrend_with_oversold_rsi_is_strong_buy() {
        let s = derive_signal(110.0, Some(105.0), Some(100.0), Some(25.0));
        assert_eq!(s.action, SignalAction::StrongBuy);
        assert_eq!(s.strength, 3);
        assert_eq!(
            s.reasoning,
            "Price above 20-day MA, Golden cross pattern, RSI indicates oversold"
        );
    }

    #[test]
    fn downtrend_with_overbought_rsi_is_strong_sell() {
        let s = derive_signal(90.0, Some(95.0), Some(100.0), Some(75.0));
        assert_eq!(s.action, SignalAction::StrongSell);
        assert_eq!(s.strength, 3);
    }

    #[test]
    fn rsi_alone_sets_plain_action() {
        let s = derive_signal(100.0, None, None, Some(80.0));
        assert_eq!(s.action, SignalAction::Sell);
        assert_eq!(s.strength, 1);
        assert_eq!(s.reasoning, "RSI indicates overbought");

        let s = derive_signal(90.0, Some(95.0), Some(100.0), Some(20.0));
        // trend said SELL, oversold flips it to BUY and nets the accumulator
        assert_eq!(s.action, SignalAction::Buy);
        assert_eq!(s.strength, 1);
    }

    #[test]
    fn no_conditions_is_neutral() {
        let s = derive_signal(100.0, None, None, None);
        assert_eq!(s.action, SignalAction::Neutral);
        assert_eq!(s.strength, 0);
        assert_eq!(s.reasoning, "Neutral market conditions");
    }

    #[test]
    fn compute_from_series_uses_last_close_as_price() {
        let closes: Vec<f64> = (1..=60).map(f64::from).collect();
        let volumes = vec![1000.0; 60];
        let ind = compute_indicators(&series("NVDA", &closes, &volumes)).unwrap();
        assert_eq!(ind.price, 60.0);
        assert_eq!(ind.ma20, Some(50.5));
        assert_eq!(ind.ma50, Some(35.5));
        assert_eq!(ind.rsi, Some(100.0));
        assert_eq!(ind.volume_ratio, Some(1.0));
        assert_eq!(ind.signal.action, SignalAction::Sell);
    }

    #[test]
    fn empty_series_is_an_error() {
        assert!(compute_indicators(&series("NVDA", &[], &[])).is_err());
    }
}
