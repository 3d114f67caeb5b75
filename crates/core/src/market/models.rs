//! Wire shapes returned by the Yahoo Finance endpoints.
//!
//! Numbers inside `quoteSummary` arrive wrapped as `{"raw": 1.2, "fmt": "1.20"}`,
//! sometimes as `{}`; `de_raw` flattens all of those to `Option<f64>`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn de_raw<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;
    Ok(v.as_ref().and_then(raw_number))
}

fn raw_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::Object(map) => map.get("raw").and_then(Value::as_f64),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooErrorBody {
    pub code: Option<String>,
    pub description: Option<String>,
}

impl YahooErrorBody {
    pub fn describe(&self) -> String {
        match (&self.code, &self.description) {
            (Some(c), Some(d)) => format!("{c}: {d}"),
            (Some(c), None) => c.clone(),
            (None, Some(d)) => d.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

// ---- v7 quote ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteEnvelope {
    pub quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
pub struct QuoteResponse {
    #[serde(default)]
    pub result: Vec<QuoteItem>,
    pub error: Option<YahooErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteItem {
    pub symbol: String,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub regular_market_price: Option<f64>,
    pub regular_market_change: Option<f64>,
    pub regular_market_change_percent: Option<f64>,
    pub regular_market_volume: Option<f64>,
    pub market_cap: Option<f64>,
    pub regular_market_day_high: Option<f64>,
    pub regular_market_day_low: Option<f64>,
    pub regular_market_previous_close: Option<f64>,
    pub regular_market_time: Option<i64>,
}

// ---- v8 chart ----

#[derive(Debug, Deserialize)]
pub struct ChartEnvelope {
    pub chart: ChartResponse,
}

#[derive(Debug, Deserialize)]
pub struct ChartResponse {
    pub result: Option<Vec<ChartResult>>,
    pub error: Option<YahooErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct ChartResult {
    #[serde(default)]
    pub timestamp: Vec<i64>,
    pub indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
pub struct ChartIndicators {
    #[serde(default)]
    pub quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChartQuote {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<f64>>,
}

// ---- v10 quoteSummary ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryEnvelope {
    pub quote_summary: SummaryResponse,
}

#[derive(Debug, Deserialize)]
pub struct SummaryResponse {
    pub result: Option<Vec<SummaryResult>>,
    pub error: Option<YahooErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub financial_data: Option<FinancialDataModule>,
    pub default_key_statistics: Option<KeyStatisticsModule>,
    pub summary_detail: Option<SummaryDetailModule>,
    pub summary_profile: Option<SummaryProfileModule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialDataModule {
    #[serde(default, deserialize_with = "de_raw")]
    pub current_price: Option<f64>,
    #[serde(default, deserialize_with = "de_raw")]
    pub target_mean_price: Option<f64>,
    #[serde(default, deserialize_with = "de_raw")]
    pub recommendation_mean: Option<f64>,
    pub recommendation_key: Option<String>,
    #[serde(default, deserialize_with = "de_raw")]
    pub number_of_analyst_opinions: Option<f64>,
    #[serde(default, deserialize_with = "de_raw")]
    pub profit_margins: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatisticsModule {
    #[serde(default, rename = "trailingPE", deserialize_with = "de_raw")]
    pub trailing_pe: Option<f64>,
    #[serde(default, rename = "forwardPE", deserialize_with = "de_raw")]
    pub forward_pe: Option<f64>,
    #[serde(default, deserialize_with = "de_raw")]
    pub peg_ratio: Option<f64>,
    #[serde(default, deserialize_with = "de_raw")]
    pub price_to_book: Option<f64>,
    #[serde(default, deserialize_with = "de_raw")]
    pub profit_margins: Option<f64>,
    #[serde(default, deserialize_with = "de_raw")]
    pub beta: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDetailModule {
    #[serde(default, rename = "trailingPE", deserialize_with = "de_raw")]
    pub trailing_pe: Option<f64>,
    #[serde(default, rename = "forwardPE", deserialize_with = "de_raw")]
    pub forward_pe: Option<f64>,
    #[serde(default, deserialize_with = "de_raw")]
    pub beta: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryProfileModule {
    pub sector: Option<String>,
    pub industry: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_raw_fmt_wrappers_and_empty_objects() {
        let v = json!({
            "quoteSummary": {
                "result": [{
                    "financialData": {
                        "currentPrice": {"raw": 189.5, "fmt": "189.50"},
                        "targetMeanPrice": {},
                        "recommendationKey": "buy",
                        "numberOfAnalystOpinions": {"raw": 38, "fmt": "38", "longFmt": "38"}
                    },
                    "defaultKeyStatistics": {
                        "forwardPE": {"raw": 28.1, "fmt": "28.10"},
                        "pegRatio": 2.3
                    },
                    "summaryDetail": {"trailingPE": {"raw": 31.2, "fmt": "31.20"}}
                }],
                "error": null
            }
        });

        let parsed: SummaryEnvelope = serde_json::from_value(v).unwrap();
        let result = &parsed.quote_summary.result.unwrap()[0];
        let fin = result.financial_data.as_ref().unwrap();
        assert_eq!(fin.current_price, Some(189.5));
        assert_eq!(fin.target_mean_price, None);
        assert_eq!(fin.number_of_analyst_opinions, Some(38.0));
        assert_eq!(fin.recommendation_key.as_deref(), Some("buy"));

        let stats = result.default_key_statistics.as_ref().unwrap();
        assert_eq!(stats.forward_pe, Some(28.1));
        assert_eq!(stats.peg_ratio, Some(2.3));
        assert_eq!(stats.trailing_pe, None);
        assert_eq!(
            result.summary_detail.as_ref().unwrap().trailing_pe,
            Some(31.2)
        );
    }

    #[test]
    fn chart_tolerates_null_bars() {
        let v = json!({
            "chart": {
                "result": [{
                    "meta": {"symbol": "AAPL"},
                    "timestamp": [1700000000, 1700086400],
                    "indicators": {"quote": [{
                        "open": [1.0, null],
                        "high": [2.0, null],
                        "low": [0.5, null],
                        "close": [1.5, null],
                        "volume": [100, null]
                    }]}
                }],
                "error": null
            }
        });

        let parsed: ChartEnvelope = serde_json::from_value(v).unwrap();
        let result = &parsed.chart.result.unwrap()[0];
        assert_eq!(result.timestamp.len(), 2);
        assert_eq!(result.indicators.quote[0].close, vec![Some(1.5), None]);
        assert_eq!(result.indicators.quote[0].volume[0], Some(100.0));
    }

    #[test]
    fn chart_error_body_is_described() {
        let v = json!({
            "chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}
        });
        let parsed: ChartEnvelope = serde_json::from_value(v).unwrap();
        assert!(parsed.chart.result.is_none());
        assert_eq!(
            parsed.chart.error.unwrap().describe(),
            "Not Found: No data found, symbol may be delisted"
        );
    }
}
