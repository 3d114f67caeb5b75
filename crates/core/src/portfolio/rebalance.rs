//! Pure rules behind the daily report: sector mix, rebalancing hints,
//! per-holding recommendations and the short action list.

use crate::domain::portfolio::percent_of;
use crate::domain::report::{
    ActionItem, EnrichedHolding, HoldingRecommendation, PerformanceSummary, PerformerRef,
    PortfolioAnalysis, Priority, RebalancingPlan, Risk, RiskKind, SectorSlice, Suggestion,
    SuggestionKind,
};
use crate::domain::signal::{SignalAction, TechnicalIndicators};
use crate::scoring::holding::HoldingAssessment;

pub const UNKNOWN_SECTOR: &str = "Unknown";

const LOSS_REVIEW_PCT: f64 = -10.0;
const TAKE_PROFIT_PCT: f64 = 20.0;
const SECTOR_CONCENTRATION_PCT: f64 = 50.0;
const MIN_DIVERSIFIED_HOLDINGS: usize = 5;
const INCREASE_CASH_PCT: f64 = 15.0;
const AVERAGING_DOWN_PCT: f64 = -10.0;
const MAX_ACTION_ITEMS: usize = 5;

pub fn sector_distribution(holdings: &[EnrichedHolding]) -> Vec<SectorSlice> {
    let mut slices: Vec<SectorSlice> = Vec::new();
    for h in holdings {
        let value = h.summary.current_value;
        match slices.iter_mut().find(|s| s.sector == h.sector) {
            Some(slice) => {
                slice.value += value;
                slice.count += 1;
                slice.stocks.push(h.summary.symbol.clone());
            }
            None => slices.push(SectorSlice {
                sector: h.sector.clone(),
                value,
                percentage: 0.0,
                count: 1,
                stocks: vec![h.summary.symbol.clone()],
            }),
        }
    }

    let total: f64 = slices.iter().map(|s| s.value).sum();
    for slice in &mut slices {
        slice.percentage = percent_of(slice.value, total);
    }
    slices.sort_by(|a, b| b.value.total_cmp(&a.value));
    slices
}

pub fn performance_summary(holdings: &[EnrichedHolding]) -> Option<PerformanceSummary> {
    let first = holdings.first()?;
    let winners = holdings.iter().filter(|h| h.summary.profit_percent > 0.0).count();
    let losers = holdings.iter().filter(|h| h.summary.profit_percent < 0.0).count();

    let mut best = first;
    let mut worst = first;
    for h in holdings {
        if h.summary.profit_percent > best.summary.profit_percent {
            best = h;
        }
        if h.summary.profit_percent < worst.summary.profit_percent {
            worst = h;
        }
    }

    let performer = |h: &EnrichedHolding| PerformerRef {
        symbol: h.summary.symbol.clone(),
        profit_percent: h.summary.profit_percent,
    };

    Some(PerformanceSummary {
        winners,
        losers,
        win_rate: percent_of(winners as f64, holdings.len() as f64),
        best_performer: performer(best),
        worst_performer: performer(worst),
    })
}

pub fn rebalancing_plan(analysis: &PortfolioAnalysis) -> RebalancingPlan {
    if analysis.is_empty {
        return RebalancingPlan::default();
    }

    let mut suggestions = Vec::new();
    let mut risks = Vec::new();

    let losing = symbols_where(&analysis.holdings, |pct| pct < LOSS_REVIEW_PCT);
    if !losing.is_empty() {
        suggestions.push(Suggestion {
            kind: SuggestionKind::ReviewLosses,
            message: format!(
                "{} stock(s) down >10%. Consider reviewing: {}",
                losing.len(),
                losing.join(", ")
            ),
            priority: Priority::High,
        });
    }

    let winning = symbols_where(&analysis.holdings, |pct| pct > TAKE_PROFIT_PCT);
    if !winning.is_empty() {
        suggestions.push(Suggestion {
            kind: SuggestionKind::TakeProfit,
            message: format!(
                "{} stock(s) up >20%. Consider taking profits: {}",
                winning.len(),
                winning.join(", ")
            ),
            priority: Priority::Medium,
        });
    }

    if let Some(top) = analysis
        .sector_analysis
        .first()
        .filter(|s| s.percentage > SECTOR_CONCENTRATION_PCT)
    {
        risks.push(Risk {
            kind: RiskKind::SectorConcentration,
            message: format!(
                "{} sector represents {:.1}% of portfolio",
                top.sector, top.percentage
            ),
            severity: Priority::High,
        });
        suggestions.push(Suggestion {
            kind: SuggestionKind::Diversify,
            message: "Consider diversifying into other sectors".to_string(),
            priority: Priority::Medium,
        });
    }

    if analysis.holdings.len() < MIN_DIVERSIFIED_HOLDINGS {
        suggestions.push(Suggestion {
            kind: SuggestionKind::IncreaseDiversification,
            message: "Portfolio has fewer than 5 stocks. Consider adding more positions for diversification".to_string(),
            priority: Priority::Low,
        });
    }

    if let Some(cash) = cash_position(analysis.totals.total_profit_percent) {
        suggestions.push(cash);
    }

    RebalancingPlan {
        needed: !suggestions.is_empty(),
        suggestions,
        risks,
    }
}

fn symbols_where(holdings: &[EnrichedHolding], pred: impl Fn(f64) -> bool) -> Vec<String> {
    holdings
        .iter()
        .filter(|h| pred(h.summary.profit_percent))
        .map(|h| h.summary.symbol.clone())
        .collect()
}

fn cash_position(total_profit_percent: f64) -> Option<Suggestion> {
    if total_profit_percent > INCREASE_CASH_PCT {
        return Some(Suggestion {
            kind: SuggestionKind::IncreaseCash,
            message: "Consider taking some profits and increasing cash position (recommended: 15-20%)".to_string(),
            priority: Priority::Medium,
        });
    }
    if total_profit_percent < AVERAGING_DOWN_PCT {
        return Some(Suggestion {
            kind: SuggestionKind::AveragingDown,
            message: "Market pullback - consider averaging down on high-conviction stocks".to_string(),
            priority: Priority::Low,
        });
    }
    None
}

pub fn holding_recommendation(symbol: &str, assessment: &HoldingAssessment) -> HoldingRecommendation {
    let score = assessment.score.total_score;
    HoldingRecommendation {
        symbol: symbol.to_string(),
        action: assessment.score.recommendation,
        ai_score: score,
        reasoning: reasoning(&assessment.indicators),
        urgency: urgency(score, assessment.indicators.rsi),
    }
}

pub fn reasoning(ind: &TechnicalIndicators) -> String {
    let mut reasons: Vec<&str> = Vec::new();

    if matches!(ind.signal.action, SignalAction::Buy | SignalAction::Sell) {
        reasons.push(&ind.signal.reasoning);
    }
    match ind.rsi {
        Some(rsi) if rsi < 30.0 => reasons.push("RSI oversold condition"),
        Some(rsi) if rsi > 70.0 => reasons.push("RSI overbought condition"),
        _ => {}
    }
    if let (Some(ma20), Some(ma50)) = (ind.ma20, ind.ma50) {
        if ind.price > ma20 && ma20 > ma50 {
            reasons.push("Strong uptrend (Golden Cross)");
        }
    }

    if reasons.is_empty() {
        "Neutral technical indicators".to_string()
    } else {
        reasons.join("; ")
    }
}

pub fn urgency(score: u8, rsi: Option<f64>) -> Priority {
    if score >= 80 || score <= 20 {
        Priority::High
    } else if rsi.is_some_and(|r| (r - 50.0).abs() > 20.0) {
        Priority::Medium
    } else {
        Priority::Low
    }
}

pub fn action_items(
    recommendations: &[HoldingRecommendation],
    rebalancing: &RebalancingPlan,
) -> Vec<ActionItem> {
    let mut items: Vec<ActionItem> = recommendations
        .iter()
        .filter(|r| r.urgency == Priority::High)
        .map(|r| ActionItem {
            priority: Priority::High,
            action: format!("{}: {}", r.action, r.symbol),
            reason: r.reasoning.clone(),
        })
        .collect();

    items.extend(
        rebalancing
            .suggestions
            .iter()
            .filter(|s| s.priority == Priority::High)
            .map(|s| ActionItem {
                priority: Priority::High,
                action: s.message.clone(),
                reason: suggestion_label(s.kind).to_string(),
            }),
    );

    let buys: Vec<&str> = recommendations
        .iter()
        .filter(|r| r.action.is_buy() && r.urgency != Priority::High)
        .map(|r| r.symbol.as_str())
        .collect();
    if !buys.is_empty() {
        items.push(ActionItem {
            priority: Priority::Medium,
            action: format!("Consider buying: {}", buys.join(", ")),
            reason: "Strong AI scores".to_string(),
        });
    }

    items.truncate(MAX_ACTION_ITEMS);
    items
}

fn suggestion_label(kind: SuggestionKind) -> &'static str {
    match kind {
        SuggestionKind::ReviewLosses => "REVIEW_LOSSES",
        SuggestionKind::TakeProfit => "TAKE_PROFIT",
        SuggestionKind::Diversify => "DIVERSIFY",
        SuggestionKind::IncreaseDiversification => "INCREASE_DIVERSIFICATION",
        SuggestionKind::IncreaseCash => "INCREASE_CASH",
        SuggestionKind::AveragingDown => "AVERAGING_DOWN",
    }
}
