//! HTML bodies and subjects for every mail the assistant sends.
//!
//! Markup is inline-styled so it survives webmail clients. Every value that
//! came from upstream goes through [`esc`].

use std::fmt::Write;

use crate::alerts::triggers::HoldingAlert;
use crate::domain::market::{MarketMover, MarketOverview, MarketTrend, Quote};
use crate::domain::portfolio::HoldingSummary;
use crate::domain::recommendation::Recommendation;
use crate::domain::report::{DailyReport, PortfolioAnalysis, PortfolioRecommendation, Priority};
use crate::domain::signal::TechnicalIndicators;

const UP: &str = "#27ae60";
const DOWN: &str = "#e74c3c";
const MUTED: &str = "#7f8c8d";

#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub subject: String,
    pub html: String,
}

pub fn esc(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn num(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2}")).unwrap_or_else(|| "N/A".to_string())
}

fn signed(v: f64) -> String {
    if v >= 0.0 {
        format!("+{v:.2}")
    } else {
        format!("{v:.2}")
    }
}

fn tone(v: f64) -> &'static str {
    if v >= 0.0 {
        UP
    } else {
        DOWN
    }
}

/// `1234567` → `1,234,567`.
fn grouped(v: f64) -> String {
    let digits = format!("{:.0}", v.abs());
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if v < 0.0 {
        out.insert(0, '-');
    }
    out
}

fn wrap(width: u32, title: &str, body: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: {width}px; margin: 0 auto;">
<h2 style="color: #2c3e50;">{title}</h2>
{body}
</div>"#
    )
}

fn footer(text: &str) -> String {
    format!(r#"<p style="color: {MUTED}; font-size: 12px; text-align: center; margin-top: 20px;">{text}</p>"#)
}

fn now_label() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn price_alert(quote: &Quote) -> Rendered {
    let change = quote.change.unwrap_or(0.0);
    let color = tone(change);
    let arrow = if change >= 0.0 { "▲" } else { "▼" };
    let name = quote.name.as_deref().unwrap_or("");

    let body = format!(
        r#"<div style="background: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0;">
<h3 style="margin-top: 0;">{symbol} - {name}</h3>
<p style="font-size: 24px; font-weight: bold; color: {color};">${price:.2}</p>
<p style="color: {color};">{arrow} {abs_change:.2} ({pct}%)</p>
</div>
<div style="margin: 20px 0;">
<p><strong>Volume:</strong> {volume}</p>
<p><strong>Market Cap:</strong> {cap}</p>
<p><strong>Day Range:</strong> {low} - {high}</p>
</div>
{footer}"#,
        symbol = esc(&quote.symbol),
        name = esc(name),
        price = quote.price,
        abs_change = change.abs(),
        pct = num(quote.change_percent),
        volume = quote.volume.map(grouped).unwrap_or_else(|| "N/A".to_string()),
        cap = quote
            .market_cap
            .map(|c| format!("${:.2}B", c / 1e9))
            .unwrap_or_else(|| "N/A".to_string()),
        low = num(quote.day_low),
        high = num(quote.day_high),
        footer = footer(&format!("Timestamp: {}", quote.timestamp.format("%Y-%m-%d %H:%M:%S UTC"))),
    );

    Rendered {
        subject: format!("📊 {} Stock Alert - ${:.2}", quote.symbol, quote.price),
        html: wrap(600, "Stock Price Alert", &body),
    }
}

pub fn technical_alert(ind: &TechnicalIndicators) -> Rendered {
    let action = ind.signal.action;
    let look = Recommendation::from(action);
    let row = |label: &str, value: String| {
        format!(
            r#"<tr><td style="padding: 8px; border-bottom: 1px solid #ddd;"><strong>{label}</strong></td><td style="padding: 8px; border-bottom: 1px solid #ddd;">{value}</td></tr>"#
        )
    };

    let body = format!(
        r#"<div style="background: {bg}; padding: 20px; border-radius: 8px; margin: 20px 0; color: white;">
<h3 style="margin-top: 0;">{symbol}</h3>
<p style="font-size: 28px; font-weight: bold;">{emoji} {action}</p>
<p>{reasoning}</p>
</div>
<div style="background: #f8f9fa; padding: 20px; border-radius: 8px;">
<h4>Technical Indicators:</h4>
<table style="width: 100%; border-collapse: collapse;">{rows}</table>
</div>
{footer}"#,
        bg = look.color(),
        symbol = esc(&ind.symbol),
        emoji = look.emoji(),
        reasoning = esc(&ind.signal.reasoning),
        rows = [
            row("Current Price:", format!("${:.2}", ind.price)),
            row("MA(20):", num(ind.ma20)),
            row("MA(50):", num(ind.ma50)),
            row("RSI(14):", num(ind.rsi)),
            row("Volume Ratio:", num(ind.volume_ratio)),
        ]
        .concat(),
        footer = footer(&format!("Generated at: {}", now_label())),
    );

    Rendered {
        subject: format!("🎯 {} Technical Signal: {}", ind.symbol, action),
        html: wrap(600, "Technical Analysis Alert", &body),
    }
}

fn trend_label(trend: MarketTrend) -> &'static str {
    match trend {
        MarketTrend::Bullish => "Bullish",
        MarketTrend::Bearish => "Bearish",
    }
}

fn movers_table(movers: &[MarketMover]) -> String {
    let mut rows = String::new();
    for m in movers {
        let _ = write!(
            rows,
            r#"<tr style="border-bottom: 1px solid #ddd;"><td style="padding: 10px;"><strong>{}</strong></td><td style="padding: 10px;">{}</td><td style="padding: 10px; text-align: right;">${:.2}</td><td style="padding: 10px; text-align: right; color: {};">{}%</td></tr>"#,
            esc(&m.symbol),
            esc(m.name.as_deref().unwrap_or("")),
            m.price,
            tone(m.change_percent),
            signed(m.change_percent),
        );
    }
    format!(r#"<table style="width: 100%; border-collapse: collapse;">{rows}</table>"#)
}

fn overview_section(overview: &MarketOverview) -> String {
    let trend = trend_label(overview.market_trend);
    let bg = match overview.market_trend {
        MarketTrend::Bullish => "#d4edda",
        MarketTrend::Bearish => "#f8d7da",
    };
    format!(
        r#"<div style="text-align: center; padding: 20px; background: {bg}; border-radius: 8px; margin: 20px 0;">
<h3 style="margin: 0;">Market Trend: {trend}</h3>
</div>
<div style="margin: 20px 0;"><h3 style="color: {UP};">📈 Top 5 Gainers</h3>{gainers}</div>
<div style="margin: 20px 0;"><h3 style="color: {DOWN};">📉 Top 5 Losers</h3>{losers}</div>"#,
        gainers = movers_table(&overview.top_gainers),
        losers = movers_table(&overview.top_losers),
    )
}

pub fn market_overview(overview: &MarketOverview) -> Rendered {
    let body = format!(
        "{}\n{}",
        overview_section(overview),
        footer(&format!("Report generated at: {}", now_label()))
    );
    Rendered {
        subject: format!(
            "📈 NASDAQ-100 Market Overview - {}",
            trend_label(overview.market_trend)
        ),
        html: wrap(600, "NASDAQ-100 Daily Summary", &body),
    }
}

pub fn portfolio_recommendation(rec: &PortfolioRecommendation) -> Rendered {
    let mut rows = String::new();
    for s in &rec.stocks {
        let badge = if s.ai_score >= 70.0 { UP } else { "#f39c12" };
        let _ = write!(
            rows,
            r#"<tr style="border-bottom: 1px solid #ddd;"><td style="padding: 10px;"><strong>{}</strong></td><td style="padding: 10px;">{}</td><td style="padding: 10px; text-align: right;">{}</td><td style="padding: 10px; text-align: right;">${:.2}</td><td style="padding: 10px; text-align: center;"><span style="background: {badge}; color: white; padding: 4px 8px; border-radius: 4px;">{:.1}</span></td></tr>"#,
            esc(&s.symbol),
            esc(&s.sector),
            s.shares,
            s.value,
            s.ai_score,
        );
    }
    if rec.stocks.is_empty() {
        rows.push_str(r#"<tr><td colspan="5" style="padding: 10px;">No stocks cleared the score threshold today.</td></tr>"#);
    }

    let body = format!(
        r#"<div style="background: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0;">
<h3>Portfolio Summary</h3>
<p><strong>Budget:</strong> ${budget}</p>
<p><strong>Total Value:</strong> ${total}</p>
<p><strong>Risk Score:</strong> {risk}/10</p>
</div>
<div style="margin: 20px 0;">
<h3>Recommended Stocks</h3>
<table style="width: 100%; border-collapse: collapse;">
<thead><tr style="background: #e9ecef;"><th style="padding: 10px; text-align: left;">Symbol</th><th style="padding: 10px; text-align: left;">Sector</th><th style="padding: 10px; text-align: right;">Shares</th><th style="padding: 10px; text-align: right;">Value</th><th style="padding: 10px; text-align: center;">Score</th></tr></thead>
<tbody>{rows}</tbody>
</table>
</div>
{footer}"#,
        budget = grouped(rec.budget),
        total = grouped(rec.total_value),
        risk = rec
            .risk_score
            .map(|r| format!("{r:.1}"))
            .unwrap_or_else(|| "N/A".to_string()),
        footer = footer("This is not financial advice. Please do your own research."),
    );

    Rendered {
        subject: "💼 Your Personalized Portfolio Recommendation".to_string(),
        html: wrap(600, "Portfolio Recommendation", &body),
    }
}

pub fn holding_alert(row: &HoldingSummary, alert: &HoldingAlert) -> Rendered {
    let color = tone(row.profit);
    let label = if row.profit >= 0.0 { "Profit" } else { "Loss" };
    let today = row
        .change_today
        .map(|c| format!("{}%", signed(c)))
        .unwrap_or_else(|| "N/A".to_string());

    let body = format!(
        r#"<div style="background: {color}; color: white; padding: 20px; border-radius: 8px; margin: 20px 0;">
<h3 style="margin-top: 0;">{symbol}</h3>
<p style="font-size: 18px; margin: 5px 0;">Current: ${price:.2}</p>
<p style="font-size: 16px; margin: 5px 0;">Today: {today}</p>
</div>
<div style="background: #f8f9fa; padding: 20px; border-radius: 8px;">
<h4>Your Position</h4>
<p><strong>Shares:</strong> {shares}</p>
<p><strong>Purchase Price:</strong> ${cost:.2}</p>
<p><strong>Invested:</strong> ${invested:.2}</p>
<p><strong>Current Value:</strong> ${value:.2}</p>
<p style="color: {color}; font-size: 20px; font-weight: bold;">{label}: {profit} ({pct}%)</p>
</div>
{footer}"#,
        symbol = esc(&row.symbol),
        price = row.current_price,
        shares = row.shares,
        cost = row.purchase_price,
        invested = row.invested,
        value = row.current_value,
        profit = signed(row.profit),
        pct = signed(row.profit_percent),
        footer = footer(&format!("Alert sent at {}", now_label())),
    );

    Rendered {
        subject: alert.subject(&row.symbol),
        html: wrap(600, "📈 Portfolio Alert", &body),
    }
}

fn card(title: &str, inner: &str) -> String {
    format!(
        r#"<div style="background: white; padding: 20px; border-radius: 10px; margin-bottom: 20px;">
<h2 style="margin-top: 0; color: #2c3e50;">{title}</h2>
{inner}
</div>"#
    )
}

fn priority_color(p: Priority) -> &'static str {
    match p {
        Priority::High => DOWN,
        Priority::Medium => "#f39c12",
        Priority::Low => "#3498db",
    }
}

fn portfolio_cards(p: &PortfolioAnalysis) -> String {
    if p.is_empty {
        return card(
            "💼 Portfolio",
            "<p>Your portfolio is empty. Add holdings to receive a personalised analysis.</p>",
        );
    }

    let t = &p.totals;
    let mut summary = format!(
        r#"<p><strong>Invested:</strong> ${}</p>
<p><strong>Current Value:</strong> ${}</p>
<p style="color: {}; font-size: 20px; font-weight: bold;">Total P/L: {} ({}%)</p>"#,
        grouped(t.total_invested),
        grouped(t.total_current_value),
        tone(t.total_profit),
        signed(t.total_profit),
        signed(t.total_profit_percent),
    );
    if let Some(perf) = &p.performance_summary {
        let _ = write!(
            summary,
            "<p>Winners {} · Losers {} · Win rate {:.1}%</p><p>Best: {} ({}%) · Worst: {} ({}%)</p>",
            perf.winners,
            perf.losers,
            perf.win_rate,
            esc(&perf.best_performer.symbol),
            signed(perf.best_performer.profit_percent),
            esc(&perf.worst_performer.symbol),
            signed(perf.worst_performer.profit_percent),
        );
    }

    let mut rows = String::new();
    for h in &p.holdings {
        let s = &h.summary;
        let _ = write!(
            rows,
            r#"<tr style="border-bottom: 1px solid #eee;"><td style="padding: 8px;"><strong>{}</strong></td><td style="padding: 8px;">{}</td><td style="padding: 8px; text-align: right;">${:.2}</td><td style="padding: 8px; text-align: right;">${:.2}</td><td style="padding: 8px; text-align: right; color: {};">{}%</td><td style="padding: 8px; text-align: center;">{}</td><td style="padding: 8px; color: {};">{} {}</td></tr>"#,
            esc(&s.symbol),
            esc(&h.sector),
            s.current_price,
            s.current_value,
            tone(s.profit_percent),
            signed(s.profit_percent),
            h.ai_score.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
            h.recommendation.color(),
            h.recommendation.emoji(),
            h.recommendation,
        );
    }
    let holdings = format!(
        r#"<table style="width: 100%; border-collapse: collapse;">
<thead><tr style="background: #f8f9fa;"><th style="padding: 8px; text-align: left;">Symbol</th><th style="padding: 8px; text-align: left;">Sector</th><th style="padding: 8px; text-align: right;">Price</th><th style="padding: 8px; text-align: right;">Value</th><th style="padding: 8px; text-align: right;">P/L</th><th style="padding: 8px;">Score</th><th style="padding: 8px; text-align: left;">Signal</th></tr></thead>
<tbody>{rows}</tbody></table>"#
    );

    let mut sectors = String::new();
    for slice in &p.sector_analysis {
        let _ = write!(
            sectors,
            "<li>{}: {:.1}% ({} holding(s))</li>",
            esc(&slice.sector),
            slice.percentage,
            slice.count
        );
    }

    [
        card("💼 Portfolio Summary", &summary),
        card("📋 Holdings", &holdings),
        card("🧭 Sector Allocation", &format!("<ul>{sectors}</ul>")),
    ]
    .concat()
}

pub fn daily_report(report: &DailyReport) -> Rendered {
    let mut sections = portfolio_cards(&report.portfolio);

    if !report.top_picks.is_empty() {
        let mut rows = String::new();
        for pick in &report.top_picks {
            let _ = write!(
                rows,
                r#"<tr><td style="padding: 8px;"><strong>{}</strong></td><td style="padding: 8px;">{}</td><td style="padding: 8px; text-align: right;">${:.2}</td><td style="padding: 8px; text-align: right; color: {};">{}%</td><td style="padding: 8px; text-align: center;">{}</td><td style="padding: 8px; color: {};">{}</td></tr>"#,
                esc(&pick.symbol),
                esc(pick.name.as_deref().unwrap_or("")),
                pick.price,
                tone(pick.change_percent),
                signed(pick.change_percent),
                pick.ai_score,
                pick.recommendation.color(),
                pick.recommendation,
            );
        }
        sections.push_str(&card(
            "⭐ Today's Top Picks",
            &format!(r#"<table style="width: 100%; border-collapse: collapse;">{rows}</table>"#),
        ));
    }

    if report.rebalancing.needed {
        let mut items = String::new();
        for risk in &report.rebalancing.risks {
            let _ = write!(
                items,
                r#"<li style="color: {};"><strong>Risk:</strong> {}</li>"#,
                priority_color(risk.severity),
                esc(&risk.message)
            );
        }
        for s in &report.rebalancing.suggestions {
            let _ = write!(
                items,
                r#"<li><span style="color: {};">[{}]</span> {}</li>"#,
                priority_color(s.priority),
                s.priority.as_str(),
                esc(&s.message)
            );
        }
        sections.push_str(&card("⚖️ Rebalancing", &format!("<ul>{items}</ul>")));
    }

    if let Some(overview) = &report.market_overview {
        sections.push_str(&card("🌐 Market Overview", &overview_section(overview)));
    }

    if !report.action_items.is_empty() {
        let mut items = String::new();
        for a in &report.action_items {
            let _ = write!(
                items,
                r#"<li style="margin-bottom: 8px;"><span style="color: {};">[{}]</span> <strong>{}</strong><br><small>{}</small></li>"#,
                priority_color(a.priority),
                a.priority.as_str(),
                esc(&a.action),
                esc(&a.reason)
            );
        }
        sections.push_str(&card("✅ Action Items", &format!("<ol>{items}</ol>")));
    }

    let date = report.date.format("%A, %B %-d, %Y");
    let html = format!(
        r#"<div style="font-family: 'Segoe UI', Arial, sans-serif; max-width: 800px; margin: 0 auto; background: #f5f5f5; padding: 20px;">
<div style="background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); color: white; padding: 30px; border-radius: 10px; text-align: center; margin-bottom: 20px;">
<h1 style="margin: 0; font-size: 28px;">📊 Portfolio Daily Report</h1>
<p style="margin: 10px 0 0 0; opacity: 0.9;">{date}</p>
</div>
{sections}
{footer}
</div>"#,
        footer = footer("This report is generated automatically and is not financial advice."),
    );

    Rendered {
        subject: format!("📈 Portfolio Daily Report - {}", report.date.format("%Y-%m-%d")),
        html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::triggers::HoldingAlertKind;
    use crate::domain::report::RebalancingPlan;
    use crate::portfolio::summary::value_holding;
    use crate::test_support::{holding, quote};
    use chrono::{NaiveDate, Utc};

    #[test]
    fn escapes_markup() {
        assert_eq!(esc(r#"<b>"A&B"</b>"#), "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;");
    }

    #[test]
    fn groups_thousands() {
        assert_eq!(grouped(0.0), "0");
        assert_eq!(grouped(999.0), "999");
        assert_eq!(grouped(1_234_567.4), "1,234,567");
        assert_eq!(grouped(-12_000.0), "-12,000");
    }

    #[test]
    fn price_alert_subject_and_missing_fields() {
        let mut q = quote("AAPL", 187.5, Some(1.2));
        q.name = Some("Apple <Inc>".to_string());
        let r = price_alert(&q);
        assert_eq!(r.subject, "📊 AAPL Stock Alert - $187.50");
        assert!(r.html.contains("Apple &lt;Inc&gt;"));
        assert!(r.html.contains("<strong>Market Cap:</strong> N/A"));
    }

    #[test]
    fn holding_alert_uses_trigger_subject() {
        let row = value_holding(&holding("MSFT", 2.0, 300.0), 270.0, Some(-3.0));
        let alert = HoldingAlert {
            kind: HoldingAlertKind::LossAlert,
            percent: row.profit_percent,
        };
        let r = holding_alert(&row, &alert);
        assert_eq!(r.subject, "⚠️ MSFT is down -10.00%");
        assert!(r.html.contains("Loss: -60.00 (-10.00%)"));
    }

    #[test]
    fn empty_daily_report_renders() {
        let report = DailyReport {
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            generated_at: Utc::now(),
            portfolio: PortfolioAnalysis::empty(),
            recommendations: vec![],
            rebalancing: RebalancingPlan::default(),
            top_picks: vec![],
            market_overview: None,
            action_items: vec![],
        };
        let r = daily_report(&report);
        assert_eq!(r.subject, "📈 Portfolio Daily Report - 2026-10-19");
        assert!(r.html.contains("Monday, October 19, 2026"));
        assert!(r.html.contains("Your portfolio is empty"));
        assert!(!r.html.contains("Action Items"));
    }
}
