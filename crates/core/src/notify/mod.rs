pub mod smtp;
pub mod templates;

use std::sync::Arc;

use anyhow::Result;

use crate::alerts::triggers::HoldingAlert;
use crate::config::Settings;
use crate::domain::market::{MarketOverview, Quote};
use crate::domain::portfolio::HoldingSummary;
use crate::domain::report::{DailyReport, PortfolioRecommendation};
use crate::domain::signal::TechnicalIndicators;
use crate::notify::templates::Rendered;

pub use smtp::SmtpMailer;

#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<()>;
}

/// Renders reports and hands them to the mailer.
///
/// Every `send_*` returns whether the message went out. Failures, including
/// a missing mailer or recipient, are logged and never propagated.
#[derive(Clone)]
pub struct Notifier {
    mailer: Option<Arc<dyn Mailer>>,
    default_recipient: Option<String>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, default_recipient: Option<String>) -> Self {
        Self {
            mailer: Some(mailer),
            default_recipient,
        }
    }

    /// Notifier that logs and drops every message.
    pub fn disabled() -> Self {
        Self {
            mailer: None,
            default_recipient: None,
        }
    }

    /// SMTP notifier when credentials are present, otherwise a disabled one.
    pub fn from_settings(settings: &Settings) -> Self {
        if !settings.mail_configured() {
            tracing::warn!("EMAIL_USER / EMAIL_APP_PASSWORD not set; email delivery disabled");
            return Self::disabled();
        }
        match SmtpMailer::from_settings(settings) {
            Ok(mailer) => Self::new(Arc::new(mailer), settings.notification_email.clone()),
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "failed to set up SMTP; email delivery disabled");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mailer.is_some()
    }

    pub fn default_recipient(&self) -> Option<&str> {
        self.default_recipient.as_deref()
    }

    /// Explicit recipient, else the configured default.
    pub fn resolve_recipient(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or(self.default_recipient.as_deref())
            .map(str::to_string)
    }

    async fn deliver(&self, recipient: Option<&str>, kind: &'static str, rendered: Rendered) -> bool {
        let Some(mailer) = &self.mailer else {
            tracing::warn!(kind, subject = %rendered.subject, "email disabled; dropping message");
            return false;
        };
        let Some(to) = self.resolve_recipient(recipient) else {
            tracing::warn!(kind, subject = %rendered.subject, "no recipient configured; dropping message");
            return false;
        };

        let message = MailMessage {
            to: to.clone(),
            subject: rendered.subject,
            html: rendered.html,
        };
        match mailer.send(message).await {
            Ok(()) => {
                tracing::info!(kind, to = %to, "email sent");
                true
            }
            Err(err) => {
                tracing::error!(kind, to = %to, error = %format!("{err:#}"), "email sending failed");
                false
            }
        }
    }

    pub async fn send_price_alert(&self, recipient: Option<&str>, quote: &Quote) -> bool {
        self.deliver(recipient, "price_alert", templates::price_alert(quote))
            .await
    }

    pub async fn send_technical_alert(
        &self,
        recipient: Option<&str>,
        indicators: &TechnicalIndicators,
    ) -> bool {
        self.deliver(
            recipient,
            "technical_alert",
            templates::technical_alert(indicators),
        )
        .await
    }

    pub async fn send_market_overview(&self, recipient: Option<&str>, overview: &MarketOverview) -> bool {
        self.deliver(
            recipient,
            "market_overview",
            templates::market_overview(overview),
        )
        .await
    }

    pub async fn send_portfolio_recommendation(
        &self,
        recipient: Option<&str>,
        rec: &PortfolioRecommendation,
    ) -> bool {
        self.deliver(
            recipient,
            "portfolio_recommendation",
            templates::portfolio_recommendation(rec),
        )
        .await
    }

    pub async fn send_daily_report(&self, recipient: Option<&str>, report: &DailyReport) -> bool {
        self.deliver(recipient, "daily_report", templates::daily_report(report))
            .await
    }

    pub async fn send_holding_alert(
        &self,
        recipient: Option<&str>,
        row: &HoldingSummary,
        alert: &HoldingAlert,
    ) -> bool {
        self.deliver(
            recipient,
            "holding_alert",
            templates::holding_alert(row, alert),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{quote, RecordingMailer};

    #[tokio::test]
    async fn uses_default_recipient_and_reports_success() {
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Notifier::new(mailer.clone(), Some("me@example.com".to_string()));

        assert!(notifier.send_price_alert(None, &quote("AAPL", 190.0, Some(0.5))).await);
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "me@example.com");
        assert!(sent[0].subject.starts_with("📊 AAPL"));
    }

    #[tokio::test]
    async fn explicit_recipient_wins() {
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Notifier::new(mailer.clone(), Some("me@example.com".to_string()));
        assert_eq!(
            notifier.resolve_recipient(Some(" other@example.com ")),
            Some("other@example.com".to_string())
        );
        assert_eq!(
            notifier.resolve_recipient(Some("")),
            Some("me@example.com".to_string())
        );
    }

    #[tokio::test]
    async fn failures_are_false_not_errors() {
        let failing = Notifier::new(Arc::new(RecordingMailer::failing()), Some("a@b.c".to_string()));
        assert!(!failing.send_price_alert(None, &quote("MSFT", 1.0, None)).await);

        let no_recipient = Notifier::new(Arc::new(RecordingMailer::default()), None);
        assert!(!no_recipient.send_price_alert(None, &quote("MSFT", 1.0, None)).await);

        let disabled = Notifier::disabled();
        assert!(!disabled.is_enabled());
        assert!(!disabled.send_price_alert(Some("a@b.c"), &quote("MSFT", 1.0, None)).await);
    }
}
