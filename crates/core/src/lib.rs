pub mod alerts;
pub mod domain;
pub mod indicators;
pub mod market;
pub mod notify;
pub mod portfolio;
pub mod scoring;
pub mod time;

#[cfg(test)]
pub(crate) mod test_support;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;
    use std::time::Duration;

    const DEFAULT_PORTFOLIO_FILE: &str = "my-portfolio.json";
    const DEFAULT_MARKET_DATA_BASE_URL: &str = "https://query1.finance.yahoo.com";
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_REQ_DELAY_MS: u64 = 1000;
    const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
    const DEFAULT_SMTP_PORT: u16 = 465;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub email_user: Option<String>,
        pub email_app_password: Option<String>,
        pub notification_email: Option<String>,
        pub smtp_host: String,
        pub smtp_port: u16,
        pub alpha_vantage_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub portfolio_file: PathBuf,
        pub market_data_base_url: String,
        pub market_data_timeout: Duration,
        pub market_data_req_delay: Duration,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let smtp_port = match std::env::var("SMTP_PORT") {
                Ok(raw) => raw
                    .trim()
                    .parse::<u16>()
                    .with_context(|| format!("SMTP_PORT is not a valid port: {raw}"))?,
                Err(_) => DEFAULT_SMTP_PORT,
            };

            let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS);

            let req_delay_ms = std::env::var("MARKET_DATA_REQ_DELAY_MS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(DEFAULT_REQ_DELAY_MS);

            Ok(Self {
                email_user: non_empty_var("EMAIL_USER"),
                email_app_password: non_empty_var("EMAIL_APP_PASSWORD"),
                notification_email: non_empty_var("NOTIFICATION_EMAIL"),
                smtp_host: non_empty_var("SMTP_HOST")
                    .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
                smtp_port,
                alpha_vantage_api_key: non_empty_var("ALPHA_VANTAGE_API_KEY"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                portfolio_file: non_empty_var("PORTFOLIO_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_PORTFOLIO_FILE)),
                market_data_base_url: non_empty_var("MARKET_DATA_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_MARKET_DATA_BASE_URL.to_string()),
                market_data_timeout: Duration::from_secs(timeout_secs),
                market_data_req_delay: Duration::from_millis(req_delay_ms),
            })
        }

        pub fn require_email_user(&self) -> anyhow::Result<&str> {
            self.email_user
                .as_deref()
                .context("EMAIL_USER is required")
        }

        pub fn require_email_app_password(&self) -> anyhow::Result<&str> {
            self.email_app_password
                .as_deref()
                .context("EMAIL_APP_PASSWORD is required")
        }

        pub fn require_alpha_vantage_api_key(&self) -> anyhow::Result<&str> {
            self.alpha_vantage_api_key
                .as_deref()
                .context("ALPHA_VANTAGE_API_KEY is required")
        }

        pub fn mail_configured(&self) -> bool {
            self.email_user.is_some() && self.email_app_password.is_some()
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}
