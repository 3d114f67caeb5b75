use std::fmt;

/// Failure talking to an upstream market-data service.
///
/// Wrapped into `anyhow::Error`; callers that care about the stage can
/// `downcast_ref::<ProviderError>()`.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: &'static str,
    pub stage: &'static str,
    pub symbol: Option<String>,
    pub status: Option<u16>,
    pub detail: String,
}

impl ProviderError {
    pub fn new(provider: &'static str, stage: &'static str, detail: impl Into<String>) -> Self {
        Self {
            provider,
            stage,
            symbol: None,
            status: None,
            detail: detail.into(),
        }
    }

    pub fn for_symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status, Some(401) | Some(403))
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error (stage={}", self.provider, self.stage)?;
        if let Some(symbol) = &self.symbol {
            write!(f, ", symbol={symbol}")?;
        }
        if let Some(status) = self.status {
            write!(f, ", status={status}")?;
        }
        write!(f, "): {}", self.detail)
    }
}

impl std::error::Error for ProviderError {}
