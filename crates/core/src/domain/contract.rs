use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Unvalidated request to add shares of a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingRequest {
    pub symbol: String,
    pub shares: f64,
    pub purchase_price: f64,
}

/// A purchase that passed validation. Symbol is trimmed and upper-cased.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidHolding {
    pub symbol: String,
    pub shares: f64,
    pub purchase_price: f64,
}

impl HoldingRequest {
    pub fn validate(self) -> anyhow::Result<ValidHolding> {
        let symbol = normalize_symbol(&self.symbol)?;

        ensure!(
            self.shares.is_finite() && self.shares > 0.0,
            "shares must be a positive number (got {})",
            self.shares
        );
        ensure!(
            self.purchase_price.is_finite() && self.purchase_price >= 0.0,
            "purchasePrice must be a non-negative number (got {})",
            self.purchase_price
        );

        Ok(ValidHolding {
            symbol,
            shares: self.shares,
            purchase_price: self.purchase_price,
        })
    }
}

pub fn normalize_symbol(raw: &str) -> anyhow::Result<String> {
    let symbol = raw.trim().to_ascii_uppercase();
    ensure!(!symbol.is_empty(), "symbol must be non-empty");
    ensure!(
        symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '=')),
        "symbol contains unsupported characters: {raw}"
    );
    Ok(symbol)
}
