use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::domain::contract::{normalize_symbol, HoldingRequest};
use crate::domain::portfolio::Holding;

/// Store shared between tool handlers and monitor tasks in one process.
pub type SharedPortfolio = Arc<tokio::sync::Mutex<PortfolioStore>>;

/// Holdings backed by a single JSON array file.
///
/// The in-memory list is written back in full after every mutation. Writes
/// go to a sibling temp file that is renamed over the target.
#[derive(Debug)]
pub struct PortfolioStore {
    path: PathBuf,
    holdings: Vec<Holding>,
}

impl PortfolioStore {
    /// Opens the store and loads whatever is on disk.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let mut store = Self {
            path: path.into(),
            holdings: Vec::new(),
        };
        store.load().await;
        store
    }

    pub fn into_shared(self) -> SharedPortfolio {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    /// Re-reads the file. A missing or unreadable file yields an empty portfolio.
    pub async fn load(&mut self) -> &[Holding] {
        self.holdings = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => match serde_json::from_str::<Vec<Holding>>(&raw) {
                Ok(holdings) => {
                    tracing::debug!(path = %self.path.display(), count = holdings.len(), "loaded portfolio");
                    holdings
                }
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), error = %err, "portfolio file is not valid; starting empty");
                    Vec::new()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no portfolio file; starting empty");
                Vec::new()
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to read portfolio; starting empty");
                Vec::new()
            }
        };
        &self.holdings
    }

    pub async fn save(&self) -> Result<()> {
        self.write(&self.holdings).await
    }

    async fn write(&self, holdings: &[Holding]) -> Result<()> {
        let body = serde_json::to_string_pretty(holdings)
            .context("failed to serialize portfolio")?;

        let tmp = tmp_path(&self.path);
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        tracing::debug!(path = %self.path.display(), count = holdings.len(), "portfolio saved");
        Ok(())
    }

    /// Persists `next` and only then adopts it, so a failed write leaves
    /// memory matching the file.
    async fn commit(&mut self, next: Vec<Holding>) -> Result<()> {
        self.write(&next).await?;
        self.holdings = next;
        Ok(())
    }

    /// Adds shares, merging into an existing position at weighted-average cost.
    pub async fn add_stock(&mut self, request: HoldingRequest) -> Result<Vec<Holding>> {
        let valid = request.validate()?;
        let now = Utc::now();

        let mut next = self.holdings.clone();
        match next.iter_mut().find(|h| h.symbol == valid.symbol) {
            Some(existing) => {
                let total_shares = existing.shares + valid.shares;
                let total_cost =
                    existing.shares * existing.purchase_price + valid.shares * valid.purchase_price;
                existing.shares = total_shares;
                existing.purchase_price = total_cost / total_shares;
                existing.last_updated = now;
            }
            None => next.push(Holding {
                symbol: valid.symbol.clone(),
                shares: valid.shares,
                purchase_price: valid.purchase_price,
                added_date: now,
                last_updated: now,
            }),
        }

        self.commit(next).await?;
        tracing::info!(symbol = %valid.symbol, shares = valid.shares, "holding added");
        Ok(self.holdings.clone())
    }

    /// Drops a symbol. Removing something that is not held is not an error.
    pub async fn remove_stock(&mut self, symbol: &str) -> Result<Vec<Holding>> {
        let symbol = normalize_symbol(symbol)?;
        let next: Vec<Holding> = self
            .holdings
            .iter()
            .filter(|h| h.symbol != symbol)
            .cloned()
            .collect();
        let removed = next.len() != self.holdings.len();

        self.commit(next).await?;
        if removed {
            tracing::info!(%symbol, "holding removed");
        }
        Ok(self.holdings.clone())
    }

    pub async fn clear(&mut self) -> Result<()> {
        self.commit(Vec::new()).await
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "portfolio.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(symbol: &str, shares: f64, price: f64) -> HoldingRequest {
        HoldingRequest {
            symbol: symbol.to_string(),
            shares,
            purchase_price: price,
        }
    }

    #[tokio::test]
    async fn merges_at_weighted_average_cost() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PortfolioStore::open(dir.path().join("p.json")).await;

        store.add_stock(req("aapl", 10.0, 100.0)).await.unwrap();
        let holdings = store.add_stock(req("AAPL", 10.0, 120.0)).await.unwrap();

        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].symbol, "AAPL");
        assert_eq!(holdings[0].shares, 20.0);
        assert_eq!(holdings[0].purchase_price, 110.0);
        assert!(holdings[0].last_updated >= holdings[0].added_date);
    }

    #[tokio::test]
    async fn removing_absent_symbol_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PortfolioStore::open(dir.path().join("p.json")).await;
        store.add_stock(req("MSFT", 5.0, 300.0)).await.unwrap();

        let holdings = store.remove_stock("TSLA").await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].symbol, "MSFT");

        let holdings = store.remove_stock("msft").await.unwrap();
        assert!(holdings.is_empty());
    }

    #[tokio::test]
    async fn persists_camel_case_file_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("my-portfolio.json");
        let mut store = PortfolioStore::open(&path).await;
        store.add_stock(req("NVDA", 2.0, 450.5)).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let entry = &raw[0];
        assert_eq!(entry["symbol"], "NVDA");
        assert_eq!(entry["purchasePrice"], 450.5);
        assert!(entry.get("addedDate").is_some());
        assert!(entry.get("lastUpdated").is_some());
        assert_eq!(entry.as_object().unwrap().len(), 5);
        assert!(!tmp_path(&path).exists());

        let reopened = PortfolioStore::open(&path).await;
        assert_eq!(reopened.holdings(), store.holdings());
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = PortfolioStore::open(&path).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn rejects_invalid_input_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        let mut store = PortfolioStore::open(&path).await;

        assert!(store.add_stock(req("AAPL", 0.0, 1.0)).await.is_err());
        assert!(store.add_stock(req("", 1.0, 1.0)).await.is_err());
        assert!(store.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("data");
        std::fs::create_dir(&sub).unwrap();
        let mut store = PortfolioStore::open(sub.join("p.json")).await;
        store.add_stock(req("AAPL", 1.0, 100.0)).await.unwrap();

        std::fs::remove_dir_all(&sub).unwrap();

        assert!(store.add_stock(req("AAPL", 1.0, 200.0)).await.is_err());
        assert!(store.add_stock(req("MSFT", 1.0, 300.0)).await.is_err());
        assert!(store.remove_stock("AAPL").await.is_err());
        assert!(store.clear().await.is_err());

        assert_eq!(store.holdings().len(), 1);
        assert_eq!(store.holdings()[0].shares, 1.0);
        assert_eq!(store.holdings()[0].purchase_price, 100.0);
    }

    #[tokio::test]
    async fn clear_writes_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        let mut store = PortfolioStore::open(&path).await;
        store.add_stock(req("AMD", 1.0, 100.0)).await.unwrap();
        store.clear().await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "[]");
    }
}
