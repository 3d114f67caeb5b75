pub mod analyzer;
pub mod optimizer;
pub mod rebalance;
pub mod store;
pub mod summary;

pub use analyzer::PortfolioAnalyzer;
pub use optimizer::PortfolioOptimizer;
pub use store::{PortfolioStore, SharedPortfolio};
