//! Alert triggers and the background monitors that evaluate them.

pub mod monitor;
pub mod triggers;

pub use monitor::{
    DailyReportOptions, MonitorHandle, MonitorInfo, MonitorKind, MonitorRegistry,
    PortfolioMonitorOptions, ReportContent, StockWatchOptions,
};
pub use triggers::{AlertThresholds, HoldingAlert, HoldingAlertKind, StockAlert};
