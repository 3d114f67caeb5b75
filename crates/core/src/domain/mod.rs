pub mod contract;
pub mod market;
pub mod portfolio;
pub mod recommendation;
pub mod report;
pub mod signal;
