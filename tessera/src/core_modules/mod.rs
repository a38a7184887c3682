pub mod config;
pub mod error;
pub mod grid;
pub mod imbalance;
pub mod partition;
pub mod rebalancer;
pub mod region;
pub mod sampling;
pub mod utils;
pub mod validation;
