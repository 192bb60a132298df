pub mod association;
pub mod audit;
pub mod client;
pub mod contract;
pub mod finance;
pub mod plan;
pub mod progress;
