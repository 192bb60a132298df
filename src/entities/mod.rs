pub mod cascade_audit;
pub mod client;
pub mod client_plan;
pub mod contract;
pub mod financial_record;
pub mod plan;
pub mod progress_entry;
