pub mod conversation; // Reference classification, condition merging, aggregation context
pub mod llm_service;

pub use conversation::*;
pub use llm_service::*;
