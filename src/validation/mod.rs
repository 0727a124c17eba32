pub mod domain_rules;
pub(crate) mod lexical;
pub mod query_plan_validator;
pub mod sql_validator;

pub use query_plan_validator::*;
pub use sql_validator::*;
