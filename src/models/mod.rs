pub mod conversation;
pub mod query_plan;
pub mod validation;

pub use conversation::*;
pub use query_plan::*;
pub use validation::*;
