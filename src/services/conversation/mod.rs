// Conversation state: which turns continue the previous query and with
// which accumulated filters.

pub mod aggregation;
pub mod conditions;
pub mod reference;
pub mod tracker;

pub use aggregation::{build_aggregation_context, detect_aggregations, group_by_columns};
pub use conditions::{extract_condition_field, extract_conditions, merge_conditions};
pub use reference::classify_reference;
pub use tracker::{ConversationStateTracker, TrackerConfig};
