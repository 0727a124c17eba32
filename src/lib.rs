pub mod api;
pub mod config;
pub mod models;
pub mod services;
pub mod validation;

pub use api::middleware::AppError;
pub use models::{
    AggregationContext, ConversationContext, ConversationTurn, QueryPlan, QueryPlanValidationResult, ReferenceType,
    ValidationIssue, ValidationResult,
};
pub use services::{ConversationStateTracker, LlmSemanticChecker, SemanticChecker, TrackerConfig};
pub use validation::{PlanValidatorConfig, QueryPlanValidator, SqlValidator, SqlValidatorConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_exports() {
        let validator = SqlValidator::new(SqlValidatorConfig::default());
        let result: ValidationResult = validator.validate("SELECT 1");
        assert!(result.is_valid);

        let tracker = ConversationStateTracker::new(TrackerConfig::default());
        let context: ConversationContext = tracker.build_context("결제 보여줘", &[]);
        assert!(!context.is_refinement);
    }
}
