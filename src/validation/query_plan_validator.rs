//! Query plan quality validation.
//!
//! A request moves through rule checks, an optional model-assisted semantic
//! check, optional auto-correction and an optional clarification decision.
//! The outcome is always a valid plan, a corrected plan, a clarification
//! request, or an invalid verdict with its issues; never a silent pass.

use chrono::{Duration as ChronoDuration, Utc};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use crate::config::GuardConfig;
use crate::models::{
    IssueSeverity, LlmScores, OrderBy, QueryPlan, QueryPlanValidationResult, SortDirection, TimeRange,
    ValidationIssue, ValidationIssueType,
};
use crate::services::llm_service::SemanticChecker;
use crate::validation::domain_rules::{
    canonical_entity, entities_related, entity_for_utterance, fields_for, find_domain_term, has_local_reference,
    is_allowed_operator, is_time_series, status_for_utterance, CLARIFICATION_OPTIONS, CLARIFICATION_QUESTION,
    UNARY_OPERATORS,
};

pub const MIN_PLAN_LIMIT: i64 = 1;
pub const MAX_PLAN_LIMIT: i64 = 100;
pub const DEFAULT_PLAN_LIMIT: i64 = 10;
pub const DEFAULT_TIME_WINDOW_DAYS: i64 = 7;

const RULE_WEIGHT: f64 = 0.6;
const LLM_WEIGHT: f64 = 0.4;
const AMBIGUOUS_INTENT_BELOW: f64 = 0.5;
const CRITICAL_MARGIN: f64 = 0.01;

const ENTITY_BONUS: f64 = 0.05;
const FILTER_BONUS: f64 = 0.05;
const ORDER_BONUS: f64 = 0.03;
const TIME_RANGE_BONUS: f64 = 0.05;

static COUNTED_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*(?:건|개|줄|rows?|records?|items?|results?|transactions?|payments?)").unwrap()
});

static TOP_N_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:top|limit|first|last|최근|상위)\s*(\d+)").unwrap());

/// Stages a single validation request passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    RuleChecked,
    LlmChecked,
    AutoCorrected,
    ClarificationRequested,
    Done,
}

#[derive(Debug, Clone)]
pub struct PlanValidatorConfig {
    pub quality_threshold: f64,
    pub semantic_check_timeout: Duration,
    pub default_limit: i64,
}

impl Default for PlanValidatorConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 0.7,
            semantic_check_timeout: Duration::from_secs(5),
            default_limit: DEFAULT_PLAN_LIMIT,
        }
    }
}

impl From<&GuardConfig> for PlanValidatorConfig {
    fn from(guard: &GuardConfig) -> Self {
        Self {
            quality_threshold: guard.quality_threshold,
            semantic_check_timeout: Duration::from_millis(guard.semantic_check_timeout_ms),
            ..Self::default()
        }
    }
}

pub struct QueryPlanValidator {
    threshold: f64,
    semantic_check_timeout: Duration,
    default_limit: i64,
    semantic_checker: Option<Arc<dyn SemanticChecker>>,
}

impl QueryPlanValidator {
    pub fn new(config: PlanValidatorConfig) -> Self {
        Self {
            threshold: config.quality_threshold.clamp(0.0, 1.0),
            semantic_check_timeout: config.semantic_check_timeout,
            default_limit: config.default_limit.clamp(MIN_PLAN_LIMIT, MAX_PLAN_LIMIT),
            semantic_checker: None,
        }
    }

    pub fn with_semantic_checker(mut self, checker: Arc<dyn SemanticChecker>) -> Self {
        self.semantic_checker = Some(checker);
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Full validation, consulting the semantic checker when one is
    /// configured and the rule pass found nothing critical
    pub async fn validate(&self, plan: &QueryPlan, question: &str) -> QueryPlanValidationResult {
        let started = Instant::now();
        let mut issues = self.check_rules(plan, question);
        tracing::debug!(stage = ?Stage::RuleChecked, issues = issues.len(), "Plan rule pass finished");

        let mut llm_scores = None;
        if !has_critical(&issues) {
            if let Some(checker) = &self.semantic_checker {
                llm_scores = self.run_semantic_check(checker.as_ref(), plan, question).await;
            }
        }

        if let Some(scores) = &llm_scores {
            if scores.intent_alignment < AMBIGUOUS_INTENT_BELOW {
                issues.push(
                    ValidationIssue::new(
                        ValidationIssueType::AmbiguousIntent,
                        IssueSeverity::Info,
                        format!("Semantic check rates intent alignment at {:.2}", scores.intent_alignment),
                    )
                    .with_suggestion("Confirm the requested operation with the user"),
                );
            }
        }

        let rule_score = score_plan(plan, &issues);
        let score = match &llm_scores {
            Some(scores) => RULE_WEIGHT * rule_score + LLM_WEIGHT * scores.overall,
            None => rule_score,
        };

        self.conclude(plan, question, issues, score, llm_scores, started)
    }

    /// Rule-only validation; never calls out of process
    pub fn validate_rules_only(&self, plan: &QueryPlan, question: &str) -> QueryPlanValidationResult {
        let started = Instant::now();
        let issues = self.check_rules(plan, question);
        let score = score_plan(plan, &issues);
        self.conclude(plan, question, issues, score, None, started)
    }

    async fn run_semantic_check(
        &self,
        checker: &dyn SemanticChecker,
        plan: &QueryPlan,
        question: &str,
    ) -> Option<LlmScores> {
        match tokio::time::timeout(self.semantic_check_timeout, checker.assess(plan, question)).await {
            Ok(Ok(scores)) => {
                tracing::debug!(stage = ?Stage::LlmChecked, overall = scores.overall, "Semantic check finished");
                Some(scores.clamped())
            }
            Ok(Err(e)) => {
                tracing::warn!("Semantic check failed, using rule-based score only: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!(
                    "Semantic check timed out after {:?}, using rule-based score only",
                    self.semantic_check_timeout
                );
                None
            }
        }
    }

    /// Auto-correct, then decide on clarification, and assemble the verdict
    fn conclude(
        &self,
        plan: &QueryPlan,
        question: &str,
        issues: Vec<ValidationIssue>,
        score: f64,
        llm_scores: Option<LlmScores>,
        started: Instant,
    ) -> QueryPlanValidationResult {
        let score = self.bounded_score(&issues, score);

        if score >= self.threshold {
            tracing::debug!(stage = ?Stage::Done, score, "Plan accepted");
            return QueryPlanValidationResult {
                quality_score: score,
                is_valid: true,
                issues,
                corrected_plan: None,
                clarification_needed: plan.needs_clarification,
                clarification_question: plan.clarification_question.clone(),
                clarification_options: plan.clarification_options.clone(),
                validation_time_ms: elapsed_ms(started),
                llm_scores,
            };
        }

        if issues.iter().any(|i| i.issue_type.is_auto_fixable()) {
            let corrected = self.auto_correct(plan, &issues, question);
            let corrected_issues = self.check_rules(&corrected, question);
            let corrected_score = self.bounded_score(&corrected_issues, score_plan(&corrected, &corrected_issues));

            if corrected_score >= self.threshold && corrected_score > score {
                tracing::info!(
                    stage = ?Stage::AutoCorrected,
                    before = score,
                    after = corrected_score,
                    "Plan auto-corrected"
                );
                return QueryPlanValidationResult {
                    quality_score: corrected_score,
                    is_valid: true,
                    issues: corrected_issues,
                    clarification_needed: corrected.needs_clarification,
                    clarification_question: corrected.clarification_question.clone(),
                    clarification_options: corrected.clarification_options.clone(),
                    corrected_plan: Some(corrected),
                    validation_time_ms: elapsed_ms(started),
                    llm_scores,
                };
            }
            tracing::debug!(corrected_score, "Auto-correction did not clear the threshold; keeping original");
        }

        let mut result = QueryPlanValidationResult {
            quality_score: score,
            is_valid: false,
            issues,
            corrected_plan: None,
            clarification_needed: false,
            clarification_question: None,
            clarification_options: None,
            validation_time_ms: 0,
            llm_scores,
        };

        if self.should_request_clarification(plan, question, &result.issues) {
            tracing::info!(stage = ?Stage::ClarificationRequested, "Requesting clarification");
            result.clarification_needed = true;
            result.clarification_question = Some(CLARIFICATION_QUESTION.to_string());
            result.clarification_options = Some(CLARIFICATION_OPTIONS.iter().map(|o| o.to_string()).collect());
        } else {
            tracing::warn!(score, issues = result.issues.len(), "Plan rejected");
        }

        result.validation_time_ms = elapsed_ms(started);
        result
    }

    /// A critical issue always keeps the plan below the threshold
    fn bounded_score(&self, issues: &[ValidationIssue], score: f64) -> f64 {
        let score = score.clamp(0.0, 1.0);
        if has_critical(issues) {
            score.min((self.threshold - CRITICAL_MARGIN).max(0.0))
        } else {
            score
        }
    }

    /// Clarification is suppressed whenever the question is clearly answerable:
    /// a local intent, a reference to the shown result, or a domain term
    fn should_request_clarification(&self, plan: &QueryPlan, question: &str, issues: &[ValidationIssue]) -> bool {
        if plan.intent.is_local() || has_local_reference(question) || find_domain_term(question).is_some() {
            return false;
        }
        issues.iter().any(|i| i.issue_type.is_entity_related())
    }

    /// Rule-based pass; no external calls
    pub fn check_rules(&self, plan: &QueryPlan, question: &str) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let domain_term = find_domain_term(question);

        if plan.needs_clarification {
            if let Some((term, entity)) = domain_term {
                issues.push(
                    ValidationIssue::new(
                        ValidationIssueType::UnnecessaryClarification,
                        IssueSeverity::Critical,
                        format!("Question names '{}', clarification is not needed", term),
                    )
                    .with_suggestion(format!("Query {} directly", entity)),
                );
            } else if has_local_reference(question) {
                issues.push(
                    ValidationIssue::new(
                        ValidationIssueType::UnnecessaryClarification,
                        IssueSeverity::Critical,
                        "Question refers to the previous result, clarification is not needed",
                    )
                    .with_suggestion("Apply the request to the previous result set"),
                );
            }
        }

        // Local intents inherit their entity from the previous result set
        if !plan.intent.is_local() {
            match plan.entity.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
                Some(entity) => self.check_entity(plan, entity, question, domain_term, &mut issues),
                None => match domain_term {
                    Some((term, expected)) => issues.push(
                        ValidationIssue::new(
                            ValidationIssueType::EntityMismatch,
                            IssueSeverity::Critical,
                            format!("Plan has no entity but the question names '{}'", term),
                        )
                        .with_field("entity")
                        .with_suggestion(expected),
                    ),
                    None if !plan.needs_clarification => issues.push(
                        ValidationIssue::new(
                            ValidationIssueType::MissingClarification,
                            IssueSeverity::Warning,
                            "Plan has no entity and does not ask for clarification",
                        )
                        .with_field("entity"),
                    ),
                    None => {}
                },
            }
        }

        if let Some(limit) = plan.limit {
            if !(MIN_PLAN_LIMIT..=MAX_PLAN_LIMIT).contains(&limit) {
                issues.push(
                    ValidationIssue::new(
                        ValidationIssueType::LimitOutOfRange,
                        IssueSeverity::Warning,
                        format!("Limit {} is outside [{}, {}]", limit, MIN_PLAN_LIMIT, MAX_PLAN_LIMIT),
                    )
                    .with_field("limit")
                    .with_suggestion(limit.clamp(MIN_PLAN_LIMIT, MAX_PLAN_LIMIT).to_string()),
                );
            }
        }

        issues
    }

    fn check_entity(
        &self,
        plan: &QueryPlan,
        entity: &str,
        question: &str,
        domain_term: Option<(&str, &str)>,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let Some(canonical) = canonical_entity(entity) else {
            issues.push(
                ValidationIssue::new(
                    ValidationIssueType::InvalidEntity,
                    IssueSeverity::Critical,
                    format!("Unknown entity '{}'", entity),
                )
                .with_field("entity"),
            );
            return;
        };

        if let Some((term, expected)) = domain_term {
            if !entities_related(canonical, expected) {
                issues.push(
                    ValidationIssue::new(
                        ValidationIssueType::EntityMismatch,
                        IssueSeverity::Critical,
                        format!("Question names '{}' ({}) but the plan queries {}", term, expected, canonical),
                    )
                    .with_field("entity")
                    .with_suggestion(expected),
                );
            }
        }

        if is_time_series(canonical) && plan.time_range.is_none() && plan.limit.is_none() {
            issues.push(
                ValidationIssue::new(
                    ValidationIssueType::MissingTimeRange,
                    IssueSeverity::Warning,
                    format!("{} is a time-series entity queried without a time range or limit", canonical),
                )
                .with_field("time_range")
                .with_suggestion(format!("Restrict to the last {} days", DEFAULT_TIME_WINDOW_DAYS)),
            );
        }

        let fields = fields_for(canonical).unwrap_or(&[]);
        let has_field = |name: &str| fields.iter().any(|f| f.eq_ignore_ascii_case(name.trim()));

        for filter in &plan.filters {
            if !is_allowed_operator(&filter.operator) {
                issues.push(
                    ValidationIssue::new(
                        ValidationIssueType::InvalidOperator,
                        IssueSeverity::Critical,
                        format!("Operator '{}' is not allowed", filter.operator),
                    )
                    .with_field(filter.field.clone()),
                );
            } else if requires_value(&filter.operator) && is_empty_value(&filter.value) {
                issues.push(
                    ValidationIssue::new(
                        ValidationIssueType::InvalidFilter,
                        IssueSeverity::Warning,
                        format!("Filter on '{}' has no value", filter.field),
                    )
                    .with_field(filter.field.clone()),
                );
            }

            if !has_field(&filter.field) {
                issues.push(
                    ValidationIssue::new(
                        ValidationIssueType::FieldNotExist,
                        IssueSeverity::Critical,
                        format!("{} has no field '{}'", canonical, filter.field),
                    )
                    .with_field(filter.field.clone()),
                );
            }
        }

        if let Some(order_by) = &plan.order_by {
            if !has_field(&order_by.field) {
                issues.push(
                    ValidationIssue::new(
                        ValidationIssueType::FieldNotExist,
                        IssueSeverity::Warning,
                        format!("{} has no field '{}' to order by", canonical, order_by.field),
                    )
                    .with_field(order_by.field.clone())
                    .with_suggestion("created_at"),
                );
            }
        }

        if let Some(status) = status_for_utterance(question) {
            let filters_status = plan.filters.iter().any(|f| f.field.trim().eq_ignore_ascii_case("status"));
            if has_field("status") && !filters_status {
                issues.push(
                    ValidationIssue::new(
                        ValidationIssueType::MissingFilter,
                        IssueSeverity::Warning,
                        format!("Question asks for {} status but the plan has no status filter", status),
                    )
                    .with_field("status")
                    .with_suggestion(format!("status = '{}'", status)),
                );
            }
        }
    }

    /// Apply the fixes the validator knows how to make
    fn auto_correct(&self, plan: &QueryPlan, issues: &[ValidationIssue], question: &str) -> QueryPlan {
        let mut corrected = plan.clone();
        let inferred_entity = entity_for_utterance(question);

        for issue in issues {
            match issue.issue_type {
                ValidationIssueType::UnnecessaryClarification => {
                    corrected.needs_clarification = false;
                    corrected.clarification_question = None;
                    corrected.clarification_options = None;
                    if let Some(entity) = inferred_entity {
                        corrected.entity = Some(entity.to_string());
                    }
                    if corrected.operation.is_none() {
                        corrected.operation = Some("list".to_string());
                    }
                    if corrected.limit.is_none() {
                        corrected.limit = Some(parse_limit(question).unwrap_or(self.default_limit));
                    }
                    if corrected.order_by.is_none() {
                        corrected.order_by = Some(OrderBy {
                            field: "created_at".to_string(),
                            direction: SortDirection::Desc,
                        });
                    }
                }
                ValidationIssueType::EntityMismatch => {
                    if let Some(entity) = inferred_entity {
                        corrected.entity = Some(entity.to_string());
                    }
                }
                ValidationIssueType::MissingTimeRange => {
                    if corrected.time_range.is_none() {
                        corrected.time_range = Some(trailing_window(DEFAULT_TIME_WINDOW_DAYS));
                    }
                }
                ValidationIssueType::MissingFilter
                | ValidationIssueType::InvalidFilter
                | ValidationIssueType::AmbiguousIntent
                | ValidationIssueType::MissingClarification
                | ValidationIssueType::InvalidOperator
                | ValidationIssueType::FieldNotExist
                | ValidationIssueType::InvalidEntity
                | ValidationIssueType::LimitOutOfRange => {}
            }
        }

        corrected
    }
}

/// Rule score: 1.0 minus severity penalties plus completeness bonuses, in [0, 1]
pub fn score_plan(plan: &QueryPlan, issues: &[ValidationIssue]) -> f64 {
    let penalty: f64 = issues.iter().map(|i| i.severity.penalty()).sum();

    let mut bonus = 0.0;
    if plan.has_entity() {
        bonus += ENTITY_BONUS;
    }
    if !plan.filters.is_empty() {
        bonus += FILTER_BONUS;
    }
    if plan.order_by.is_some() {
        bonus += ORDER_BONUS;
    }
    if plan.time_range.is_some() {
        bonus += TIME_RANGE_BONUS;
    }

    (1.0 - penalty + bonus).clamp(0.0, 1.0)
}

fn has_critical(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(|i| i.severity == IssueSeverity::Critical)
}

fn requires_value(operator: &str) -> bool {
    !UNARY_OPERATORS.contains(&operator.trim().to_lowercase().as_str())
}

fn is_empty_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Row count named in the question ("30건", "top 5"), clamped to the plan range
pub fn parse_limit(question: &str) -> Option<i64> {
    COUNTED_NUMBER_RE
        .captures(question)
        .or_else(|| TOP_N_RE.captures(question))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .map(|n| n.clamp(MIN_PLAN_LIMIT, MAX_PLAN_LIMIT))
}

fn trailing_window(days: i64) -> TimeRange {
    let end = Utc::now();
    let start = end - ChronoDuration::days(days);
    TimeRange {
        start: start.format("%Y-%m-%d").to_string(),
        end: end.format("%Y-%m-%d").to_string(),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::middleware::AppError;
    use crate::models::{PlanFilter, QueryIntent};
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedScores(LlmScores);

    #[async_trait]
    impl SemanticChecker for FixedScores {
        async fn assess(&self, _plan: &QueryPlan, _question: &str) -> Result<LlmScores, AppError> {
            Ok(self.0.clone())
        }
    }

    struct SlowChecker;

    #[async_trait]
    impl SemanticChecker for SlowChecker {
        async fn assess(&self, _plan: &QueryPlan, _question: &str) -> Result<LlmScores, AppError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Err(AppError::LlmService("unreachable".to_string()))
        }
    }

    struct FailingChecker;

    #[async_trait]
    impl SemanticChecker for FailingChecker {
        async fn assess(&self, _plan: &QueryPlan, _question: &str) -> Result<LlmScores, AppError> {
            Err(AppError::LlmService("gateway down".to_string()))
        }
    }

    fn validator() -> QueryPlanValidator {
        QueryPlanValidator::new(PlanValidatorConfig::default())
    }

    fn scores(overall: f64, intent_alignment: f64) -> LlmScores {
        LlmScores {
            intent_alignment,
            entity_accuracy: 0.9,
            filter_completeness: 0.9,
            overall,
            reasoning: None,
        }
    }

    fn complete_plan() -> QueryPlan {
        QueryPlan {
            intent: QueryIntent::DataQuery,
            entity: Some("Payment".to_string()),
            operation: Some("list".to_string()),
            filters: vec![PlanFilter {
                field: "status".to_string(),
                operator: "eq".to_string(),
                value: json!("DONE"),
            }],
            time_range: Some(TimeRange {
                start: "2024-05-01".to_string(),
                end: "2024-05-07".to_string(),
            }),
            order_by: Some(OrderBy {
                field: "created_at".to_string(),
                direction: SortDirection::Desc,
            }),
            limit: Some(20),
            ..QueryPlan::default()
        }
    }

    fn issue_types(issues: &[ValidationIssue]) -> Vec<ValidationIssueType> {
        issues.iter().map(|i| i.issue_type).collect()
    }

    #[test]
    fn test_complete_plan_is_valid() {
        let result = validator().validate_rules_only(&complete_plan(), "이번 주 완료된 결제 20건");
        assert!(result.issues.is_empty(), "{:?}", result.issues);
        assert!(result.quality_score >= 0.9);
        assert!(result.is_valid);
        assert!(result.corrected_plan.is_none());
        assert!(!result.clarification_needed);
    }

    #[test]
    fn test_unnecessary_clarification_is_corrected() {
        let plan = QueryPlan {
            entity: Some("Order".to_string()),
            needs_clarification: true,
            clarification_question: Some("무엇을 조회할까요?".to_string()),
            ..QueryPlan::default()
        };

        let v = validator();
        let types = issue_types(&v.check_rules(&plan, "결제 30건"));
        assert!(types.contains(&ValidationIssueType::UnnecessaryClarification));
        assert!(types.contains(&ValidationIssueType::EntityMismatch));

        let result = v.validate_rules_only(&plan, "결제 30건");
        assert!(result.is_valid);
        let corrected = result.corrected_plan.expect("plan should be corrected");
        assert_eq!(corrected.entity.as_deref(), Some("Payment"));
        assert!(!corrected.needs_clarification);
        assert!(corrected.clarification_question.is_none());
        assert_eq!(corrected.limit, Some(30));
        assert_eq!(corrected.operation.as_deref(), Some("list"));
        assert_eq!(corrected.order_by.as_ref().map(|o| o.field.as_str()), Some("created_at"));
        assert!(!result.clarification_needed);
        assert!(result.quality_score >= v.threshold());
    }

    #[test]
    fn test_critical_severity_of_unnecessary_clarification() {
        let plan = QueryPlan {
            entity: Some("Order".to_string()),
            needs_clarification: true,
            ..QueryPlan::default()
        };
        let issues = validator().check_rules(&plan, "결제 30건");
        let issue = issues
            .iter()
            .find(|i| i.issue_type == ValidationIssueType::UnnecessaryClarification)
            .unwrap();
        assert_eq!(issue.severity, IssueSeverity::Critical);
    }

    #[test]
    fn test_entity_mismatch_is_corrected() {
        let mut plan = complete_plan();
        plan.entity = Some("Settlement".to_string());
        plan.filters.clear();

        let result = validator().validate_rules_only(&plan, "환불 내역 보여줘");
        assert!(result.is_valid, "{:?}", result.issues);
        assert_eq!(result.corrected_plan.unwrap().entity.as_deref(), Some("Refund"));
    }

    #[test]
    fn test_related_entities_do_not_mismatch() {
        let mut plan = complete_plan();
        plan.entity = Some("PaymentHistory".to_string());
        plan.filters.clear();

        let issues = validator().check_rules(&plan, "결제 보여줘");
        assert!(!issue_types(&issues).contains(&ValidationIssueType::EntityMismatch));
    }

    #[test]
    fn test_sorting_phrase_keeps_correct_plan() {
        let mut plan = complete_plan();
        plan.order_by = Some(OrderBy {
            field: "amount".to_string(),
            direction: SortDirection::Desc,
        });

        let result = validator().validate_rules_only(&plan, "show done payments in descending order of amount");
        assert!(result.issues.is_empty(), "{:?}", result.issues);
        assert!(result.is_valid);
        assert!(result.corrected_plan.is_none());
    }

    #[test]
    fn test_missing_time_range() {
        let plan = QueryPlan {
            entity: Some("Payment".to_string()),
            ..QueryPlan::default()
        };
        let issues = validator().check_rules(&plan, "payments please");
        assert_eq!(issue_types(&issues), vec![ValidationIssueType::MissingTimeRange]);
        assert_eq!(issues[0].severity, IssueSeverity::Warning);

        let merchants = QueryPlan {
            entity: Some("Merchant".to_string()),
            ..QueryPlan::default()
        };
        assert!(validator().check_rules(&merchants, "가맹점 목록").is_empty());
    }

    #[test]
    fn test_invalid_operator_and_field() {
        let mut plan = complete_plan();
        plan.filters = vec![
            PlanFilter {
                field: "status".to_string(),
                operator: "regex".to_string(),
                value: json!("D.*"),
            },
            PlanFilter {
                field: "card_number".to_string(),
                operator: "eq".to_string(),
                value: json!("1234"),
            },
        ];

        let result = validator().validate_rules_only(&plan, "결제 보여줘");
        let types = issue_types(&result.issues);
        assert!(types.contains(&ValidationIssueType::InvalidOperator));
        assert!(types.contains(&ValidationIssueType::FieldNotExist));
        assert!(!result.is_valid);
        assert!(result.corrected_plan.is_none());
        // Domain term present: no clarification
        assert!(!result.clarification_needed);
    }

    #[test]
    fn test_limit_out_of_range() {
        let mut plan = complete_plan();
        plan.limit = Some(500);
        let issues = validator().check_rules(&plan, "완료된 결제");
        let issue = issues
            .iter()
            .find(|i| i.issue_type == ValidationIssueType::LimitOutOfRange)
            .unwrap();
        assert_eq!(issue.severity, IssueSeverity::Warning);
        assert_eq!(issue.suggestion.as_deref(), Some("100"));

        plan.limit = Some(0);
        assert!(issue_types(&validator().check_rules(&plan, "완료된 결제"))
            .contains(&ValidationIssueType::LimitOutOfRange));
    }

    #[test]
    fn test_missing_status_filter_and_empty_value() {
        let mut plan = complete_plan();
        plan.filters = vec![PlanFilter {
            field: "merchant_id".to_string(),
            operator: "eq".to_string(),
            value: json!(""),
        }];

        let issues = validator().check_rules(&plan, "취소된 결제");
        let types = issue_types(&issues);
        assert!(types.contains(&ValidationIssueType::MissingFilter));
        assert!(types.contains(&ValidationIssueType::InvalidFilter));
        let missing = issues
            .iter()
            .find(|i| i.issue_type == ValidationIssueType::MissingFilter)
            .unwrap();
        assert_eq!(missing.suggestion.as_deref(), Some("status = 'CANCELED'"));
    }

    #[test]
    fn test_unary_operator_needs_no_value() {
        let mut plan = complete_plan();
        plan.filters.push(PlanFilter {
            field: "approved_at".to_string(),
            operator: "is_null".to_string(),
            value: serde_json::Value::Null,
        });
        let issues = validator().check_rules(&plan, "완료된 결제");
        assert!(issues.is_empty(), "{:?}", issues);
    }

    #[test]
    fn test_local_intent_skips_entity_checks() {
        let plan = QueryPlan {
            intent: QueryIntent::FilterLocal,
            filters: vec![PlanFilter {
                field: "method".to_string(),
                operator: "eq".to_string(),
                value: json!("CARD"),
            }],
            ..QueryPlan::default()
        };
        let result = validator().validate_rules_only(&plan, "이 중에서 카드 결제만");
        assert!(result.issues.is_empty(), "{:?}", result.issues);
        assert!(result.is_valid);
    }

    #[test]
    fn test_clarification_for_vague_question() {
        let plan = QueryPlan {
            entity: Some("Widget".to_string()),
            ..QueryPlan::default()
        };
        let result = validator().validate_rules_only(&plan, "지난주 꺼 보여줘");
        assert!(!result.is_valid);
        assert!(result.clarification_needed);
        assert_eq!(result.clarification_question.as_deref(), Some(CLARIFICATION_QUESTION));
        assert_eq!(result.clarification_options.as_ref().map(Vec::len), Some(CLARIFICATION_OPTIONS.len()));
    }

    #[test]
    fn test_legitimate_clarification_passes_through() {
        let plan = QueryPlan {
            needs_clarification: true,
            clarification_question: Some("어떤 기간인가요?".to_string()),
            ..QueryPlan::default()
        };
        let result = validator().validate_rules_only(&plan, "그거 보여줘");
        assert!(result.is_valid);
        assert!(result.clarification_needed);
        assert_eq!(result.clarification_question.as_deref(), Some("어떤 기간인가요?"));
    }

    #[test]
    fn test_correction_rejected_when_still_below_threshold() {
        let plan = QueryPlan {
            entity: Some("Order".to_string()),
            filters: vec![PlanFilter {
                field: "secret".to_string(),
                operator: "regex".to_string(),
                value: json!("x"),
            }],
            ..QueryPlan::default()
        };
        let result = validator().validate_rules_only(&plan, "결제 보여줘");
        assert!(!result.is_valid);
        assert!(result.corrected_plan.is_none());
        assert!(issue_types(&result.issues).contains(&ValidationIssueType::EntityMismatch));
    }

    #[test]
    fn test_score_penalties_and_bonuses() {
        let bare = QueryPlan::default();
        assert_eq!(score_plan(&bare, &[]), 1.0);

        let warning = ValidationIssue::new(ValidationIssueType::MissingTimeRange, IssueSeverity::Warning, "w");
        let critical = ValidationIssue::new(ValidationIssueType::EntityMismatch, IssueSeverity::Critical, "c");
        let score = score_plan(&bare, &[warning, critical.clone(), critical]);
        assert!((score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit("결제 30건"), Some(30));
        assert_eq!(parse_limit("top 5 merchants"), Some(5));
        assert_eq!(parse_limit("최근 500건"), Some(100));
        assert_eq!(parse_limit("결제 보여줘"), None);
    }

    #[test]
    fn test_trailing_window_days() {
        let window = trailing_window(7);
        let start = chrono::NaiveDate::parse_from_str(&window.start, "%Y-%m-%d").unwrap();
        let end = chrono::NaiveDate::parse_from_str(&window.end, "%Y-%m-%d").unwrap();
        assert_eq!((end - start).num_days(), 7);
    }

    #[tokio::test]
    async fn test_semantic_scores_are_blended() {
        let v = validator().with_semantic_checker(Arc::new(FixedScores(scores(0.5, 0.9))));
        let result = v.validate(&complete_plan(), "이번 주 완료된 결제 20건").await;

        assert!((result.quality_score - (0.6 * 1.0 + 0.4 * 0.5)).abs() < 1e-9);
        assert!(result.is_valid);
        assert_eq!(result.llm_scores.unwrap().overall, 0.5);
    }

    #[tokio::test]
    async fn test_low_intent_alignment_adds_info_issue() {
        let v = validator().with_semantic_checker(Arc::new(FixedScores(scores(0.9, 0.2))));
        let result = v.validate(&complete_plan(), "이번 주 완료된 결제 20건").await;
        let issue = result
            .issues
            .iter()
            .find(|i| i.issue_type == ValidationIssueType::AmbiguousIntent)
            .unwrap();
        assert_eq!(issue.severity, IssueSeverity::Info);
    }

    #[tokio::test]
    async fn test_semantic_check_skipped_on_critical_issue() {
        let v = validator().with_semantic_checker(Arc::new(FixedScores(scores(1.0, 1.0))));
        let plan = QueryPlan {
            entity: Some("Widget".to_string()),
            ..QueryPlan::default()
        };
        let result = v.validate(&plan, "지난주 꺼").await;
        assert!(result.llm_scores.is_none());
    }

    #[tokio::test]
    async fn test_semantic_timeout_falls_back_to_rules() {
        let v = QueryPlanValidator::new(PlanValidatorConfig {
            semantic_check_timeout: Duration::from_millis(50),
            ..PlanValidatorConfig::default()
        })
        .with_semantic_checker(Arc::new(SlowChecker));

        let result = v.validate(&complete_plan(), "이번 주 완료된 결제 20건").await;
        assert!(result.llm_scores.is_none());
        assert!(result.is_valid);
        assert_eq!(result.quality_score, 1.0);
    }

    #[test]
    fn test_semantic_failure_falls_back_to_rules() {
        let v = validator().with_semantic_checker(Arc::new(FailingChecker));
        let result = tokio_test::block_on(v.validate(&complete_plan(), "이번 주 완료된 결제 20건"));
        assert!(result.llm_scores.is_none());
        assert_eq!(result.quality_score, 1.0);
    }
}
