use serde::{Deserialize, Serialize};

/// What the plan asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    /// Fetch from the database
    #[default]
    DataQuery,
    /// Narrow the previous result set in place
    FilterLocal,
    /// Aggregate the previous result set in place
    AggregateLocal,
}

impl QueryIntent {
    /// Local intents inherit their entity from the previous result set
    pub fn is_local(self) -> bool {
        matches!(self, QueryIntent::FilterLocal | QueryIntent::AggregateLocal)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFilter {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Structured query plan produced by the model
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryPlan {
    pub intent: QueryIntent,
    pub entity: Option<String>,
    pub operation: Option<String>,
    pub filters: Vec<PlanFilter>,
    pub time_range: Option<TimeRange>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<i64>,
    pub needs_clarification: bool,
    pub clarification_question: Option<String>,
    pub clarification_options: Option<Vec<String>>,
}

impl QueryPlan {
    pub fn has_entity(&self) -> bool {
        self.entity.as_deref().is_some_and(|e| !e.trim().is_empty())
    }
}

/// Closed set of rule and semantic findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationIssueType {
    EntityMismatch,
    MissingFilter,
    InvalidFilter,
    MissingTimeRange,
    AmbiguousIntent,
    UnnecessaryClarification,
    MissingClarification,
    InvalidOperator,
    FieldNotExist,
    InvalidEntity,
    LimitOutOfRange,
}

impl ValidationIssueType {
    /// Issues that make the entity itself questionable
    pub fn is_entity_related(self) -> bool {
        match self {
            ValidationIssueType::EntityMismatch
            | ValidationIssueType::InvalidEntity
            | ValidationIssueType::MissingClarification
            | ValidationIssueType::AmbiguousIntent => true,
            ValidationIssueType::MissingFilter
            | ValidationIssueType::InvalidFilter
            | ValidationIssueType::MissingTimeRange
            | ValidationIssueType::UnnecessaryClarification
            | ValidationIssueType::InvalidOperator
            | ValidationIssueType::FieldNotExist
            | ValidationIssueType::LimitOutOfRange => false,
        }
    }

    /// Issues the validator knows how to repair
    pub fn is_auto_fixable(self) -> bool {
        matches!(
            self,
            ValidationIssueType::UnnecessaryClarification
                | ValidationIssueType::EntityMismatch
                | ValidationIssueType::MissingTimeRange
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Critical,
    Warning,
    Info,
}

impl IssueSeverity {
    pub fn penalty(self) -> f64 {
        match self {
            IssueSeverity::Critical => 0.3,
            IssueSeverity::Warning => 0.1,
            IssueSeverity::Info => 0.02,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub issue_type: ValidationIssueType,
    pub severity: IssueSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    pub fn new(issue_type: ValidationIssueType, severity: IssueSeverity, message: impl Into<String>) -> Self {
        Self {
            issue_type,
            severity,
            field: None,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Sub-scores returned by the model-assisted semantic check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmScores {
    pub intent_alignment: f64,
    pub entity_accuracy: f64,
    pub filter_completeness: f64,
    pub overall: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl LlmScores {
    pub fn clamped(self) -> Self {
        Self {
            intent_alignment: self.intent_alignment.clamp(0.0, 1.0),
            entity_accuracy: self.entity_accuracy.clamp(0.0, 1.0),
            filter_completeness: self.filter_completeness.clamp(0.0, 1.0),
            overall: self.overall.clamp(0.0, 1.0),
            reasoning: self.reasoning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlanValidationResult {
    pub quality_score: f64,
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub corrected_plan: Option<QueryPlan>,
    pub clarification_needed: bool,
    pub clarification_question: Option<String>,
    pub clarification_options: Option<Vec<String>>,
    pub validation_time_ms: u64,
    pub llm_scores: Option<LlmScores>,
}

impl QueryPlanValidationResult {
    pub fn has_critical_issue(&self) -> bool {
        self.issues.iter().any(|i| i.severity == IssueSeverity::Critical)
    }

    /// The plan to forward: the corrected one when correction was accepted
    pub fn effective_plan<'a>(&'a self, original: &'a QueryPlan) -> &'a QueryPlan {
        self.corrected_plan.as_ref().unwrap_or(original)
    }
}
