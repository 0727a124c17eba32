use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::config::Config;
use crate::models::{
    AggregationContext, ConversationContext, ConversationTurn, QueryPlan, QueryPlanValidationResult, ReferenceType,
    ValidationResult,
};
use crate::services::{ConversationStateTracker, TrackerConfig};
use crate::validation::{PlanValidatorConfig, QueryPlanValidator, SqlValidator, SqlValidatorConfig};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sql_validator: Arc<SqlValidator>,
    pub tracker: Arc<ConversationStateTracker>,
    pub plan_validator: Arc<QueryPlanValidator>,
}

impl AppState {
    /// Build every component from the guard section of `config`
    pub fn new(config: Config, plan_validator: QueryPlanValidator) -> Self {
        Self {
            sql_validator: Arc::new(SqlValidator::new(SqlValidatorConfig::from(&config.guard))),
            tracker: Arc::new(ConversationStateTracker::new(TrackerConfig::from(&config.guard))),
            plan_validator: Arc::new(plan_validator),
            config,
        }
    }

    /// State with rule-only plan validation
    pub fn rules_only(config: Config) -> Self {
        let plan_validator = QueryPlanValidator::new(PlanValidatorConfig::from(&config.guard));
        Self::new(config, plan_validator)
    }
}

#[derive(Debug, Deserialize)]
pub struct ValidateSqlRequest {
    pub sql: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateSqlResponse {
    pub result: ValidationResult,
    pub tables: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConversationContextRequest {
    pub question: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    /// SQL generated for `question`, when the caller already has it
    #[serde(default)]
    pub sql: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationContextResponse {
    pub context: ConversationContext,
    pub reference_type: ReferenceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation_context: Option<AggregationContext>,
}

#[derive(Debug, Deserialize)]
pub struct ValidatePlanRequest {
    pub question: String,
    pub plan: QueryPlan,
}

/// Validate a generated SQL statement before execution
pub async fn validate_sql(
    State(state): State<AppState>,
    Json(payload): Json<ValidateSqlRequest>,
) -> Result<Json<ValidateSqlResponse>, AppError> {
    let sql = payload.sql.trim();
    if sql.is_empty() {
        return Err(AppError::Validation("SQL cannot be empty".to_string()));
    }

    let (result, tables) = state.sql_validator.validate_and_audit(sql);

    Ok(Json(ValidateSqlResponse { result, tables }))
}

/// Build the conversation context for the next question
pub async fn conversation_context(
    State(state): State<AppState>,
    Json(payload): Json<ConversationContextRequest>,
) -> Result<Json<ConversationContextResponse>, AppError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(AppError::Validation("Question cannot be empty".to_string()));
    }

    let (_, reference_type) = state.tracker.classify(question);
    let context = state.tracker.build_context(question, &payload.history);
    let aggregation_context = payload
        .sql
        .as_deref()
        .and_then(|sql| state.tracker.aggregation_context(&context, sql));

    tracing::info!(
        ?reference_type,
        is_refinement = context.is_refinement,
        "Conversation context built"
    );

    Ok(Json(ConversationContextResponse {
        context,
        reference_type,
        aggregation_context,
    }))
}

/// Score a structured query plan, correcting or asking for clarification
pub async fn validate_plan(
    State(state): State<AppState>,
    Json(payload): Json<ValidatePlanRequest>,
) -> Result<Json<QueryPlanValidationResult>, AppError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(AppError::Validation("Question cannot be empty".to_string()));
    }

    let result = state.plan_validator.validate(&payload.plan, question).await;

    tracing::info!(
        score = result.quality_score,
        is_valid = result.is_valid,
        corrected = result.corrected_plan.is_some(),
        critical = result.has_critical_issue(),
        entity = result.effective_plan(&payload.plan).entity.as_deref().unwrap_or("-"),
        clarification = result.clarification_needed,
        "Plan validated in {}ms",
        result.validation_time_ms
    );

    Ok(Json(result))
}
