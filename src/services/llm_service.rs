use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::json;
use std::time::Duration;

use crate::api::middleware::AppError;
use crate::config::Config;
use crate::models::{LlmScores, QueryPlan};

/// Model-assisted semantic check of a query plan against the question
#[async_trait]
pub trait SemanticChecker: Send + Sync {
    async fn assess(&self, plan: &QueryPlan, question: &str) -> Result<LlmScores, AppError>;
}

/// Semantic checker backed by the configured LLM gateway
pub struct LlmSemanticChecker {
    gateway_url: String,
    api_key: Option<String>,
    http_client: HttpClient,
}

impl LlmSemanticChecker {
    pub fn new(config: &Config) -> Self {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_millis(config.guard.semantic_check_timeout_ms))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                HttpClient::new()
            });

        Self {
            gateway_url: config.llm.gateway_url.clone(),
            api_key: config.llm.api_key.clone(),
            http_client,
        }
    }

    /// Prompt asking the model to grade the plan
    pub fn build_prompt(plan: &QueryPlan, question: &str) -> Result<String, AppError> {
        let plan_json = serde_json::to_string_pretty(plan)
            .map_err(|e| AppError::Internal(format!("Failed to serialize plan: {}", e)))?;

        Ok(format!(
            r#"You review query plans for a payment gateway analytics assistant.
Given the user's question and the structured plan, grade how well the plan reflects the question.

Question: {question}

Plan:
{plan_json}

Return ONLY a JSON object with these fields, each a number between 0 and 1:
- "intent_alignment": does the operation match what was asked
- "entity_accuracy": is the entity (Payment, PaymentHistory, Refund, Settlement, Merchant, Order) correct
- "filter_completeness": are all conditions from the question present as filters
- "overall": overall confidence the plan is correct
Optionally include "reasoning" as a short string.

JSON:"#,
            question = question,
            plan_json = plan_json,
        ))
    }

    /// Call the gateway and return the raw completion text
    async fn call_llm_api(&self, prompt: &str) -> Result<String, AppError> {
        if self.gateway_url.is_empty() {
            return Err(AppError::LlmService("LLM gateway is not configured".to_string()));
        }

        let mut request = self.http_client.post(&self.gateway_url).json(&json!({
            "prompt": prompt,
            "max_tokens": 300,
            "temperature": 0.0,
        }));

        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await.map_err(request_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::LlmService(format!(
                "LLM service returned error {}: {}",
                status, error_text
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::LlmService(format!("Failed to parse LLM response: {}", e)))?;

        result["text"]
            .as_str()
            .or_else(|| result["content"].as_str())
            .or_else(|| result["response"].as_str())
            .map(str::to_string)
            .ok_or_else(|| AppError::LlmService("LLM response does not contain any text".to_string()))
    }

    /// Parse the scores out of a completion, tolerating markdown fences
    pub fn parse_scores(text: &str) -> Result<LlmScores, AppError> {
        let cleaned = text
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        serde_json::from_str::<LlmScores>(cleaned)
            .map(LlmScores::clamped)
            .map_err(|e| AppError::LlmService(format!("LLM scores are not valid JSON: {}", e)))
    }
}

fn request_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(format!("LLM service did not answer in time: {}", e))
    } else {
        AppError::LlmService(format!("Failed to call LLM service: {}", e))
    }
}

#[async_trait]
impl SemanticChecker for LlmSemanticChecker {
    async fn assess(&self, plan: &QueryPlan, question: &str) -> Result<LlmScores, AppError> {
        let prompt = Self::build_prompt(plan, question)?;
        let text = self.call_llm_api(&prompt).await?;
        Self::parse_scores(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_gateway_is_an_llm_error() {
        let mut config = Config::from_env().unwrap();
        config.llm.gateway_url = "http://127.0.0.1:9/score".to_string();
        config.llm.api_key = None;
        let checker = LlmSemanticChecker::new(&config);

        let err = checker.assess(&QueryPlan::default(), "결제 10건").await.unwrap_err();
        assert!(matches!(err, AppError::LlmService(_) | AppError::Timeout(_)), "{:?}", err);
    }

    #[test]
    fn test_parse_scores_with_fence() {
        let scores = LlmSemanticChecker::parse_scores(
            "```json\n{\"intent_alignment\":0.9,\"entity_accuracy\":1.2,\"filter_completeness\":0.8,\"overall\":0.85}\n```",
        )
        .unwrap();
        assert_eq!(scores.entity_accuracy, 1.0);
        assert_eq!(scores.overall, 0.85);
        assert!(scores.reasoning.is_none());
    }

    #[test]
    fn test_parse_scores_rejects_prose() {
        let err = LlmSemanticChecker::parse_scores("The plan looks fine.").unwrap_err();
        assert!(matches!(err, AppError::LlmService(_)));
    }

    #[test]
    fn test_prompt_contains_question_and_plan() {
        let plan = QueryPlan {
            entity: Some("Refund".to_string()),
            ..QueryPlan::default()
        };
        let prompt = LlmSemanticChecker::build_prompt(&plan, "어제 환불 건수").unwrap();
        assert!(prompt.contains("Question: 어제 환불 건수"));
        assert!(prompt.contains("\"entity\": \"Refund\""));
    }
}
