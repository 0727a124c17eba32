use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of a session, supplied by the caller and never mutated here
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_conditions: Option<Vec<String>>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sql: None,
            row_count: None,
            where_conditions: None,
        }
    }

    pub fn assistant(content: impl Into<String>, sql: impl Into<String>, row_count: Option<u64>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sql: Some(sql.into()),
            row_count,
            where_conditions: None,
        }
    }

    pub fn with_where_conditions(mut self, conditions: Vec<String>) -> Self {
        self.where_conditions = Some(conditions);
        self
    }
}

/// How an utterance relates to the previous result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    /// Narrow the previous result set
    Filter,
    /// Aggregate or compute over the previous result set
    Aggregation,
    /// Explicitly start over
    New,
    /// No reference detected; an independent query
    #[serde(rename = "none")]
    Unrelated,
}

impl ReferenceType {
    pub fn is_refinement(self) -> bool {
        matches!(self, ReferenceType::Filter | ReferenceType::Aggregation)
    }
}

/// Request-scoped view of the conversation, rebuilt for every utterance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    pub previous_question: Option<String>,
    pub previous_sql: Option<String>,
    pub previous_result_summary: String,
    pub previous_row_count: Option<u64>,
    pub accumulated_where_conditions: Vec<String>,
    pub is_refinement: bool,
    pub conversation_history: Vec<ConversationTurn>,
}

impl ConversationContext {
    /// Render the context as a prompt section for the SQL-generating model
    pub fn to_prompt_section(&self) -> String {
        let mut section = String::from("Conversation Context:\n");

        if let Some(question) = &self.previous_question {
            section.push_str(&format!("  Previous question: {}\n", question));
        }
        if let Some(sql) = &self.previous_sql {
            section.push_str(&format!("  Previous SQL: {}\n", sql));
        }
        if !self.previous_result_summary.is_empty() {
            section.push_str(&format!("  Previous result: {}\n", self.previous_result_summary));
        }

        if self.is_refinement {
            section.push_str("  The new question refines the previous result.\n");
            if !self.accumulated_where_conditions.is_empty() {
                section.push_str("  Keep ALL of these WHERE conditions unless the question changes the same field:\n");
                for condition in &self.accumulated_where_conditions {
                    section.push_str(&format!("    - {}\n", condition));
                }
            }
        } else {
            section.push_str("  The new question is an independent query. Do not reuse previous filters.\n");
        }

        section
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    NewQuery,
    Refinement,
}

/// One aggregate call found in a SELECT list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationInfo {
    /// Upper-cased function name (SUM, COUNT, AVG, MAX, MIN)
    pub function: String,
    pub target_column: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationContext {
    pub query_type: QueryType,
    pub based_on_filters: Vec<String>,
    pub source_row_count: Option<u64>,
    pub aggregations: Vec<AggregationInfo>,
    pub has_group_by: bool,
    pub group_by_columns: Vec<String>,
}

impl AggregationContext {
    pub fn to_prompt_section(&self) -> String {
        let mut section = String::from("Aggregation Context:\n");

        match self.query_type {
            QueryType::Refinement => {
                match self.source_row_count {
                    Some(count) => section.push_str(&format!(
                        "  Aggregate over exactly the previously filtered set of {} rows.\n",
                        count
                    )),
                    None => section.push_str("  Aggregate over exactly the previously filtered set.\n"),
                }
                if !self.based_on_filters.is_empty() {
                    section.push_str("  Based on filters:\n");
                    for filter in &self.based_on_filters {
                        section.push_str(&format!("    - {}\n", filter));
                    }
                }
            }
            QueryType::NewQuery => section.push_str("  Aggregate over a new query.\n"),
        }

        for agg in &self.aggregations {
            match &agg.alias {
                Some(alias) => section.push_str(&format!("  {}({}) AS {}\n", agg.function, agg.target_column, alias)),
                None => section.push_str(&format!("  {}({})\n", agg.function, agg.target_column)),
            }
        }

        if self.has_group_by {
            section.push_str(&format!("  Grouped by: {}\n", self.group_by_columns.join(", ")));
        }

        section
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_deserialize_minimal() {
        let turn: ConversationTurn =
            serde_json::from_str(r#"{"role":"user","content":"이번 주 결제 보여줘"}"#).unwrap();
        assert_eq!(turn.role, Role::User);
        assert!(turn.sql.is_none());
        assert!(turn.where_conditions.is_none());
    }

    #[test]
    fn test_reference_type_serde() {
        assert_eq!(serde_json::to_string(&ReferenceType::Unrelated).unwrap(), "\"none\"");
        assert_eq!(serde_json::to_string(&ReferenceType::Filter).unwrap(), "\"filter\"");
        assert_eq!(serde_json::to_string(&QueryType::NewQuery).unwrap(), "\"NEW_QUERY\"");
    }

    #[test]
    fn test_context_prompt_section() {
        let context = ConversationContext {
            previous_question: Some("오늘 결제".to_string()),
            previous_sql: Some("SELECT * FROM payments WHERE created_at >= '2024-01-01'".to_string()),
            previous_result_summary: "42 rows returned".to_string(),
            previous_row_count: Some(42),
            accumulated_where_conditions: vec!["created_at >= '2024-01-01'".to_string()],
            is_refinement: true,
            conversation_history: Vec::new(),
        };

        let section = context.to_prompt_section();
        assert!(section.contains("refines the previous result"));
        assert!(section.contains("- created_at >= '2024-01-01'"));
        assert!(section.contains("42 rows returned"));
    }

    #[test]
    fn test_aggregation_prompt_section() {
        let context = AggregationContext {
            query_type: QueryType::Refinement,
            based_on_filters: vec!["status = 'DONE'".to_string()],
            source_row_count: Some(12),
            aggregations: vec![AggregationInfo {
                function: "SUM".to_string(),
                target_column: "amount".to_string(),
                alias: Some("total".to_string()),
            }],
            has_group_by: false,
            group_by_columns: Vec::new(),
        };

        let section = context.to_prompt_section();
        assert!(section.contains("previously filtered set of 12 rows"));
        assert!(section.contains("SUM(amount) AS total"));
    }
}
