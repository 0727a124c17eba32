use crate::config::GuardConfig;
use crate::models::{AggregationContext, ConversationContext, ConversationTurn, ReferenceType, Role};
use crate::services::conversation::aggregation::build_aggregation_context;
use crate::services::conversation::conditions::{extract_conditions, merge_conditions};
use crate::services::conversation::reference::classify_reference;

const SUMMARY_MAX_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Number of prior turns considered when rebuilding the refinement chain
    pub lookback_turns: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { lookback_turns: 10 }
    }
}

impl From<&GuardConfig> for TrackerConfig {
    fn from(guard: &GuardConfig) -> Self {
        Self {
            lookback_turns: guard.lookback_turns,
        }
    }
}

/// Builds a fresh `ConversationContext` for each utterance from the
/// caller-supplied history. Holds no session state of its own.
#[derive(Debug, Clone)]
pub struct ConversationStateTracker {
    lookback_turns: usize,
}

impl ConversationStateTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            lookback_turns: config.lookback_turns.max(1),
        }
    }

    pub fn classify(&self, utterance: &str) -> (bool, ReferenceType) {
        classify_reference(utterance)
    }

    /// Assemble the context for `utterance` from the last turns of `history`.
    ///
    /// A `filter` or `aggregation` utterance following a query marks the
    /// context as a refinement and carries the accumulated conditions; `new`
    /// and unrelated utterances start from no conditions.
    pub fn build_context(&self, utterance: &str, history: &[ConversationTurn]) -> ConversationContext {
        let window = &history[history.len().saturating_sub(self.lookback_turns)..];
        let (_, reference) = classify_reference(utterance);

        let last_query_idx = window
            .iter()
            .rposition(|turn| turn.role == Role::Assistant && turn.sql.is_some());

        let Some(idx) = last_query_idx else {
            tracing::debug!(?reference, "No previous query in window; treating as independent");
            return ConversationContext {
                previous_question: last_user_question(window),
                conversation_history: window.to_vec(),
                ..ConversationContext::default()
            };
        };

        let previous_turn = &window[idx];
        let is_refinement = reference.is_refinement();
        let accumulated_where_conditions = if is_refinement {
            accumulate_chain(window)
        } else {
            Vec::new()
        };

        tracing::debug!(
            ?reference,
            is_refinement,
            conditions = accumulated_where_conditions.len(),
            "Built conversation context"
        );

        ConversationContext {
            previous_question: last_user_question(&window[..idx]),
            previous_sql: previous_turn.sql.clone(),
            previous_result_summary: summarize(previous_turn),
            previous_row_count: previous_turn.row_count,
            accumulated_where_conditions,
            is_refinement,
            conversation_history: window.to_vec(),
        }
    }

    /// Aggregation context for SQL generated against `context`
    pub fn aggregation_context(&self, context: &ConversationContext, sql: &str) -> Option<AggregationContext> {
        build_aggregation_context(
            sql,
            context.is_refinement,
            &context.accumulated_where_conditions,
            context.previous_row_count,
        )
    }
}

fn last_user_question(turns: &[ConversationTurn]) -> Option<String> {
    turns
        .iter()
        .rev()
        .find(|turn| turn.role == Role::User)
        .map(|turn| turn.content.clone())
}

fn turn_conditions(turn: &ConversationTurn) -> Option<Vec<String>> {
    turn.where_conditions
        .clone()
        .or_else(|| turn.sql.as_deref().map(extract_conditions))
}

/// Replay the window: each query turn either extends the chain (when the user
/// turn before it was a refinement) or starts a new one
fn accumulate_chain(window: &[ConversationTurn]) -> Vec<String> {
    let mut chain: Vec<String> = Vec::new();
    let mut refines_previous = false;

    for turn in window {
        match turn.role {
            Role::User => refines_previous = classify_reference(&turn.content).0,
            Role::Assistant => {
                let Some(conditions) = turn_conditions(turn) else {
                    continue;
                };
                chain = if refines_previous {
                    merge_conditions(&chain, &conditions)
                } else {
                    conditions
                };
            }
        }
    }

    chain
}

fn summarize(turn: &ConversationTurn) -> String {
    match turn.row_count {
        Some(count) => format!("{} rows returned", count),
        None => turn.content.chars().take(SUMMARY_MAX_CHARS).collect(),
    }
}
