//! Detects aggregate shape (SUM/COUNT/AVG/MAX/MIN and GROUP BY) of a query.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{AggregationContext, AggregationInfo, QueryType};
use crate::services::conversation::conditions::extract_conditions;
use crate::validation::lexical::{mask_string_literals, paren_depth, split_top_level};

static AGGREGATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(SUM|COUNT|AVG|MAX|MIN)\s*\(\s*((?:DISTINCT\s+)?(?:[^()]|\([^()]*\))*?)\s*\)(?:\s+AS\s+("[^"]+"|[A-Za-z_]\w*)|\s+([A-Za-z_]\w*))?"#,
    )
    .unwrap()
});

static GROUP_BY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bGROUP\s+BY\b").unwrap());

static GROUP_BY_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bHAVING\b|\bORDER\s+BY\b|\bLIMIT\b|\bOFFSET\b|\bWINDOW\b|\bUNION\b|;").unwrap()
});

/// Words that can follow an aggregate call without being an alias
const NON_ALIAS_KEYWORDS: &[&str] = &[
    "FROM", "WHERE", "AS", "OVER", "FILTER", "AND", "OR", "ORDER", "GROUP", "HAVING", "LIMIT", "UNION",
    "THEN", "ELSE", "END", "WHEN", "DESC", "ASC", "IS", "IN", "NOT", "LIKE", "BETWEEN", "NULLS",
];

/// Aggregate calls in the query, in order of appearance
pub fn detect_aggregations(sql: &str) -> Vec<AggregationInfo> {
    let (masked, _) = mask_string_literals(sql);

    AGGREGATE_RE
        .captures_iter(&masked)
        .filter_map(|caps| {
            let function = caps.get(1)?.as_str().to_uppercase();
            let target = caps.get(2).map_or("", |m| sql[m.range()].trim());
            let alias = caps
                .get(3)
                .map(|m| sql[m.range()].trim_matches('"').to_string())
                .or_else(|| {
                    caps.get(4)
                        .map(|m| m.as_str())
                        .filter(|word| !NON_ALIAS_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word)))
                        .map(str::to_string)
                });

            Some(AggregationInfo {
                function,
                target_column: if target.is_empty() { "*".to_string() } else { target.to_string() },
                alias,
            })
        })
        .collect()
}

/// Columns of the outermost GROUP BY clause
pub fn group_by_columns(sql: &str) -> Vec<String> {
    let (masked, _) = mask_string_literals(sql);

    let Some(start) = GROUP_BY_RE
        .find_iter(&masked)
        .find(|m| paren_depth(&masked[..m.start()]) == 0)
        .map(|m| m.end())
    else {
        return Vec::new();
    };

    let end = GROUP_BY_END_RE
        .find_iter(&masked[start..])
        .find(|m| paren_depth(&masked[start..start + m.start()]) == 0)
        .map_or(masked.len(), |m| start + m.start());

    split_top_level(&sql[start..end], &masked[start..end], ',')
}

/// Build the aggregation context for a query, or `None` when it has no
/// aggregate function.
///
/// For a refinement the context is anchored to the previous turn's filters
/// and row count; otherwise it describes the query's own WHERE clause.
pub fn build_aggregation_context(
    sql: &str,
    is_refinement: bool,
    previous_conditions: &[String],
    source_row_count: Option<u64>,
) -> Option<AggregationContext> {
    let aggregations = detect_aggregations(sql);
    if aggregations.is_empty() {
        return None;
    }

    let group_by_columns = group_by_columns(sql);
    let (query_type, based_on_filters, source_row_count) = if is_refinement {
        (QueryType::Refinement, previous_conditions.to_vec(), source_row_count)
    } else {
        (QueryType::NewQuery, extract_conditions(sql), None)
    };

    Some(AggregationContext {
        query_type,
        based_on_filters,
        source_row_count,
        aggregations,
        has_group_by: !group_by_columns.is_empty(),
        group_by_columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_with_and_without_alias() {
        let aggs = detect_aggregations(
            "SELECT COUNT(*) AS cnt, sum(amount) total, AVG(DISTINCT fee), MAX(COALESCE(amount, 0)) FROM payments",
        );
        assert_eq!(aggs.len(), 4);
        assert_eq!(aggs[0].function, "COUNT");
        assert_eq!(aggs[0].target_column, "*");
        assert_eq!(aggs[0].alias.as_deref(), Some("cnt"));
        assert_eq!(aggs[1].function, "SUM");
        assert_eq!(aggs[1].alias.as_deref(), Some("total"));
        assert_eq!(aggs[2].target_column, "DISTINCT fee");
        assert_eq!(aggs[2].alias, None);
        assert_eq!(aggs[3].target_column, "COALESCE(amount, 0)");
        assert_eq!(aggs[3].alias, None);
    }

    #[test]
    fn test_keyword_is_not_alias() {
        let aggs = detect_aggregations("SELECT COUNT(*) FROM payments WHERE status = 'DONE'");
        assert_eq!(aggs.len(), 1);
        assert_eq!(aggs[0].alias, None);
    }

    #[test]
    fn test_aggregate_inside_literal_ignored() {
        assert!(detect_aggregations("SELECT * FROM payments WHERE memo = 'SUM(x)'").is_empty());
    }

    #[test]
    fn test_group_by_columns() {
        let columns = group_by_columns(
            "SELECT merchant_id, DATE(created_at), SUM(amount) FROM payments GROUP BY merchant_id, DATE(created_at) ORDER BY 3 DESC",
        );
        assert_eq!(columns, vec!["merchant_id".to_string(), "DATE(created_at)".to_string()]);
    }

    #[test]
    fn test_no_aggregate_is_none() {
        assert!(build_aggregation_context("SELECT * FROM payments", true, &[], Some(10)).is_none());
    }

    #[test]
    fn test_refinement_context_uses_previous_filters() {
        let previous = vec!["created_at >= '2024-01-01'".to_string(), "status = 'DONE'".to_string()];
        let context = build_aggregation_context(
            "SELECT SUM(amount) AS total FROM payments WHERE created_at >= '2024-01-01' AND status = 'DONE'",
            true,
            &previous,
            Some(42),
        )
        .unwrap();

        assert_eq!(context.query_type, QueryType::Refinement);
        assert_eq!(context.based_on_filters, previous);
        assert_eq!(context.source_row_count, Some(42));
        assert!(!context.has_group_by);
    }

    #[test]
    fn test_new_query_context_uses_own_filters() {
        let context = build_aggregation_context(
            "SELECT merchant_id, COUNT(*) FROM refunds WHERE status = 'DONE' GROUP BY merchant_id",
            false,
            &["ignored = 1".to_string()],
            Some(42),
        )
        .unwrap();

        assert_eq!(context.query_type, QueryType::NewQuery);
        assert_eq!(context.based_on_filters, vec!["status = 'DONE'".to_string()]);
        assert_eq!(context.source_row_count, None);
        assert!(context.has_group_by);
        assert_eq!(context.group_by_columns, vec!["merchant_id".to_string()]);
    }
}
