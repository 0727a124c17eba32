//! WHERE-condition extraction and field-unique merging across turns.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::validation::lexical::{mask_string_literals, paren_depth};

static WHERE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bWHERE\b").unwrap());

static CLAUSE_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bGROUP\s+BY\b|\bORDER\s+BY\b|\bHAVING\b|\bLIMIT\b|\bOFFSET\b|\bWINDOW\b|\bUNION\b|;").unwrap()
});

static AND_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bAND\b").unwrap());

static BETWEEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bBETWEEN\b").unwrap());

static CONDITION_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)^\s*\(*\s*(?:[A-Za-z_]\w*\s*\(\s*)?("?[A-Za-z_]\w*"?(?:\s*\.\s*"?[A-Za-z_]\w*"?)*)\s*\)?\s*(?:>=|<=|<>|!=|=|>|<|NOT\s+I?LIKE\b|I?LIKE\b|NOT\s+IN\b|IN\b|IS\s+NOT\s+NULL\b|IS\s+NULL\b|NOT\s+BETWEEN\b|BETWEEN\b)"#,
    )
    .unwrap()
});

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Top-level conditions of the outermost WHERE clause, split on AND.
///
/// The clause runs until the first GROUP BY, ORDER BY, HAVING, LIMIT or end
/// of statement. `BETWEEN x AND y` stays one condition.
pub fn extract_conditions(sql: &str) -> Vec<String> {
    let (masked, _) = mask_string_literals(sql);

    let Some(start) = WHERE_RE
        .find_iter(&masked)
        .find(|m| paren_depth(&masked[..m.start()]) == 0)
        .map(|m| m.end())
    else {
        return Vec::new();
    };

    let end = CLAUSE_END_RE
        .find_iter(&masked[start..])
        .find(|m| paren_depth(&masked[start..start + m.start()]) == 0)
        .map_or(masked.len(), |m| start + m.start());

    split_on_and(&sql[start..end], &masked[start..end])
}

fn split_on_and(original: &str, masked: &str) -> Vec<String> {
    let mut conditions = Vec::new();
    let mut segment_start = 0;

    for m in AND_RE.find_iter(masked) {
        if paren_depth(&masked[..m.start()]) != 0 {
            continue;
        }
        let segment = &masked[segment_start..m.start()];
        // The AND belongs to a BETWEEN still waiting for its upper bound
        if BETWEEN_RE.find_iter(segment).count() > AND_RE.find_iter(segment).count() {
            continue;
        }
        conditions.push(original[segment_start..m.start()].trim().to_string());
        segment_start = m.end();
    }
    conditions.push(original[segment_start..].trim().to_string());

    conditions.retain(|c| !c.is_empty());
    conditions
}

/// Field on the left-hand side of a condition, unwrapping a single function
/// call such as `DATE(created_at)`.
pub fn extract_condition_field(condition: &str) -> Option<String> {
    CONDITION_FIELD_RE.captures(condition).and_then(|caps| caps.get(1)).map(|m| {
        m.as_str()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '"')
            .collect()
    })
}

/// Identity used for field-unique replacement: the unqualified, lower-cased
/// column, or the normalized condition text when no field can be parsed
fn condition_key(condition: &str) -> String {
    match extract_condition_field(condition) {
        Some(field) => {
            let column = field.rsplit('.').next().unwrap_or(&field);
            format!("field:{}", column.to_lowercase())
        }
        None => format!(
            "text:{}",
            WHITESPACE_RE.replace_all(condition.trim(), " ").to_lowercase()
        ),
    }
}

/// Merge a new batch of conditions into the accumulated ones.
///
/// Any existing condition on a field the batch touches is replaced by the
/// batch's conditions for that field; untouched fields are carried forward in
/// their original order. Several conditions on one field within a single
/// batch (a range) are all kept.
pub fn merge_conditions(existing: &[String], incoming: &[String]) -> Vec<String> {
    let incoming_keys: HashSet<String> = incoming.iter().map(|c| condition_key(c)).collect();

    let mut merged: Vec<String> = existing
        .iter()
        .filter(|c| !incoming_keys.contains(&condition_key(c)))
        .cloned()
        .collect();

    for condition in incoming {
        if !merged.contains(condition) {
            merged.push(condition.clone());
        }
    }

    merged
}
