//! Lexical SQL safety gate.
//!
//! This is a defense-in-depth layer, not a parser: the read-only database
//! account is the first line of defense and the executor's timeout and row
//! cap are the last. Everything here is regex-driven so that the rules stay
//! auditable and independent of the target dialect's grammar.

use regex::Regex;
use sqlparser::ast::visit_relations;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::LazyLock;

use crate::config::GuardConfig;
use crate::validation::lexical::{has_multiple_statements, mask_string_literals, paren_depth, scan_literals};
use crate::models::ValidationResult;

/// DML, DDL and session-control verbs that never belong in a read-only query
pub const BLOCKED_KEYWORDS: [&str; 27] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "MERGE", "UPSERT",
    "GRANT", "REVOKE", "SET", "RESET", "BEGIN", "COMMIT", "ROLLBACK", "SAVEPOINT", "EXECUTE",
    "CALL", "COPY", "LOCK", "VACUUM", "REINDEX", "CLUSTER", "LISTEN", "NOTIFY", "PREPARE",
];

/// Document store, internal metadata and system catalog tables
pub const DEFAULT_BLOCKED_TABLES: &[&str] = &[
    "documents",
    "document_chunks",
    "document_embeddings",
    "chat_sessions",
    "chat_messages",
    "query_ratings",
    "api_keys",
    "admin_users",
    "alembic_version",
    "pg_catalog",
    "information_schema",
    "pg_shadow",
    "pg_authid",
    "pg_user",
    "pg_roles",
    "pg_settings",
    "pg_stat_activity",
];

/// File access, remote execution and sleep functions
pub const DEFAULT_BLOCKED_FUNCTIONS: &[&str] = &[
    "pg_read_file",
    "pg_read_binary_file",
    "pg_ls_dir",
    "pg_stat_file",
    "pg_sleep",
    "pg_sleep_for",
    "pg_sleep_until",
    "dblink",
    "dblink_exec",
    "dblink_connect",
    "lo_import",
    "lo_export",
    "lo_get",
    "pg_terminate_backend",
    "pg_cancel_backend",
    "pg_reload_conf",
    "set_config",
];

static SELECT_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*(?:WITH\s+(?:RECURSIVE\s+)?[A-Za-z_][\w]*\s+AS\s*\(.*\)\s*)?SELECT\b").unwrap()
});

static BLOCKED_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({})\b", BLOCKED_KEYWORDS.join("|"))).unwrap()
});

static TABLE_TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:FROM|JOIN|INTO|UPDATE|TABLE)\s+((?:"?[A-Za-z_][\w$]*"?\s*\.\s*)*"?[A-Za-z_][\w$]*"?)"#)
        .unwrap()
});

/// Bare, quoted and schema-qualified calls: `pg_sleep(`, `"pg_sleep"(`, `pg_catalog.pg_sleep (`
static FUNCTION_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\b([A-Za-z_][A-Za-z0-9_$]*)"?\s*\("#).unwrap());

static INTO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bINTO\b").unwrap());

static OR_STRING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bOR\s+'").unwrap());

static OR_TRUE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bOR\s+TRUE\b").unwrap());

static NUMERIC_TAUTOLOGY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:OR|AND|WHERE)\s+(\d+)\s*=\s*(\d+)\b").unwrap());

static STRING_TAUTOLOGY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:OR|AND|WHERE)\s+'([^']*)'\s*=\s*'([^']*)'").unwrap());

static LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\s+(\d+|ALL)\b").unwrap());

static LIMIT_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\b").unwrap());

static FETCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bFETCH\s+(?:FIRST|NEXT)\s+(?:(\d+)\s+)?ROWS?\s+(?:ONLY|WITH\s+TIES)\b").unwrap()
});

static FETCH_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bFETCH\b").unwrap());

#[derive(Debug, Clone)]
pub struct SqlValidatorConfig {
    pub max_limit: u64,
    pub default_limit: u64,
    pub blocked_tables: Vec<String>,
    pub blocked_functions: Vec<String>,
}

impl Default for SqlValidatorConfig {
    fn default() -> Self {
        Self {
            max_limit: 1000,
            default_limit: 100,
            blocked_tables: DEFAULT_BLOCKED_TABLES.iter().map(|t| t.to_string()).collect(),
            blocked_functions: DEFAULT_BLOCKED_FUNCTIONS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl From<&GuardConfig> for SqlValidatorConfig {
    fn from(guard: &GuardConfig) -> Self {
        let mut config = Self {
            max_limit: guard.max_row_limit,
            default_limit: guard.default_row_limit,
            ..Self::default()
        };
        config.blocked_tables.extend(guard.extra_blocked_tables());
        config.blocked_functions.extend(guard.extra_blocked_functions());
        config
    }
}

/// SQL validation service for ensuring model-generated queries are safe to execute
#[derive(Debug, Clone)]
pub struct SqlValidator {
    max_limit: u64,
    default_limit: u64,
    blocked_tables: Vec<String>,
    blocked_functions: HashSet<String>,
}

impl SqlValidator {
    pub fn new(config: SqlValidatorConfig) -> Self {
        let max_limit = config.max_limit.max(1);
        let mut blocked_tables: Vec<String> = Vec::new();
        for table in config.blocked_tables {
            let table = table.trim().to_lowercase();
            if !table.is_empty() && !blocked_tables.contains(&table) {
                blocked_tables.push(table);
            }
        }

        Self {
            max_limit,
            default_limit: config.default_limit.clamp(1, max_limit),
            blocked_tables,
            blocked_functions: config
                .blocked_functions
                .into_iter()
                .map(|f| f.trim().to_lowercase())
                .filter(|f| !f.is_empty())
                .collect(),
        }
    }

    pub fn max_limit(&self) -> u64 {
        self.max_limit
    }

    pub fn default_limit(&self) -> u64 {
        self.default_limit
    }

    /// Run every safety check and, if all pass, enforce the row cap.
    ///
    /// Failures are collected rather than short-circuited so the caller sees
    /// the complete issue list.
    pub fn validate(&self, sql: &str) -> ValidationResult {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return ValidationResult::invalid(vec!["Empty SQL query".to_string()]);
        }

        let scan = scan_literals(trimmed);
        let masked = scan.masked.as_str();
        let mut issues = Vec::new();

        if !scan.terminated {
            issues.push("Unterminated string literal".to_string());
        }

        if scan.dollar_quotes {
            issues.push("Dollar-quoted strings are not allowed".to_string());
        }

        if !SELECT_START_RE.is_match(trimmed) {
            issues.push("Only SELECT queries are allowed (optionally preceded by a WITH clause)".to_string());
        }

        // Non-standard quoting also gets the statement check on the raw text
        let nonstandard_quoting = scan.escape_strings || scan.dollar_quotes;
        if has_multiple_statements(masked) || (nonstandard_quoting && has_multiple_statements(trimmed)) {
            issues.push("Multiple statements are not allowed".to_string());
        }

        issues.extend(self.check_blocked_keywords(masked));
        issues.extend(check_select_into(masked));
        issues.extend(self.check_blocked_tables(trimmed));
        issues.extend(self.check_blocked_functions(masked));
        issues.extend(check_row_limit_clauses(masked));
        issues.extend(check_injection_patterns(trimmed, masked));

        if !issues.is_empty() {
            return ValidationResult::invalid(issues);
        }

        ValidationResult::valid(self.enforce_limit(trimmed))
    }

    /// Validate and log the outcome together with the referenced tables,
    /// which are returned whatever the outcome
    pub fn validate_and_audit(&self, sql: &str) -> (ValidationResult, Vec<String>) {
        let result = self.validate(sql);
        let tables = Self::extract_tables(sql);

        if result.is_valid {
            tracing::info!(tables = ?tables, "SQL passed safety checks");
        } else {
            tracing::warn!(tables = ?tables, issues = ?result.issues, "SQL rejected by safety checks");
        }

        (result, tables)
    }

    fn check_blocked_keywords(&self, masked: &str) -> Vec<String> {
        let found: HashSet<String> = BLOCKED_KEYWORD_RE
            .find_iter(masked)
            .map(|m| m.as_str().to_uppercase())
            .collect();

        BLOCKED_KEYWORDS
            .iter()
            .filter(|keyword| found.contains(**keyword))
            .map(|keyword| format!("Blocked keyword detected: {}", keyword))
            .collect()
    }

    /// Matches both FROM/JOIN targets and bare substrings, erring toward over-blocking
    fn check_blocked_tables(&self, sql: &str) -> Vec<String> {
        let lower = sql.to_lowercase();
        let targets: HashSet<String> = TABLE_TARGET_RE
            .captures_iter(sql)
            .filter_map(|caps| caps.get(1))
            .flat_map(|m| {
                m.as_str()
                    .split('.')
                    .map(|part| part.trim().trim_matches('"').to_lowercase())
                    .collect::<Vec<_>>()
            })
            .collect();

        self.blocked_tables
            .iter()
            .filter(|table| targets.contains(*table) || lower.contains(table.as_str()))
            .map(|table| format!("Access to blocked table: {}", table))
            .collect()
    }

    fn check_blocked_functions(&self, masked: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        FUNCTION_CALL_RE
            .captures_iter(masked)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_lowercase())
            .filter(|name| self.blocked_functions.contains(name) && seen.insert(name.clone()))
            .map(|name| format!("Blocked function detected: {}", name))
            .collect()
    }

    /// Rewrite an oversized top-level LIMIT or FETCH count down to the cap,
    /// or append the default LIMIT when neither is present
    fn enforce_limit(&self, sql: &str) -> String {
        let base = sql.trim_end().trim_end_matches(';').trim_end();
        let (masked, _) = mask_string_literals(base);

        let top_level_limit = LIMIT_RE
            .captures_iter(&masked)
            .filter_map(|caps| caps.get(1))
            .filter(|m| paren_depth(&masked[..m.start()]) == 0)
            .last();

        if let Some(m) = top_level_limit {
            return self.clamp_count(base, m.start(), m.end(), m.as_str());
        }

        let top_level_fetch = FETCH_RE
            .captures_iter(&masked)
            .filter(|caps| caps.get(0).is_some_and(|m| paren_depth(&masked[..m.start()]) == 0))
            .last();

        match top_level_fetch {
            // FETCH FIRST ROW ONLY means one row
            Some(caps) => match caps.get(1) {
                Some(m) => self.clamp_count(base, m.start(), m.end(), m.as_str()),
                None => base.to_string(),
            },
            None => format!("{} LIMIT {}", base, self.default_limit),
        }
    }

    fn clamp_count(&self, base: &str, start: usize, end: usize, count: &str) -> String {
        let exceeds = count.parse::<u64>().map_or(true, |value| value > self.max_limit);
        if exceeds {
            tracing::debug!("Rewriting row count {} down to {}", count, self.max_limit);
            format!("{}{}{}", &base[..start], self.max_limit, &base[end..])
        } else {
            base.to_string()
        }
    }

    /// List the relations a query touches, for audit logging.
    ///
    /// Independent of validation: works on rejected SQL too, falling back to a
    /// lexical FROM/JOIN scan when the statement does not parse.
    pub fn extract_tables(sql: &str) -> Vec<String> {
        let dialect = PostgreSqlDialect {};
        let mut tables: Vec<String> = Vec::new();

        match Parser::parse_sql(&dialect, sql) {
            Ok(statements) => {
                let _ = visit_relations(&statements, |relation| {
                    let name = relation.to_string();
                    if !tables.contains(&name) {
                        tables.push(name);
                    }
                    ControlFlow::<()>::Continue(())
                });
            }
            Err(e) => {
                tracing::debug!("Falling back to lexical table extraction: {}", e);
                for caps in TABLE_TARGET_RE.captures_iter(sql) {
                    if let Some(m) = caps.get(1) {
                        let name: String = m.as_str().chars().filter(|c| !c.is_whitespace()).collect();
                        if !tables.contains(&name) {
                            tables.push(name);
                        }
                    }
                }
            }
        }

        tables
    }
}

/// `SELECT ... INTO t` creates a table
fn check_select_into(masked: &str) -> Vec<String> {
    if INTO_RE.is_match(masked) {
        vec!["INTO clause is not allowed (SELECT ... INTO writes a table)".to_string()]
    } else {
        Vec::new()
    }
}

/// The row cap can only be enforced on a literal count
fn check_row_limit_clauses(masked: &str) -> Vec<String> {
    let top_level = |start: usize| paren_depth(&masked[..start]) == 0;
    let mut issues = Vec::new();

    let bad_limit = LIMIT_KEYWORD_RE
        .find_iter(masked)
        .filter(|m| top_level(m.start()))
        .any(|m| LIMIT_RE.find_at(masked, m.start()).map_or(true, |limit| limit.start() != m.start()));
    if bad_limit {
        issues.push("LIMIT must be a literal row count or ALL".to_string());
    }

    let bad_fetch = FETCH_KEYWORD_RE
        .find_iter(masked)
        .filter(|m| top_level(m.start()))
        .any(|m| FETCH_RE.find_at(masked, m.start()).map_or(true, |fetch| fetch.start() != m.start()));
    if bad_fetch {
        issues.push("FETCH must use a literal row count".to_string());
    }

    issues
}

fn check_injection_patterns(raw: &str, masked: &str) -> Vec<String> {
    let mut issues = Vec::new();

    if masked.contains("--") {
        issues.push("SQL line comment detected".to_string());
    }
    if masked.contains("/*") {
        issues.push("SQL block comment detected".to_string());
    }
    if OR_STRING_RE.is_match(raw) {
        issues.push("Suspicious OR with string literal detected".to_string());
    }
    if OR_TRUE_RE.is_match(masked) {
        issues.push("Tautology pattern detected: OR TRUE".to_string());
    }
    for caps in NUMERIC_TAUTOLOGY_RE.captures_iter(masked) {
        if caps[1] == caps[2] {
            issues.push(format!("Tautology pattern detected: {}={}", &caps[1], &caps[2]));
            break;
        }
    }
    for caps in STRING_TAUTOLOGY_RE.captures_iter(raw) {
        if caps[1] == caps[2] {
            issues.push(format!("Tautology pattern detected: '{}'='{}'", &caps[1], &caps[2]));
            break;
        }
    }

    issues
}
