use serde::{Deserialize, Serialize};

use crate::api::middleware::AppError;

/// Outcome of running a raw SQL string through the safety checks.
///
/// `sanitized_sql` is only present when every check passed; it is the only
/// string that may be forwarded to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub sanitized_sql: Option<String>,
}

impl ValidationResult {
    pub fn valid(sanitized_sql: String) -> Self {
        Self {
            is_valid: true,
            issues: Vec::new(),
            sanitized_sql: Some(sanitized_sql),
        }
    }

    pub fn invalid(issues: Vec<String>) -> Self {
        Self {
            is_valid: false,
            issues,
            sanitized_sql: None,
        }
    }

    /// Convert into the sanitized SQL, or an `InvalidSql` error listing every issue
    pub fn into_sanitized(self) -> Result<String, AppError> {
        match self.sanitized_sql {
            Some(sql) if self.is_valid => Ok(sql),
            _ => Err(AppError::InvalidSql(self.issues.join("; "))),
        }
    }
}
