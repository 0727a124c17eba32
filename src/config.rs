use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
    pub guard: GuardConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub gateway_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
}

/// Limits and blocklists shared by the SQL validator, the conversation
/// tracker and the query plan validator.
#[derive(Debug, Clone, Deserialize)]
pub struct GuardConfig {
    pub max_row_limit: u64,
    pub default_row_limit: u64,
    pub quality_threshold: f64,
    pub lookback_turns: usize,
    pub semantic_check_timeout_ms: u64,
    /// Comma-separated, appended to the built-in table blocklist
    pub extra_blocked_tables: String,
    /// Comma-separated, appended to the built-in function blocklist
    pub extra_blocked_functions: String,
}

pub const DEFAULT_LLM_GATEWAY_URL: &str = "http://localhost:8080";

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file first so its values count as environment
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("llm.gateway_url", DEFAULT_LLM_GATEWAY_URL)?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?
            .set_default("guard.max_row_limit", 1000)?
            .set_default("guard.default_row_limit", 100)?
            .set_default("guard.quality_threshold", 0.7)?
            .set_default("guard.lookback_turns", 10)?
            .set_default("guard.semantic_check_timeout_ms", 5000)?
            .set_default("guard.extra_blocked_tables", "")?
            .set_default("guard.extra_blocked_functions", "")?;

        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>().unwrap_or(3000))?;
        }

        if let Ok(gateway_url) = env::var("LLM_GATEWAY_URL") {
            builder = builder.set_override("llm.gateway_url", gateway_url)?;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY") {
            builder = builder.set_override("llm.api_key", Some(api_key))?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        if let Ok(log_style) = env::var("RUST_LOG_STYLE") {
            builder = builder.set_override("logging.style", log_style)?;
        }

        if let Ok(max_limit) = env::var("SQL_MAX_ROW_LIMIT") {
            builder = builder.set_override("guard.max_row_limit", max_limit.parse::<u64>().unwrap_or(1000))?;
        }

        if let Ok(default_limit) = env::var("SQL_DEFAULT_ROW_LIMIT") {
            builder = builder.set_override("guard.default_row_limit", default_limit.parse::<u64>().unwrap_or(100))?;
        }

        if let Ok(threshold) = env::var("PLAN_QUALITY_THRESHOLD") {
            builder = builder.set_override("guard.quality_threshold", threshold.parse::<f64>().unwrap_or(0.7))?;
        }

        if let Ok(turns) = env::var("CONVERSATION_LOOKBACK_TURNS") {
            builder = builder.set_override("guard.lookback_turns", turns.parse::<u64>().unwrap_or(10))?;
        }

        if let Ok(timeout) = env::var("SEMANTIC_CHECK_TIMEOUT_MS") {
            builder = builder.set_override("guard.semantic_check_timeout_ms", timeout.parse::<u64>().unwrap_or(5000))?;
        }

        if let Ok(tables) = env::var("SQL_EXTRA_BLOCKED_TABLES") {
            builder = builder.set_override("guard.extra_blocked_tables", tables)?;
        }

        if let Ok(functions) = env::var("SQL_EXTRA_BLOCKED_FUNCTIONS") {
            builder = builder.set_override("guard.extra_blocked_functions", functions)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// The semantic plan check only runs against an explicitly configured gateway
    pub fn semantic_check_enabled(&self) -> bool {
        !self.llm.gateway_url.is_empty() && self.llm.gateway_url != DEFAULT_LLM_GATEWAY_URL
    }
}

impl GuardConfig {
    pub fn extra_blocked_tables(&self) -> Vec<String> {
        split_list(&self.extra_blocked_tables)
    }

    pub fn extra_blocked_functions(&self) -> Vec<String> {
        split_list(&self.extra_blocked_functions)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}
