use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use payment_query_guard::api::handlers::AppState;
use payment_query_guard::api::routes::create_router;
use payment_query_guard::config::Config;
use payment_query_guard::services::LlmSemanticChecker;
use payment_query_guard::validation::{PlanValidatorConfig, QueryPlanValidator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let mut plan_validator = QueryPlanValidator::new(PlanValidatorConfig::from(&config.guard));
    if config.semantic_check_enabled() {
        info!("Semantic plan check enabled via {}", config.llm.gateway_url);
        plan_validator = plan_validator.with_semantic_checker(Arc::new(LlmSemanticChecker::new(&config)));
    } else {
        info!("No LLM gateway configured; plan validation is rule-based only");
    }

    info!(
        max_row_limit = config.guard.max_row_limit,
        default_row_limit = config.guard.default_row_limit,
        quality_threshold = config.guard.quality_threshold,
        "Query guard configured"
    );

    let addr: SocketAddr = config.server_address().parse()?;
    let app = create_router(AppState::new(config, plan_validator));

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
