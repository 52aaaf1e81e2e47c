//! Health advisor server binary
//!
//! Run with: cargo run -p health-advisor --bin health-advisor-server

use health_advisor::{config::AdvisorConfig, server::AdvisorServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Optional TOML config file; environment variables override it
const CONFIG_ENV: &str = "HEALTH_ADVISOR_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "health_advisor=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                      Health Advisor                       ║
║       AI Health Recommendations with Rule Fallback        ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    // Load configuration
    let config = match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            tracing::info!("Loading configuration from {}", path);
            let mut config = AdvisorConfig::from_file(&path)?;
            config.apply_env()?;
            config
        }
        Err(_) => AdvisorConfig::from_env()?,
    };

    tracing::info!("Configuration loaded");
    tracing::info!("  - Backend: {:?}", config.backend);
    match config.remote_model() {
        Some(gcp) => tracing::info!("  - Remote endpoint: {}", gcp.predict_url()),
        None => tracing::info!("  - Local model: {} at {}", config.llm.model, config.llm.base_url),
    }
    tracing::info!("  - Database: {}", config.storage.database_path.display());
    tracing::info!("  - Audit logging: {}", config.audit.enabled);

    let server = AdvisorServer::new(config)?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST /api/recommendations/generate        - Generate recommendations");
    println!("  GET  /api/recommendations/subject/:id     - List recommendations");
    println!("  POST /api/recommendations/:id/acknowledge - Acknowledge with feedback");
    println!("  POST /api/recommendations/:id/dismiss     - Dismiss");
    println!("  POST /api/recommendations/chat            - Chat");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
