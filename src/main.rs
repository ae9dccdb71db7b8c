use mcp_gateway::api::{AppState, gateway_routes};
use mcp_gateway::config::GatewayConfig;
use mcp_gateway::session::spawn_sweep_task;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = GatewayConfig::from_env();

    let state = AppState::load(&config).unwrap_or_else(|e| {
        eprintln!(
            "Error: Failed to load worker configuration from {}: {}",
            config.workers_path.display(),
            e
        );
        eprintln!("  export MCP_GATEWAY_WORKERS=/path/to/mcp-config.json");
        std::process::exit(1);
    });

    eprintln!("🛰  MCP Gateway v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Capabilities: {} ({})",
        state.directory.len(),
        config.workers_path.display()
    );
    eprintln!("   Invocation timeout: {:?}", config.invocation_timeout);
    eprintln!(
        "   Sessions: max {}, idle ttl {:?}",
        config.max_sessions, config.session_ttl
    );
    eprintln!("   API: http://0.0.0.0:{}/api/conversation\n", config.port);

    let sweep_handle = spawn_sweep_task(state.store().clone(), config.sweep_interval);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Gateway listening");

    axum::serve(listener, gateway_routes(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    sweep_handle.abort();
    Ok(())
}
