use anyhow::Result;
use rmcp::ServiceExt;
use tracing_subscriber::{self, EnvFilter};

use optsim::server::OptsimServer;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Ok(port) = std::env::var("PORT") {
        // HTTP mode
        use rmcp::transport::streamable_http_server::{
            session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
        };

        let service = StreamableHttpService::new(
            || Ok(OptsimServer::new()),
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig::default(),
        );

        let app = axum::Router::new()
            .nest_service("/mcp", service)
            .route("/health", axum::routing::get(|| async { "ok" }));

        let addr = format!("0.0.0.0:{port}");
        tracing::info!("Starting optsim HTTP server on {addr}");

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
    } else {
        // stdio mode
        tracing::info!("Starting optsim MCP server (stdio)");

        let service = OptsimServer::new().serve(rmcp::transport::stdio()).await?;
        service.waiting().await?;
    }

    Ok(())
}
