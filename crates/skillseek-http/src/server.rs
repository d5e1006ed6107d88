//! Axum application assembly and the serving loop.

use crate::handlers;
use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpService,
};
use skillseek_runtime::ServiceContext;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the application router: REST endpoints plus the MCP service
/// nested at `/mcp`. Every MCP session shares the same service context.
pub fn create_app(ctx: Arc<ServiceContext>) -> Router {
    let mcp_ctx = ctx.clone();
    let mcp_service = StreamableHttpService::new(
        move || Ok::<_, std::io::Error>(skillseek_mcp::build_router(mcp_ctx.clone())),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    Router::new()
        .route("/health", get(handlers::health))
        .route("/skills", get(handlers::list_skills))
        .route("/skills/upload", post(handlers::upload_skills))
        .with_state(ctx)
        .nest_service("/mcp", mcp_service)
}

/// Bind and serve until ctrl-c.
pub async fn serve(ctx: Arc<ServiceContext>, host: &str, port: u16) -> Result<()> {
    let app = create_app(ctx).layer(TraceLayer::new_for_http());
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {addr}: {e}"))?;
    info!(addr = %addr, "HTTP server ready (MCP at /mcp)");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))?;
    Ok(())
}
