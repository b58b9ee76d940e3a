/// Axum HTTP server setup and routing

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::*;

pub fn create_router(store: AppState) -> Router {
    // Configure CORS to allow requests from wallet frontend/tests
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Wallet API
        .route("/wallet", post(wallet_endpoint))
        .route("/balance", get(get_balance))
        .route("/multiaddr", get(get_multiaddr))

        // Mock helper endpoints
        .route("/mock/balance", post(set_balance))
        .route("/mock/tx", post(add_transaction))

        // Shared state
        .with_state(store)

        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve on an already bound listener (tests bind to port 0)
pub async fn serve(listener: tokio::net::TcpListener, store: AppState) -> anyhow::Result<()> {
    let app = create_router(store);
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn run_server(store: AppState, host: String, port: u16) -> anyhow::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("🚀 Wallet API mock listening on http://{}", addr);
    log::info!("🔨 Seed endpoints: POST /mock/balance, POST /mock/tx");

    serve(listener, store).await
}
