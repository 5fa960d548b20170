pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

/// The management routes, mounted under `/api`.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/qualify", post(handlers::handle_qualify))
        .route("/cli/qualify", post(handlers::handle_cli_qualify))
        .route(
            "/endpoints/{name}/contacts",
            get(handlers::handle_endpoint_contacts),
        )
        .route("/statuses", get(handlers::handle_statuses))
        .route("/metrics", get(handlers::handle_metrics))
        .route("/reload", post(handlers::handle_reload))
        .route(
            "/aors/{id}/reconfigure",
            post(handlers::handle_aor_reconfigure),
        )
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, app).await?;
    Ok(())
}
