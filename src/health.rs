use std::sync::Arc;

use anyhow::Result;
use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use tower_http::trace::TraceLayer;

use crate::bot::Bot;

pub struct HealthState {
    pub bot: Arc<Bot>,
    pub index_name: String,
}

pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: &str, state: Arc<HealthState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Health endpoint listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health_check(State(state): State<Arc<HealthState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "index": state.index_name,
        "chats": state.bot.sessions().chat_count().await,
    }))
}
