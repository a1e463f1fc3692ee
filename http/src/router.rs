use crate::error::AppError;
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;
use zerotrust_exporter_collector::Scraper;

#[derive(Clone)]
pub struct AppState {
    pub scraper: Arc<Scraper>,
}

pub fn create_router(scraper: Arc<Scraper>) -> Router {
    let state = AppState { scraper };

    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Runs a full scrape and answers with the text exposition of the whole registry.
async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.scraper.scrape_and_encode().await?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}

/// Process liveness only; says nothing about the upstream API.
async fn healthz() -> &'static str {
    "ok"
}
