use axum::{
    http::StatusCode,
    response::{
        IntoResponse,
        Response,
    },
};
use zerotrust_exporter_collector::ScrapeError;

/// Failures that reach the HTTP client. Collector failures never do; they show up in the metrics instead.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Scrape failed: {0}")]
    Scrape(#[from] ScrapeError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = %self, "Scrape response failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
