//! HTTP server assembly

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::Router;
use relops_common::{Error, Result};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::state::AppState;

/// Per-request handler deadline
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP server wrapper around the API router
pub struct Server {
    state: AppState,
    allowed_origins: Vec<String>,
}

impl Server {
    pub fn new(state: AppState, allowed_origins: Vec<String>) -> Self {
        Self {
            state,
            allowed_origins,
        }
    }

    /// Bind and serve until the shutdown future resolves
    pub async fn run<F>(&self, bind_addr: &str, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.build_app()?;

        info!("Starting server on {bind_addr}");
        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .map_err(|e| Error::Configuration(format!("failed to bind {bind_addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Internal(format!("server error: {e}")))?;
        Ok(())
    }

    fn build_app(&self) -> Result<Router> {
        let cors = cors_layer(&self.allowed_origins)?;
        let app = handlers::router(self.state.clone()).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        );
        Ok(app)
    }
}

fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    let origins = allowed_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .map_err(|_| Error::Configuration(format!("invalid CORS origin: {origin}")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(300)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_rejects_malformed_origins() {
        assert!(cors_layer(&["https://ops.example.com".to_string()]).is_ok());
        assert!(cors_layer(&["not a header\nvalue".to_string()]).is_err());
    }
}
