//! HTTP API gateway for tpforge.
//!
//! Exposes a health check and the `/api` REST surface for companies,
//! transactions and policy records, including generation, single-section
//! regeneration, manual edits, review and Markdown export.
//!
//! Built on Axum.

pub mod api;
pub mod error;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, response::Json, routing::get};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use tpforge_config::{AppConfig, GatewayConfig};
use tpforge_pipeline::PolicyService;

pub use api::{ApiState, SharedApiState, api_router};
pub use error::{ApiError, ErrorResponse};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Build the full router.
///
/// Layers applied:
/// - CORS limited to the configured origins
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(service: Arc<PolicyService>, gateway: &GatewayConfig) -> Router {
    let api = api_router(Arc::new(ApiState { service }));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors_layer(&gateway.allowed_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Builds the store, knowledge base and generation provider once and
/// shares them across requests.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let service = tpforge_pipeline::bootstrap::build_service(&config).await?;
    let app = build_router(service, &config.gateway);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use tpforge_knowledge::KnowledgeBase;
    use tpforge_pipeline::{BuiltinTemplates, GenerationSettings, Orchestrator, SectionRunner};
    use tpforge_providers::OpenAiCompatProvider;
    use tpforge_store::InMemoryStore;

    fn test_service() -> Arc<PolicyService> {
        let runner = SectionRunner::new(
            Arc::new(OpenAiCompatProvider::new("ollama", "http://localhost:11434/v1", "")),
            Arc::new(KnowledgeBase::new(Vec::new())),
            Arc::new(BuiltinTemplates),
            GenerationSettings::default(),
        );
        Arc::new(PolicyService::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(Orchestrator::new(runner)),
        ))
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_service(), &GatewayConfig::default());

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "healthy");
    }

    #[tokio::test]
    async fn api_is_nested() {
        let app = build_router(test_service(), &GatewayConfig::default());
        let req = Request::builder()
            .uri("/api/companies")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let app = build_router(test_service(), &GatewayConfig::default());
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/api/companies")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let app = build_router(test_service(), &GatewayConfig::default());
        let req = Request::builder()
            .method("POST")
            .uri("/api/companies")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(vec![b' '; 2 * 1024 * 1024]))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
