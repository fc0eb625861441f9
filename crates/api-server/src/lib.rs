pub mod portfolio_routes;
pub mod request_id;
pub mod update_routes;

#[cfg(test)]
mod test_support;

use axum::{
    http::{Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Json, Router,
};
use polygon_client::PolygonClient;
use portfolio_core::{PortfolioConfig, PriceProvider};
use price_cache::PriceCache;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use update_orchestrator::{spawn_scheduler, UpdateOrchestrator, UpdateRequest};

use portfolio_routes::portfolio_routes;
use request_id::request_id_middleware;
use update_routes::update_routes;

const DEFAULT_LOG_FILTER: &str =
    "api_server=info,update_orchestrator=info,polygon_client=warn,price_cache=info,tower_http=info";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<UpdateOrchestrator>,
}

/// Standard JSON envelope for API responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(message.into()) }
    }
}

/// Handler error: any failure becomes `{success: false, error}` with a 500.
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("Request failed: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::error(self.0.to_string())),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .merge(portfolio_routes())
        .merge(update_routes())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    if json_logging {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Arc::new(PortfolioConfig::from_env()?);
    tracing::info!(
        "Portfolio: {} long / {} short, capital {:.0}, inception {}, {:.2}% per position",
        config.universe.long().len(),
        config.universe.short().len(),
        config.initial_capital,
        config.inception_date,
        config.position_size * 100.0
    );

    let cache = Arc::new(PriceCache::open(config.cache_file()));
    let provider = Arc::new(PolygonClient::new(&config.provider));
    if !provider.is_configured() {
        tracing::warn!("MASSIVE_API_KEY / POLYGON_API_KEY not set; updates will fail until configured");
    }

    let orchestrator = Arc::new(UpdateOrchestrator::new(Arc::clone(&config), cache, provider));
    let scheduler = spawn_scheduler(Arc::clone(&orchestrator));

    if config.update.on_startup {
        match orchestrator.trigger_update(UpdateRequest::default()) {
            Ok(_) => tracing::info!("Startup update started"),
            Err(e) => tracing::warn!("Startup update not started: {}", e),
        }
    }

    let app = build_router(AppState { orchestrator });

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5000);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    tracing::info!("Portfolio simulator listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.abort();
    tracing::info!("Server shut down.");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT"),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received Ctrl-C");
    }

    tracing::info!("Shutdown signal received, draining connections...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{body_json, get, seeded_state};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_request_id_generated_and_propagated() {
        let (state, _dir) = seeded_state();
        let app = build_router(state);

        let response = app.clone().oneshot(get("/api/health")).await.unwrap();
        let generated = response.headers().get("x-request-id").unwrap().to_str().unwrap();
        assert_eq!(generated.len(), 36);

        let mut request = get("/api/health");
        request.headers_mut().insert("x-request-id", "abc-123".parse().unwrap());
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.headers().get("x-request-id").unwrap(), "abc-123");
    }

    #[tokio::test]
    async fn test_app_error_is_json_500() {
        let response = AppError::from(anyhow::anyhow!("boom")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "boom");
        assert!(json.get("data").is_none());
    }

    #[tokio::test]
    async fn test_unknown_route_404() {
        let (state, _dir) = seeded_state();
        let response = build_router(state).oneshot(get("/api/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
