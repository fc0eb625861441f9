use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use portfolio_core::PortfolioError;
use serde::Serialize;
use update_orchestrator::{UpdateRequest, UpdateStatus};

use crate::{AppError, AppState};

pub fn update_routes() -> Router<AppState> {
    Router::new()
        .route("/api/portfolio/update", post(trigger_update))
        .route("/api/portfolio/update/status", get(get_update_status))
        .route("/api/health", get(health))
}

#[derive(Debug, Serialize)]
struct TriggerResponse {
    success: bool,
    total_tickers: usize,
    already_running: bool,
    message: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    success: bool,
    status: UpdateStatus,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    success: bool,
    status: &'static str,
    cache_exists: bool,
    cached_tickers: usize,
}

/// Start an update and return immediately; progress is read from the status
/// endpoint.
async fn trigger_update(
    State(state): State<AppState>,
    body: Option<Json<UpdateRequest>>,
) -> Result<Json<TriggerResponse>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let total_tickers = state.orchestrator.total_tickers();

    match state.orchestrator.trigger_update(request) {
        Ok(_) => Ok(Json(TriggerResponse {
            success: true,
            total_tickers,
            already_running: false,
            message: format!("Update started for {} tickers", total_tickers),
        })),
        Err(PortfolioError::ConcurrentUpdateRejected) => Ok(Json(TriggerResponse {
            success: true,
            total_tickers,
            already_running: true,
            message: "Update already in progress".to_string(),
        })),
        Err(e) => Err(e.into()),
    }
}

async fn get_update_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse { success: true, status: state.orchestrator.status() })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let cache = state.orchestrator.cache();
    Json(HealthResponse {
        success: true,
        status: "healthy",
        cache_exists: cache.path().exists(),
        cached_tickers: cache.len(),
    })
}

#[cfg(test)]
mod tests {
    use crate::build_router;
    use crate::test_support::{body_json, empty_state, get, seeded_state, SlowProvider};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use update_orchestrator::UpdateState;

    fn post(uri: &str, body: Option<&str>) -> Request<Body> {
        let builder = Request::builder().method("POST").uri(uri);
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_trigger_update_runs_to_completion() {
        let (state, _dir) = empty_state(Arc::new(SlowProvider(Duration::ZERO)));
        let mut rx = state.orchestrator.subscribe();
        let app = build_router(state.clone());

        let response = app
            .clone()
            .oneshot(post("/api/portfolio/update", Some(r#"{"force_refresh":true}"#)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["already_running"], false);
        assert_eq!(json["total_tickers"], 5);

        rx.wait_for(|s| s.state == UpdateState::Completed).await.unwrap();

        let json = body_json(app.clone().oneshot(get("/api/portfolio/update/status")).await.unwrap()).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["status"]["state"], "completed");
        assert_eq!(json["status"]["running"], false);
        assert!(json["status"]["last_update_time"].is_string());
        assert_eq!(json["status"]["last_report"]["updated_count"], 5);

        let json = body_json(app.oneshot(get("/api/portfolio/summary")).await.unwrap()).await;
        assert_eq!(json["data"]["has_data"], true);
        assert_eq!(json["data"]["latest_date"], "2025-10-29");
    }

    #[tokio::test]
    async fn test_second_trigger_reports_already_running() {
        let (state, _dir) = empty_state(Arc::new(SlowProvider(Duration::from_millis(300))));
        let app = build_router(state);

        let first = body_json(app.clone().oneshot(post("/api/portfolio/update", None)).await.unwrap()).await;
        assert_eq!(first["already_running"], false);

        let second = body_json(app.clone().oneshot(post("/api/portfolio/update", None)).await.unwrap()).await;
        assert_eq!(second["success"], true);
        assert_eq!(second["already_running"], true);

        let status = body_json(app.oneshot(get("/api/portfolio/update/status")).await.unwrap()).await;
        assert_eq!(status["status"]["running"], true);
        assert_eq!(status["status"]["total"], 5);
    }

    #[tokio::test]
    async fn test_idle_status() {
        let (state, _dir) = seeded_state();
        let json = body_json(
            build_router(state).oneshot(get("/api/portfolio/update/status")).await.unwrap(),
        )
        .await;
        assert_eq!(json["status"]["state"], "idle");
        assert_eq!(json["status"]["running"], false);
        assert!(json["status"]["error"].is_null());
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _dir) = seeded_state();
        let json = body_json(build_router(state).oneshot(get("/api/health")).await.unwrap()).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["cache_exists"], true);
        assert_eq!(json["cached_tickers"], 4);

        let (state, _dir) = empty_state(Arc::new(SlowProvider(Duration::ZERO)));
        let json = body_json(build_router(state).oneshot(get("/api/health")).await.unwrap()).await;
        assert_eq!(json["cache_exists"], false);
        assert_eq!(json["cached_tickers"], 0);
    }
}
