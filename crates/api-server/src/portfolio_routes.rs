use axum::{extract::State, routing::get, Json, Router};
use portfolio_manager::*;

use crate::{ApiResponse, AppError, AppState};

pub fn portfolio_routes() -> Router<AppState> {
    Router::new()
        .route("/api/portfolio/summary", get(get_summary))
        .route("/api/portfolio/positions", get(get_positions))
        .route("/api/portfolio/charts", get(get_charts))
}

// Reads never wait on an update: they use whichever valuation was last published.

async fn get_summary(State(state): State<AppState>) -> Result<Json<ApiResponse<MetricsResult>>, AppError> {
    let valuation = state.orchestrator.valuation();
    let metrics =
        tokio::task::spawn_blocking(move || compute_metrics(&valuation, &valuation.benchmarks)).await?;

    Ok(Json(ApiResponse::success(metrics)))
}

async fn get_positions(State(state): State<AppState>) -> Result<Json<ApiResponse<PositionsView>>, AppError> {
    let valuation = state.orchestrator.valuation();
    Ok(Json(ApiResponse::success(positions_view(&valuation))))
}

async fn get_charts(State(state): State<AppState>) -> Result<Json<ApiResponse<ChartData>>, AppError> {
    let valuation = state.orchestrator.valuation();
    let charts = tokio::task::spawn_blocking(move || chart_data(&valuation, &valuation.benchmarks)).await?;

    Ok(Json(ApiResponse::success(charts)))
}
