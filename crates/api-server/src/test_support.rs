use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use chrono::NaiveDate;
use portfolio_core::{Benchmark, FetchError, PortfolioConfig, PriceProvider, PriceSeries, Universe};
use price_cache::PriceCache;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use update_orchestrator::UpdateOrchestrator;

use crate::AppState;

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn series(points: &[(&str, f64)]) -> PriceSeries {
    points.iter().map(|(day, p)| (d(day), *p)).collect()
}

/// Provider that waits, then returns the same two closes for every ticker.
pub struct SlowProvider(pub Duration);

#[async_trait]
impl PriceProvider for SlowProvider {
    async fn fetch_range(&self, _: &str, _: NaiveDate, _: NaiveDate) -> Result<PriceSeries, FetchError> {
        tokio::time::sleep(self.0).await;
        Ok(series(&[("2025-10-28", 10.0), ("2025-10-29", 11.0)]))
    }
}

fn config(dir: &TempDir) -> Arc<PortfolioConfig> {
    Arc::new(PortfolioConfig {
        universe: Universe::new(
            vec!["AAA".to_string(), "LATE".to_string(), "GONE".to_string()],
            vec!["BBB".to_string()],
        )
        .unwrap(),
        inception_date: d("2025-10-28"),
        benchmarks: vec![Benchmark { symbol: "^GSPC".to_string(), label: "S&P 500".to_string() }],
        cache_dir: dir.path().to_path_buf(),
        ..PortfolioConfig::default()
    })
}

fn state_with(dir: &TempDir, seed: bool, provider: Arc<dyn PriceProvider>) -> AppState {
    let config = config(dir);
    let cache = PriceCache::open(config.cache_file());
    if seed {
        cache.merge("AAA", &series(&[("2025-10-28", 100.0), ("2025-10-29", 110.0)])).unwrap();
        cache.merge("BBB", &series(&[("2025-10-28", 50.0), ("2025-10-29", 45.0)])).unwrap();
        cache.merge("LATE", &series(&[("2025-10-29", 20.0)])).unwrap();
        cache.merge("^GSPC", &series(&[("2025-10-28", 6000.0), ("2025-10-29", 6006.0)])).unwrap();
    }
    let orchestrator = UpdateOrchestrator::new(config, Arc::new(cache), provider);
    AppState { orchestrator: Arc::new(orchestrator) }
}

/// State over a cache holding AAA/BBB/LATE and the S&P 500; GONE is missing.
pub fn seeded_state() -> (AppState, TempDir) {
    let dir = TempDir::new().unwrap();
    let state = state_with(&dir, true, Arc::new(SlowProvider(Duration::ZERO)));
    (state, dir)
}

pub fn empty_state(provider: Arc<dyn PriceProvider>) -> (AppState, TempDir) {
    let dir = TempDir::new().unwrap();
    let state = state_with(&dir, false, provider);
    (state, dir)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
