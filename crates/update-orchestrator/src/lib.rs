//! Coordinates fetch, cache merge and revaluation as one supervised update.

pub mod fetcher;
pub mod scheduler;
pub mod status;

#[cfg(test)]
mod test_support;

use chrono::Utc;
use portfolio_core::{PortfolioConfig, PortfolioError, PriceProvider};
use portfolio_manager::{compute_series, Valuation};
use price_cache::PriceCache;
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use fetcher::{BatchFetcher, FailedTicker, FetchPlan, PlanContext, UpdateReport};
pub use scheduler::{next_scheduled_update, spawn_scheduler};
pub use status::{StatusBoard, UpdatePhase, UpdateState, UpdateStatus};

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub force_refresh: bool,
}

pub struct UpdateOrchestrator {
    config: Arc<PortfolioConfig>,
    cache: Arc<PriceCache>,
    provider: Arc<dyn PriceProvider>,
    status: Arc<StatusBoard>,
    valuation: RwLock<Arc<Valuation>>,
    timeout: Duration,
}

impl UpdateOrchestrator {
    /// Build the orchestrator and value whatever the cache already holds, so
    /// readers have data before the first update finishes.
    pub fn new(
        config: Arc<PortfolioConfig>,
        cache: Arc<PriceCache>,
        provider: Arc<dyn PriceProvider>,
    ) -> Self {
        let valuation = compute_series(&config, &cache);
        tracing::info!(
            "Initial valuation: {} snapshots from {} cached tickers",
            valuation.snapshots.len(),
            cache.len()
        );
        let timeout = Duration::from_secs(config.update.timeout_secs);

        Self {
            config,
            cache,
            provider,
            status: Arc::new(StatusBoard::new()),
            valuation: RwLock::new(Arc::new(valuation)),
            timeout,
        }
    }

    /// Override the watchdog limit for a single update.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config(&self) -> &PortfolioConfig {
        &self.config
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    pub fn status(&self) -> UpdateStatus {
        self.status.current()
    }

    pub fn status_board(&self) -> &StatusBoard {
        &self.status
    }

    pub fn subscribe(&self) -> watch::Receiver<UpdateStatus> {
        self.status.subscribe()
    }

    /// Tickers an update fetches: the universe plus benchmarks.
    pub fn total_tickers(&self) -> usize {
        self.config.all_tickers().len()
    }

    /// Most recently published valuation.
    pub fn valuation(&self) -> Arc<Valuation> {
        let guard = self.valuation.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    fn publish(&self, valuation: Valuation) {
        let mut guard = self.valuation.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(valuation);
    }

    /// Start an update in the background.
    ///
    /// Returns `ConcurrentUpdateRejected` without doing anything when one is
    /// already running. The handle resolves once the update has finished and
    /// its final state is published.
    pub fn trigger_update(self: &Arc<Self>, request: UpdateRequest) -> Result<JoinHandle<()>, PortfolioError> {
        let total = self.total_tickers();
        if !self.status.try_begin(total) {
            return Err(PortfolioError::ConcurrentUpdateRejected);
        }
        tracing::info!(
            "Starting update of {} tickers (force_refresh={})",
            total,
            request.force_refresh
        );

        let this = Arc::clone(self);
        Ok(tokio::spawn(async move { this.supervise(request).await }))
    }

    /// Run the update as its own task under the watchdog. Whatever happens to
    /// it, the state leaves `Running`.
    async fn supervise(self: Arc<Self>, request: UpdateRequest) {
        let work = tokio::spawn(Arc::clone(&self).run_update(request));
        let abort = work.abort_handle();

        match tokio::time::timeout(self.timeout, work).await {
            Ok(Ok(Ok(report))) => {
                tracing::info!(
                    "Update complete: {} updated, {} failed, {} skipped",
                    report.updated_count,
                    report.failed_count,
                    report.skipped_count
                );
                self.status.complete(report);
            }
            Ok(Ok(Err(e))) => {
                tracing::error!("Update failed: {}", e);
                self.status.fail(e.to_string());
            }
            Ok(Err(join_err)) => {
                let reason = if join_err.is_panic() {
                    "update task panicked".to_string()
                } else {
                    format!("update task cancelled: {}", join_err)
                };
                tracing::error!("Update failed: {}", reason);
                self.status.fail(reason);
            }
            Err(_) => {
                abort.abort();
                let reason = format!("update timed out after {}s", self.timeout.as_secs());
                tracing::error!("{}", reason);
                self.status.fail(reason);
            }
        }
    }

    /// Fetch, merge and revalue. Per-ticker data merged before a failure
    /// stays committed.
    pub async fn run_update(self: Arc<Self>, request: UpdateRequest) -> Result<UpdateReport, PortfolioError> {
        if !self.provider.is_configured() {
            return Err(PortfolioError::ProviderUnavailable(
                "market data API key not configured".to_string(),
            ));
        }

        let ctx = PlanContext {
            today: Utc::now().with_timezone(&chrono_tz::America::New_York).date_naive(),
            inception: self.config.inception_date,
            lookback_days: self.config.update.lookback_days,
            force_refresh: request.force_refresh,
        };

        let fetcher = BatchFetcher::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.cache),
            self.config.update.fetch_concurrency,
        );
        let report = fetcher
            .run(self.config.all_tickers(), ctx, Arc::clone(&self.status))
            .await;

        if report.provider_unavailable() {
            let first = report
                .failed
                .first()
                .map(|f| f.reason.clone())
                .unwrap_or_default();
            let message = format!("all {} requests failed ({})", report.attempted, first);
            self.status.record_report(report);
            return Err(PortfolioError::ProviderUnavailable(message));
        }

        self.status.phase(UpdatePhase::Revaluing, "Recomputing portfolio valuation");
        let valuation = compute_series(&self.config, &self.cache);
        tracing::info!(
            "Valuation recomputed: {} snapshots through {:?}",
            valuation.snapshots.len(),
            valuation.latest_date()
        );
        self.publish(valuation);

        Ok(report)
    }
}
