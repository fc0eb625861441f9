use chrono::{Duration, NaiveDate};
use portfolio_core::{FetchError, PortfolioError, PriceProvider, PriceSeries};
use price_cache::PriceCache;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;

use crate::status::StatusBoard;

const PROGRESS_EVERY: usize = 20;

/// What to request from the provider for one ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    /// Cache already covers today.
    Skip,
    /// Nothing cached (or forced): pull everything since before inception.
    Backfill { from: NaiveDate, to: NaiveDate },
    /// Re-fetch from the latest cached date so its close can be corrected.
    Delta { from: NaiveDate, to: NaiveDate },
}

#[derive(Debug, Clone, Copy)]
pub struct PlanContext {
    pub today: NaiveDate,
    pub inception: NaiveDate,
    pub lookback_days: i64,
    pub force_refresh: bool,
}

pub fn plan_fetch(last_cached: Option<NaiveDate>, ctx: &PlanContext) -> FetchPlan {
    let backfill = FetchPlan::Backfill {
        from: ctx.inception - Duration::days(ctx.lookback_days),
        to: ctx.today,
    };
    if ctx.force_refresh {
        return backfill;
    }
    match last_cached {
        None => backfill,
        Some(last) if last >= ctx.today => FetchPlan::Skip,
        Some(last) => FetchPlan::Delta { from: last, to: ctx.today },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTicker {
    pub ticker: String,
    pub reason: String,
}

/// Outcome of one fetch batch. `updated + failed + skipped == total`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub total_tickers: usize,
    pub updated_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub updated: Vec<String>,
    pub failed: Vec<FailedTicker>,
    /// Provider requests actually issued
    #[serde(skip)]
    pub attempted: usize,
    /// Requests that failed with a provider-level error
    #[serde(skip)]
    pub outages: usize,
}

impl UpdateReport {
    /// Every request that went out failed because of the provider itself.
    pub fn provider_unavailable(&self) -> bool {
        self.attempted > 0 && self.outages == self.attempted
    }
}

/// Aborts in-flight fetch tasks if the batch itself is cancelled.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

enum TickerOutcome {
    Updated,
    Skipped,
    Failed { reason: String, outage: bool },
}

/// Fans provider requests out over a bounded number of concurrent tasks and
/// commits each ticker to the cache as soon as it arrives.
pub struct BatchFetcher {
    provider: Arc<dyn PriceProvider>,
    cache: Arc<PriceCache>,
    concurrency: usize,
}

impl BatchFetcher {
    pub fn new(provider: Arc<dyn PriceProvider>, cache: Arc<PriceCache>, concurrency: usize) -> Self {
        Self {
            provider,
            cache,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(&self, tickers: Vec<String>, ctx: PlanContext, status: Arc<StatusBoard>) -> UpdateReport {
        let total = tickers.len();
        let completed = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let mut handles = Vec::with_capacity(total);
        let mut guard = AbortOnDrop(Vec::with_capacity(total));

        for ticker in tickers {
            let provider = Arc::clone(&self.provider);
            let cache = Arc::clone(&self.cache);
            let completed = Arc::clone(&completed);
            let semaphore = Arc::clone(&semaphore);
            let status = Arc::clone(&status);
            let task_ticker = ticker.clone();

            let handle = tokio::spawn(async move {
                let ticker = task_ticker;
                let (attempted, outcome) = match semaphore.acquire().await {
                    Ok(_permit) => update_ticker(provider.as_ref(), &cache, &ticker, &ctx).await,
                    Err(e) => (false, TickerOutcome::Failed { reason: e.to_string(), outage: false }),
                };

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                status.progress(done);

                match &outcome {
                    TickerOutcome::Failed { reason, .. } => {
                        tracing::warn!("[{}/{}] {} failed: {}", done, total, ticker, reason);
                    }
                    _ if done % PROGRESS_EVERY == 0 || done == total => {
                        tracing::info!("[{}/{}] tickers processed", done, total);
                    }
                    _ => {}
                }

                (attempted, outcome)
            });

            guard.0.push(handle.abort_handle());
            handles.push((ticker, handle));
        }

        let mut report = UpdateReport { total_tickers: total, ..UpdateReport::default() };

        for (ticker, handle) in handles {
            let (attempted, outcome) = match handle.await {
                Ok(result) => result,
                Err(e) => (
                    false,
                    TickerOutcome::Failed { reason: format!("fetch task aborted: {}", e), outage: false },
                ),
            };

            if attempted {
                report.attempted += 1;
            }
            match outcome {
                TickerOutcome::Updated => {
                    report.updated_count += 1;
                    report.updated.push(ticker);
                }
                TickerOutcome::Skipped => report.skipped_count += 1,
                TickerOutcome::Failed { reason, outage } => {
                    if outage {
                        report.outages += 1;
                    }
                    report.failed_count += 1;
                    report.failed.push(FailedTicker { ticker, reason });
                }
            }
        }

        tracing::info!(
            "Fetch batch done: {} updated, {} failed, {} skipped of {}",
            report.updated_count,
            report.failed_count,
            report.skipped_count,
            total
        );

        report
    }
}

/// Plan, fetch and merge one ticker. The flag says whether a provider
/// request was issued.
async fn update_ticker(
    provider: &dyn PriceProvider,
    cache: &PriceCache,
    ticker: &str,
    ctx: &PlanContext,
) -> (bool, TickerOutcome) {
    let last_cached = cache.last_cached_date(ticker);
    let (from, to) = match plan_fetch(last_cached, ctx) {
        FetchPlan::Skip => return (false, TickerOutcome::Skipped),
        FetchPlan::Backfill { from, to } | FetchPlan::Delta { from, to } => (from, to),
    };

    let series = match provider.fetch_range(ticker, from, to).await {
        Ok(series) => series,
        Err(e) => return (true, failure(ticker, e)),
    };

    (true, merge_fetched(cache, ticker, &series, last_cached.is_some()))
}

fn merge_fetched(cache: &PriceCache, ticker: &str, series: &PriceSeries, had_data: bool) -> TickerOutcome {
    if series.is_empty() {
        return if had_data {
            TickerOutcome::Skipped
        } else {
            failure(ticker, FetchError::NoData)
        };
    }

    match cache.merge(ticker, series) {
        Ok(stats) if stats.changed() => TickerOutcome::Updated,
        Ok(_) => TickerOutcome::Skipped,
        Err(e) => TickerOutcome::Failed { reason: e.to_string(), outage: false },
    }
}

fn failure(ticker: &str, source: FetchError) -> TickerOutcome {
    let outage = source.is_provider_outage();
    let err = PortfolioError::TickerFetchFailure { ticker: ticker.to_string(), source };
    TickerOutcome::Failed { reason: err.to_string(), outage }
}
