use chrono::{DateTime, Days, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use portfolio_core::PortfolioError;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::{UpdateOrchestrator, UpdateRequest};

/// Next occurrence of `at` (wall-clock time in `tz`) strictly after `now`.
///
/// A time skipped by a DST jump resolves to the first instant after the gap;
/// a repeated time resolves to its earlier occurrence.
pub fn next_scheduled_update(now: DateTime<Utc>, at: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let local_today = now.with_timezone(&tz).date_naive();

    for offset in 0..=2u64 {
        let Some(day) = local_today.checked_add_days(Days::new(offset)) else {
            break;
        };
        let naive = day.and_time(at);
        let candidate = tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(naive + chrono::Duration::hours(1))).earliest());

        if let Some(candidate) = candidate {
            let candidate = candidate.with_timezone(&Utc);
            if candidate > now {
                return candidate;
            }
        }
    }

    // Only reachable for dates at the edge of chrono's range
    now + chrono::Duration::days(1)
}

/// Trigger an update every day at the configured time until aborted.
pub fn spawn_scheduler(orchestrator: Arc<UpdateOrchestrator>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let update = orchestrator.config().update.clone();
        loop {
            let now = Utc::now();
            let next = next_scheduled_update(now, update.update_time, update.timezone);
            orchestrator.status_board().set_next_scheduled(next);
            tracing::info!(
                "Next scheduled update at {} ({})",
                next.with_timezone(&update.timezone).format("%Y-%m-%d %H:%M %Z"),
                next
            );

            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            match orchestrator.trigger_update(UpdateRequest::default()) {
                Ok(_) => tracing::info!("Scheduled update started"),
                Err(PortfolioError::ConcurrentUpdateRejected) => {
                    tracing::warn!("Scheduled update skipped: an update is already running");
                }
                Err(e) => tracing::warn!("Scheduled update could not start: {}", e),
            }
        }
    })
}
