use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::watch;

use crate::fetcher::UpdateReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    Idle,
    Running,
    Completed,
    Failed,
}

impl UpdateState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => UpdateState::Running,
            2 => UpdateState::Completed,
            3 => UpdateState::Failed,
            _ => UpdateState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            UpdateState::Idle => 0,
            UpdateState::Running => 1,
            UpdateState::Completed => 2,
            UpdateState::Failed => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePhase {
    Fetching,
    Revaluing,
}

/// Snapshot of the orchestrator's progress, as served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateStatus {
    pub state: UpdateState,
    pub running: bool,
    pub message: String,
    pub error: Option<String>,
    pub phase: Option<UpdatePhase>,
    pub started_at: Option<DateTime<Utc>>,
    pub processed: usize,
    pub total: usize,
    pub last_update_time: Option<DateTime<Utc>>,
    pub next_scheduled_update: Option<DateTime<Utc>>,
    pub last_report: Option<UpdateReport>,
}

impl Default for UpdateStatus {
    fn default() -> Self {
        Self {
            state: UpdateState::Idle,
            running: false,
            message: "Idle".to_string(),
            error: None,
            phase: None,
            started_at: None,
            processed: 0,
            total: 0,
            last_update_time: None,
            next_scheduled_update: None,
            last_report: None,
        }
    }
}

/// Update state machine plus the watch channel its status is published on.
///
/// `state` is the single source of truth for "is an update running"; the
/// published `UpdateStatus` mirrors it for readers.
pub struct StatusBoard {
    state: AtomicU8,
    tx: watch::Sender<UpdateStatus>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(UpdateStatus::default());
        Self {
            state: AtomicU8::new(UpdateState::Idle.as_u8()),
            tx,
        }
    }

    pub fn state(&self) -> UpdateState {
        UpdateState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn current(&self) -> UpdateStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UpdateStatus> {
        self.tx.subscribe()
    }

    /// Move to `Running` from any other state. Returns false if an update is
    /// already running.
    pub fn try_begin(&self, total: usize) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if UpdateState::from_u8(current) == UpdateState::Running {
                return false;
            }
            match self.state.compare_exchange(
                current,
                UpdateState::Running.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        self.tx.send_modify(|s| {
            s.state = UpdateState::Running;
            s.running = true;
            s.message = format!("Updating {} tickers", total);
            s.error = None;
            s.phase = Some(UpdatePhase::Fetching);
            s.started_at = Some(Utc::now());
            s.processed = 0;
            s.total = total;
        });
        true
    }

    pub fn progress(&self, processed: usize) {
        self.tx.send_modify(|s| {
            s.processed = processed;
            s.message = format!("Fetched {}/{} tickers", processed, s.total);
        });
    }

    pub fn phase(&self, phase: UpdatePhase, message: &str) {
        self.tx.send_modify(|s| {
            s.phase = Some(phase);
            s.message = message.to_string();
        });
    }

    pub fn record_report(&self, report: UpdateReport) {
        self.tx.send_modify(|s| s.last_report = Some(report));
    }

    pub fn complete(&self, report: UpdateReport) {
        self.tx.send_modify(|s| {
            s.state = UpdateState::Completed;
            s.running = false;
            s.phase = None;
            s.error = None;
            s.message = format!(
                "Updated {} tickers ({} failed, {} skipped)",
                report.updated_count, report.failed_count, report.skipped_count
            );
            s.last_update_time = Some(Utc::now());
            s.last_report = Some(report);
        });
        self.state.store(UpdateState::Completed.as_u8(), Ordering::Release);
    }

    pub fn fail(&self, error: String) {
        self.tx.send_modify(|s| {
            s.state = UpdateState::Failed;
            s.running = false;
            s.phase = None;
            s.message = "Update failed".to_string();
            s.error = Some(error);
        });
        self.state.store(UpdateState::Failed.as_u8(), Ordering::Release);
    }

    pub fn set_next_scheduled(&self, at: DateTime<Utc>) {
        self.tx.send_modify(|s| s.next_scheduled_update = Some(at));
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}
