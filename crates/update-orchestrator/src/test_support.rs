use async_trait::async_trait;
use chrono::NaiveDate;
use portfolio_core::{FetchError, PriceProvider, PriceSeries};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn series(points: &[(&str, f64)]) -> PriceSeries {
    points.iter().map(|(day, p)| (d(day), *p)).collect()
}

/// In-memory provider answering from a fixed script. Unscripted tickers
/// return `NoData`.
#[derive(Default)]
pub struct ScriptedProvider {
    responses: HashMap<String, Result<PriceSeries, FetchError>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Duration,
    configured: Option<bool>,
    panic_on_check: bool,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ticker: &str, response: Result<PriceSeries, FetchError>) -> Self {
        self.responses.insert(ticker.to_string(), response);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = Some(false);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_check = true;
        self
    }

    pub fn calls(&self, ticker: &str) -> usize {
        self.calls.lock().unwrap().get(ticker).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl PriceProvider for ScriptedProvider {
    async fn fetch_range(
        &self,
        ticker: &str,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<PriceSeries, FetchError> {
        *self.calls.lock().unwrap().entry(ticker.to_string()).or_insert(0) += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.responses
            .get(ticker)
            .cloned()
            .unwrap_or(Err(FetchError::NoData))
    }

    fn is_configured(&self) -> bool {
        if self.panic_on_check {
            panic!("provider check exploded");
        }
        self.configured.unwrap_or(true)
    }
}
