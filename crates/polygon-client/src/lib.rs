use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use portfolio_core::{FetchError, PriceProvider, PriceSeries, ProviderConfig};
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Remove timestamps outside the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait until the oldest request falls out of the window
            let sleep_dur = match ts.front() {
                Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
                None => Duration::ZERO,
            } + Duration::from_millis(50);
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for market data slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Client for the Polygon-compatible daily aggregates API (Polygon / Massive).
#[derive(Clone)]
pub struct PolygonClient {
    api_key: Option<String>,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
    max_retries: u32,
    retry_wait: Duration,
}

impl PolygonClient {
    pub fn new(config: &ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            rate_limiter: RateLimiter::new(config.rate_limit_per_minute, Duration::from_secs(60)),
            max_retries: 3,
            retry_wait: Duration::from_secs(15),
        }
    }

    /// Override how long to back off after a 429.
    pub fn with_retry_wait(mut self, wait: Duration) -> Self {
        self.retry_wait = wait;
        self
    }

    /// Map index symbols to the provider's notation.
    pub fn provider_symbol(ticker: &str) -> &str {
        match ticker {
            "^GSPC" => "I:SPX",
            "^RUA" => "I:RUA",
            other => other,
        }
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, FetchError> {
        let request = builder.build().map_err(|e| FetchError::Transport(e.to_string()))?;

        for attempt in 0..self.max_retries {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| FetchError::Transport("Cannot clone request".to_string()))?;
            let response = self.client.execute(req_clone).await.map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Transport(e.to_string())
                }
            })?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            tracing::warn!(
                "Market data 429 rate limited, waiting {}s before retry {}/{}",
                self.retry_wait.as_secs(),
                attempt + 1,
                self.max_retries
            );
            tokio::time::sleep(self.retry_wait).await;
        }

        Err(FetchError::RateLimited(self.max_retries))
    }

    /// Daily adjusted closes for `ticker` between `from` and `to` inclusive.
    pub async fn get_daily_closes(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<PriceSeries, FetchError> {
        let api_key = self.api_key.as_deref().ok_or(FetchError::MissingCredential)?;

        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.base_url,
            Self::provider_symbol(ticker),
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", "50000"),
                ("apiKey", api_key),
            ]))
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let agg_response: AggregateResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        // Free tier answers DELAYED instead of OK
        match agg_response.status.as_deref() {
            None | Some("OK") | Some("DELAYED") => {}
            Some(other) => {
                return Err(FetchError::Decode(format!("provider status {}", other)));
            }
        }

        let mut series = PriceSeries::new();
        for bar in agg_response.results {
            let Some(ts) = DateTime::from_timestamp_millis(bar.t) else {
                tracing::debug!("Skipping {} bar with invalid timestamp {}", ticker, bar.t);
                continue;
            };
            let date = ts.with_timezone(&chrono_tz::America::New_York).date_naive();
            series.insert(date, bar.c);
        }
        series.retain_valid();

        Ok(series)
    }
}

#[async_trait]
impl PriceProvider for PolygonClient {
    async fn fetch_range(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<PriceSeries, FetchError> {
        self.get_daily_closes(ticker, from, to).await
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

// Response structures
#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp (ms)
    c: f64, // close
}
