use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortfolioError {
    #[error("Fetch failed for {ticker}: {source}")]
    TickerFetchFailure {
        ticker: String,
        #[source]
        source: FetchError,
    },

    #[error("No price on or after inception for {0}")]
    TickerDataAbsent(String),

    #[error("Market data provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Price cache corrupt: {0}")]
    CacheCorrupt(String),

    #[error("An update is already running")]
    ConcurrentUpdateRejected,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single provider request. Always scoped to one ticker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("no data returned")]
    NoData,

    #[error("rate limited after {0} retries")]
    RateLimited(u32),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("market data API key not configured")]
    MissingCredential,
}

impl FetchError {
    /// True when the failure says something about the provider as a whole
    /// rather than about the requested ticker.
    pub fn is_provider_outage(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::Timeout | FetchError::MissingCredential => true,
            FetchError::Http { status, .. } => *status >= 500 || *status == 401 || *status == 403,
            FetchError::NoData | FetchError::RateLimited(_) | FetchError::Decode(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outage_classification() {
        assert!(FetchError::Timeout.is_provider_outage());
        assert!(FetchError::Transport("connection refused".into()).is_provider_outage());
        assert!(FetchError::Http { status: 503, body: String::new() }.is_provider_outage());
        assert!(FetchError::Http { status: 401, body: String::new() }.is_provider_outage());
        assert!(!FetchError::Http { status: 404, body: String::new() }.is_provider_outage());
        assert!(!FetchError::NoData.is_provider_outage());
        assert!(!FetchError::RateLimited(3).is_provider_outage());
    }

    #[test]
    fn test_fetch_failure_message_names_ticker() {
        let err = PortfolioError::TickerFetchFailure {
            ticker: "AAA".into(),
            source: FetchError::NoData,
        };
        assert_eq!(err.to_string(), "Fetch failed for AAA: no data returned");
    }
}
