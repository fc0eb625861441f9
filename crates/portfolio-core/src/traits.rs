use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{FetchError, PriceSeries};

/// Source of daily adjusted closes.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Fetch closes for `ticker` between `from` and `to`, both inclusive.
    /// Non-trading days are simply absent from the returned series.
    async fn fetch_range(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<PriceSeries, FetchError>;

    /// False when the provider cannot make any request (e.g. no credential).
    fn is_configured(&self) -> bool {
        true
    }
}
