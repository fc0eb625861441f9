use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Basket a ticker belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Signed return for a price relative `current / inception`.
    /// Shorts gain when the price falls.
    pub fn signed_return(self, relative: f64) -> f64 {
        match self {
            Side::Long => relative - 1.0,
            Side::Short => 1.0 - relative,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "Long"),
            Side::Short => write!(f, "Short"),
        }
    }
}

/// Daily adjusted closes for one ticker, ordered by date.
///
/// Missing days are absent keys; nothing is ever zero-filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceSeries(BTreeMap<NaiveDate, f64>);

impl PriceSeries {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, date: NaiveDate, price: f64) -> Option<f64> {
        self.0.insert(date, price)
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.0.get(&date).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<(NaiveDate, f64)> {
        self.0.iter().next().map(|(d, p)| (*d, *p))
    }

    pub fn last(&self) -> Option<(NaiveDate, f64)> {
        self.0.iter().next_back().map(|(d, p)| (*d, *p))
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.0.keys().next_back().copied()
    }

    /// Most recent observation at or before `date` (carry-forward lookup).
    pub fn on_or_before(&self, date: NaiveDate) -> Option<(NaiveDate, f64)> {
        self.0.range(..=date).next_back().map(|(d, p)| (*d, *p))
    }

    /// Observations dated `from` or later.
    pub fn since(&self, from: NaiveDate) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.0.range(from..).map(|(d, p)| (*d, *p))
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.0.iter().map(|(d, p)| (*d, *p))
    }

    /// Drop observations that can't be a real close.
    pub fn retain_valid(&mut self) -> usize {
        let before = self.0.len();
        self.0.retain(|_, p| p.is_finite() && *p > 0.0);
        before - self.0.len()
    }
}

impl FromIterator<(NaiveDate, f64)> for PriceSeries {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// How much of the valuation span a ticker's price history covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Coverage {
    /// Priced on or before inception.
    Full,
    /// History starts after inception; contributes from `first_date` on.
    Partial { first_date: NaiveDate },
    /// Nothing cached; contributes zero.
    Missing,
}

impl Coverage {
    pub fn contributes_on(&self, date: NaiveDate) -> bool {
        match self {
            Coverage::Full => true,
            Coverage::Partial { first_date } => date >= *first_date,
            Coverage::Missing => false,
        }
    }
}

/// Coverage record for one ticker of the universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerCoverage {
    pub ticker: String,
    pub side: Side,
    #[serde(flatten)]
    pub coverage: Coverage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Index or ETF the portfolio is compared against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Benchmark {
    pub symbol: String,
    pub label: String,
}
