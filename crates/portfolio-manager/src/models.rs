use chrono::NaiveDate;
use portfolio_core::{Benchmark, Coverage, PriceSeries, Side, TickerCoverage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Aggregate portfolio state on one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub date: NaiveDate,
    pub long_value: f64,
    pub short_value: f64,
    pub long_pnl: f64,
    pub short_pnl: f64,
    pub total_value: f64,
    /// Change in total value since the previous snapshot, as a fraction of capital
    pub daily_return: f64,
    pub contributing: usize,
}

/// One position as of the latest valuation date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub side: Side,
    pub inception_price: f64,
    pub baseline_date: NaiveDate,
    pub current_price: f64,
    pub price_date: NaiveDate,
    pub position_size: f64,
    pub return_pct: f64,
    pub current_value: f64,
    pub pnl: f64,
    #[serde(flatten)]
    pub coverage: Coverage,
}

/// A benchmark together with whatever prices the cache holds for it.
#[derive(Debug, Clone)]
pub struct BenchmarkSeries {
    pub benchmark: Benchmark,
    pub prices: Option<Arc<PriceSeries>>,
}

/// Output of one valuation pass over a consistent cache snapshot.
#[derive(Debug, Clone)]
pub struct Valuation {
    pub inception_date: NaiveDate,
    pub initial_capital: f64,
    pub snapshots: Vec<PortfolioSnapshot>,
    pub positions: Vec<Position>,
    pub coverage: Vec<TickerCoverage>,
    pub benchmarks: Vec<BenchmarkSeries>,
}

impl Valuation {
    /// Valuation with no snapshots, used before the first update completes.
    pub fn empty(inception_date: NaiveDate, initial_capital: f64) -> Self {
        Self {
            inception_date,
            initial_capital,
            snapshots: Vec::new(),
            positions: Vec::new(),
            coverage: Vec::new(),
            benchmarks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn latest(&self) -> Option<&PortfolioSnapshot> {
        self.snapshots.last()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.latest().map(|s| s.date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionsView {
    pub long: Vec<Position>,
    pub short: Vec<Position>,
    pub total_positions: usize,
    pub excluded: Vec<TickerCoverage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub symbol: String,
    pub label: String,
    pub available: bool,
    pub return_pct: Option<f64>,
    /// Portfolio return minus benchmark return over the window the benchmark
    /// is priced, in percentage points
    pub alpha_pct: Option<f64>,
    pub beta: Option<f64>,
    pub r_squared: Option<f64>,
    pub tracking_error: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResult {
    pub has_data: bool,
    pub inception_date: NaiveDate,
    pub initial_capital: f64,
    pub latest_date: Option<NaiveDate>,
    pub days_active: usize,
    pub current_value: f64,
    pub total_return_pct: f64,
    pub total_pnl: f64,
    pub long_value: f64,
    pub short_value: f64,
    pub long_pnl: f64,
    pub short_pnl: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub volatility: f64,
    pub best_positions: Vec<Position>,
    pub worst_positions: Vec<Position>,
    pub benchmarks: Vec<BenchmarkComparison>,
    pub full_tickers: usize,
    pub partial_tickers: usize,
    pub missing_tickers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkChartSeries {
    pub symbol: String,
    pub label: String,
    /// Cumulative return % per chart date; `None` before the benchmark has data
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartData {
    pub has_data: bool,
    pub dates: Vec<NaiveDate>,
    pub portfolio_values: Vec<f64>,
    pub portfolio_returns: Vec<f64>,
    pub daily_returns: Vec<f64>,
    pub drawdown: Vec<f64>,
    pub benchmark_returns: Vec<BenchmarkChartSeries>,
}
