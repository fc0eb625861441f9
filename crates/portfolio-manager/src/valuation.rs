use crate::models::*;
use chrono::NaiveDate;
use portfolio_core::{
    Coverage, PortfolioConfig, PortfolioError, PriceSeries, Side, TickerCoverage,
};
use price_cache::PriceCache;
use std::collections::HashMap;
use std::sync::Arc;

/// A ticker that takes part in the valuation, with its frozen baseline.
struct Contributor<'a> {
    ticker: &'a str,
    side: Side,
    series: &'a PriceSeries,
    coverage: Coverage,
    baseline_date: NaiveDate,
    baseline_price: f64,
}

impl Contributor<'_> {
    /// (value, pnl) of the position at `price`.
    fn mark(&self, slice: f64, price: f64) -> (f64, f64) {
        let pnl = slice * self.side.signed_return(price / self.baseline_price);
        (slice + pnl, pnl)
    }
}

/// Baseline for a ticker: the last close on or before inception, or failing
/// that the first close after it.
pub fn baseline(
    ticker: &str,
    series: &PriceSeries,
    inception: NaiveDate,
) -> Result<(Coverage, NaiveDate, f64), PortfolioError> {
    if let Some((date, price)) = series.on_or_before(inception) {
        return Ok((Coverage::Full, date, price));
    }
    match series.since(inception).next() {
        Some((first_date, price)) => Ok((Coverage::Partial { first_date }, first_date, price)),
        None => Err(PortfolioError::TickerDataAbsent(ticker.to_string())),
    }
}

/// Value the configured portfolio against the current cache contents.
pub fn compute_series(config: &PortfolioConfig, cache: &PriceCache) -> Valuation {
    value_prices(config, &cache.snapshot())
}

/// Value the configured portfolio against a fixed set of price series.
///
/// The span runs over every calendar date from inception to the newest close
/// of any universe ticker; each ticker's last known close is carried forward
/// over days it has no observation.
pub fn value_prices(
    config: &PortfolioConfig,
    prices: &HashMap<String, Arc<PriceSeries>>,
) -> Valuation {
    let inception = config.inception_date;
    let capital = config.initial_capital;
    let slice = config.position_dollars();

    let mut contributors = Vec::new();
    let mut coverage = Vec::new();

    for (ticker, side) in config.universe.members() {
        let Some(series) = prices.get(ticker) else {
            coverage.push(TickerCoverage {
                ticker: ticker.to_string(),
                side,
                coverage: Coverage::Missing,
                reason: Some("no cached prices".to_string()),
            });
            continue;
        };

        match baseline(ticker, series, inception) {
            Ok((cov, baseline_date, baseline_price)) => {
                coverage.push(TickerCoverage {
                    ticker: ticker.to_string(),
                    side,
                    coverage: cov,
                    reason: None,
                });
                contributors.push(Contributor {
                    ticker,
                    side,
                    series: series.as_ref(),
                    coverage: cov,
                    baseline_date,
                    baseline_price,
                });
            }
            Err(e) => coverage.push(TickerCoverage {
                ticker: ticker.to_string(),
                side,
                coverage: Coverage::Missing,
                reason: Some(e.to_string()),
            }),
        }
    }

    let benchmarks = config
        .benchmarks
        .iter()
        .map(|b| BenchmarkSeries {
            benchmark: b.clone(),
            prices: prices.get(&b.symbol).filter(|s| !s.is_empty()).cloned(),
        })
        .collect();

    let Some(end) = contributors.iter().filter_map(|c| c.series.latest_date()).max() else {
        tracing::debug!("No universe ticker has cached prices; valuation is empty");
        return Valuation {
            coverage,
            benchmarks,
            ..Valuation::empty(inception, capital)
        };
    };
    let end = end.max(inception);

    let mut snapshots = Vec::new();
    let mut previous_total = capital;
    for date in inception.iter_days().take_while(|d| *d <= end) {
        let mut snap = PortfolioSnapshot {
            date,
            long_value: 0.0,
            short_value: 0.0,
            long_pnl: 0.0,
            short_pnl: 0.0,
            total_value: capital,
            daily_return: 0.0,
            contributing: 0,
        };

        for c in &contributors {
            if !c.coverage.contributes_on(date) {
                continue;
            }
            let Some((_, price)) = c.series.on_or_before(date) else {
                continue;
            };
            let (value, pnl) = c.mark(slice, price);
            match c.side {
                Side::Long => {
                    snap.long_value += value;
                    snap.long_pnl += pnl;
                }
                Side::Short => {
                    snap.short_value += value;
                    snap.short_pnl += pnl;
                }
            }
            snap.contributing += 1;
        }

        snap.total_value = capital + snap.long_pnl + snap.short_pnl;
        snap.daily_return = (snap.total_value - previous_total) / capital;
        previous_total = snap.total_value;
        snapshots.push(snap);
    }

    let positions = contributors
        .iter()
        .filter_map(|c| {
            let (price_date, current_price) = c.series.on_or_before(end)?;
            let (current_value, pnl) = c.mark(slice, current_price);
            Some(Position {
                ticker: c.ticker.to_string(),
                side: c.side,
                inception_price: c.baseline_price,
                baseline_date: c.baseline_date,
                current_price,
                price_date,
                position_size: slice,
                return_pct: c.side.signed_return(current_price / c.baseline_price) * 100.0,
                current_value,
                pnl,
                coverage: c.coverage,
            })
        })
        .collect();

    Valuation {
        inception_date: inception,
        initial_capital: capital,
        snapshots,
        positions,
        coverage,
        benchmarks,
    }
}

/// Positions split by side, each sorted by P&L descending (ties by ticker),
/// plus the tickers left out for lack of data.
pub fn positions_view(valuation: &Valuation) -> PositionsView {
    let mut long: Vec<Position> = valuation
        .positions
        .iter()
        .filter(|p| p.side == Side::Long)
        .cloned()
        .collect();
    let mut short: Vec<Position> = valuation
        .positions
        .iter()
        .filter(|p| p.side == Side::Short)
        .cloned()
        .collect();

    let by_pnl_desc =
        |a: &Position, b: &Position| b.pnl.total_cmp(&a.pnl).then_with(|| a.ticker.cmp(&b.ticker));
    long.sort_by(by_pnl_desc);
    short.sort_by(by_pnl_desc);

    let excluded = valuation
        .coverage
        .iter()
        .filter(|c| c.coverage == Coverage::Missing)
        .cloned()
        .collect();

    PositionsView {
        total_positions: long.len() + short.len(),
        long,
        short,
        excluded,
    }
}
