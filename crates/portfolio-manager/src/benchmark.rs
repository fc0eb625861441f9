use crate::models::*;
use crate::shared_math;

pub struct BenchmarkComparer;

impl BenchmarkComparer {
    /// Compare portfolio performance against one benchmark over the
    /// snapshot date range.
    ///
    /// The benchmark is priced at each snapshot date by carrying its last
    /// close forward. Both returns are measured from the first snapshot date
    /// the benchmark has a price for, so a benchmark whose history starts
    /// after inception is compared over its own window only.
    pub fn compare(snapshots: &[PortfolioSnapshot], series: &BenchmarkSeries) -> BenchmarkComparison {
        let mut result = BenchmarkComparison {
            symbol: series.benchmark.symbol.clone(),
            label: series.benchmark.label.clone(),
            available: false,
            return_pct: None,
            alpha_pct: None,
            beta: None,
            r_squared: None,
            tracking_error: None,
        };

        let aligned = aligned_prices(snapshots, series);
        let Some(base_idx) = aligned.iter().position(Option::is_some) else {
            return result;
        };
        let (Some(base), Some(Some(last))) = (aligned[base_idx], aligned.last()) else {
            return result;
        };
        let Some(portfolio_last) = snapshots.last() else {
            return result;
        };
        let portfolio_base = snapshots[base_idx].total_value;
        if portfolio_base <= 0.0 {
            return result;
        }

        let bench_total = (last / base - 1.0) * 100.0;
        let port_total = (portfolio_last.total_value / portfolio_base - 1.0) * 100.0;

        result.available = true;
        result.return_pct = Some(bench_total);
        result.alpha_pct = Some(port_total - bench_total);

        // Daily returns on the dates where both series are priced
        let mut pr = Vec::new();
        let mut br = Vec::new();
        for i in 1..snapshots.len() {
            if let (Some(b0), Some(b1)) = (aligned[i - 1], aligned[i]) {
                let v0 = snapshots[i - 1].total_value;
                if v0 != 0.0 {
                    pr.push((snapshots[i].total_value - v0) / v0);
                    br.push((b1 - b0) / b0);
                }
            }
        }

        // OLS regression: portfolio_return = alpha + beta * benchmark_return
        if let Some((_, beta, r_squared)) = shared_math::ols_regression(&pr, &br) {
            result.beta = Some(beta);
            result.r_squared = Some(r_squared);
        }
        // Annualized, in percent like volatility
        result.tracking_error = shared_math::tracking_error(&pr, &br).map(|te| te * 100.0);

        result
    }

    /// Cumulative benchmark return % at each snapshot date, `None` until the
    /// benchmark has a price.
    pub fn cumulative_returns(
        snapshots: &[PortfolioSnapshot],
        series: &BenchmarkSeries,
    ) -> BenchmarkChartSeries {
        let aligned = aligned_prices(snapshots, series);
        let base = aligned.iter().flatten().next().copied();
        BenchmarkChartSeries {
            symbol: series.benchmark.symbol.clone(),
            label: series.benchmark.label.clone(),
            values: aligned
                .iter()
                .map(|p| match (p, base) {
                    (Some(p), Some(base)) => Some((p / base - 1.0) * 100.0),
                    _ => None,
                })
                .collect(),
        }
    }
}

fn aligned_prices(snapshots: &[PortfolioSnapshot], series: &BenchmarkSeries) -> Vec<Option<f64>> {
    match &series.prices {
        Some(prices) => snapshots
            .iter()
            .map(|s| prices.on_or_before(s.date).map(|(_, p)| p))
            .collect(),
        None => vec![None; snapshots.len()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use portfolio_core::{Benchmark, PriceSeries};
    use std::sync::Arc;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn snapshots(values: &[f64]) -> Vec<PortfolioSnapshot> {
        d("2025-10-28")
            .iter_days()
            .zip(values)
            .map(|(date, v)| PortfolioSnapshot {
                date,
                long_value: 0.0,
                short_value: 0.0,
                long_pnl: 0.0,
                short_pnl: 0.0,
                total_value: *v,
                daily_return: 0.0,
                contributing: 2,
            })
            .collect()
    }

    fn bench(prices: Option<&[(&str, f64)]>) -> BenchmarkSeries {
        BenchmarkSeries {
            benchmark: Benchmark { symbol: "^GSPC".to_string(), label: "S&P 500".to_string() },
            prices: prices.map(|p| Arc::new(p.iter().map(|(day, v)| (d(day), *v)).collect::<PriceSeries>())),
        }
    }

    #[test]
    fn test_benchmark_comparison() {
        let snaps = snapshots(&[100_000.0, 101_000.0, 100_500.0, 102_000.0]);
        let series = bench(Some(&[
            ("2025-10-28", 6000.0),
            ("2025-10-29", 6060.0),
            ("2025-10-30", 6030.0),
            ("2025-10-31", 6120.0),
        ]));

        let result = BenchmarkComparer::compare(&snaps, &series);
        assert!(result.available);
        assert!((result.return_pct.unwrap() - 2.0).abs() < 1e-9);
        assert!(result.alpha_pct.unwrap().abs() < 1e-9);
        assert!(result.beta.is_some());
        assert!(result.tracking_error.unwrap() >= 0.0);
    }

    #[test]
    fn test_absent_benchmark_unavailable() {
        let snaps = snapshots(&[100_000.0, 101_000.0]);
        let result = BenchmarkComparer::compare(&snaps, &bench(None));
        assert!(!result.available);
        assert_eq!(result.return_pct, None);
        assert_eq!(result.alpha_pct, None);
        assert_eq!(result.beta, None);
    }

    #[test]
    fn test_benchmark_carried_over_weekend() {
        // 2025-11-01/02 is a weekend; the index has no closes there
        let snaps = snapshots(&[100_000.0, 100_000.0, 100_000.0, 100_000.0, 100_000.0, 100_000.0, 100_000.0]);
        let series = bench(Some(&[("2025-10-31", 100.0), ("2025-11-03", 110.0)]));

        let chart = BenchmarkComparer::cumulative_returns(&snaps, &series);
        assert!(chart.values[..3].iter().all(Option::is_none));
        assert_eq!(chart.values[3], Some(0.0));
        assert_eq!(chart.values[5], Some(0.0));
        assert!((chart.values[6].unwrap() - 10.0).abs() < 1e-9);

        let result = BenchmarkComparer::compare(&snaps, &series);
        assert!((result.return_pct.unwrap() - 10.0).abs() < 1e-9);
        assert!((result.alpha_pct.unwrap() + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_late_benchmark_compared_over_its_own_window() {
        // The portfolio gains 0.1% on day two, then stays flat while the
        // index, priced only from day three, is flat too
        let snaps = snapshots(&[100_000.0, 100_100.0, 100_100.0, 100_100.0]);
        let series = bench(Some(&[("2025-10-30", 6000.0), ("2025-10-31", 6000.0)]));

        let result = BenchmarkComparer::compare(&snaps, &series);
        assert!(result.available);
        assert_eq!(result.return_pct, Some(0.0));
        assert!(result.alpha_pct.unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_empty_snapshots() {
        let series = bench(Some(&[("2025-10-28", 6000.0)]));
        let result = BenchmarkComparer::compare(&[], &series);
        assert!(!result.available);
    }
}
