use crate::benchmark::BenchmarkComparer;
use crate::models::*;
use crate::shared_math;
use portfolio_core::Coverage;
use std::cmp::Ordering;

const TOP_N: usize = 5;

/// Summary statistics for a valuation. Always well-formed: an empty
/// valuation reports `has_data: false` with zero values.
pub fn compute_metrics(valuation: &Valuation, benchmarks: &[BenchmarkSeries]) -> MetricsResult {
    let capital = valuation.initial_capital;
    let values: Vec<f64> = valuation.snapshots.iter().map(|s| s.total_value).collect();
    let returns = shared_math::daily_returns(&values);
    let max_dd = shared_math::max_drawdown(&values);

    let (full_tickers, partial_tickers, missing_tickers) =
        valuation
            .coverage
            .iter()
            .fold((0, 0, 0), |(full, partial, missing), c| match c.coverage {
                Coverage::Full => (full + 1, partial, missing),
                Coverage::Partial { .. } => (full, partial + 1, missing),
                Coverage::Missing => (full, partial, missing + 1),
            });

    let latest = valuation.latest();
    let current_value = latest.map(|s| s.total_value).unwrap_or(capital);
    let total_return_pct = if capital > 0.0 {
        (current_value / capital - 1.0) * 100.0
    } else {
        0.0
    };

    MetricsResult {
        has_data: latest.is_some(),
        inception_date: valuation.inception_date,
        initial_capital: capital,
        latest_date: latest.map(|s| s.date),
        days_active: valuation.snapshots.len(),
        current_value,
        total_return_pct,
        total_pnl: current_value - capital,
        long_value: latest.map(|s| s.long_value).unwrap_or(0.0),
        short_value: latest.map(|s| s.short_value).unwrap_or(0.0),
        long_pnl: latest.map(|s| s.long_pnl).unwrap_or(0.0),
        short_pnl: latest.map(|s| s.short_pnl).unwrap_or(0.0),
        sharpe_ratio: shared_math::sharpe_ratio(&returns, 0.0).unwrap_or(0.0),
        max_drawdown: if max_dd > 0.0 { -max_dd * 100.0 } else { 0.0 },
        volatility: shared_math::annualized_volatility(&returns) * 100.0,
        best_positions: ranked(&valuation.positions, |a, b| b.pnl.total_cmp(&a.pnl)),
        worst_positions: ranked(&valuation.positions, |a, b| a.pnl.total_cmp(&b.pnl)),
        benchmarks: benchmarks
            .iter()
            .map(|b| BenchmarkComparer::compare(&valuation.snapshots, b))
            .collect(),
        full_tickers,
        partial_tickers,
        missing_tickers,
    }
}

fn ranked(positions: &[Position], by: impl Fn(&Position, &Position) -> Ordering) -> Vec<Position> {
    let mut sorted: Vec<&Position> = positions.iter().collect();
    sorted.sort_by(|a, b| by(*a, *b).then_with(|| a.ticker.cmp(&b.ticker)));
    sorted.into_iter().take(TOP_N).cloned().collect()
}

/// Per-date series for the dashboard charts.
pub fn chart_data(valuation: &Valuation, benchmarks: &[BenchmarkSeries]) -> ChartData {
    let capital = valuation.initial_capital;
    let values: Vec<f64> = valuation.snapshots.iter().map(|s| s.total_value).collect();

    ChartData {
        has_data: !values.is_empty(),
        dates: valuation.snapshots.iter().map(|s| s.date).collect(),
        portfolio_returns: values
            .iter()
            .map(|v| if capital > 0.0 { (v / capital - 1.0) * 100.0 } else { 0.0 })
            .collect(),
        daily_returns: shared_math::daily_returns(&values)
            .into_iter()
            .map(|r| r * 100.0)
            .collect(),
        drawdown: shared_math::drawdown_series(&values),
        benchmark_returns: benchmarks
            .iter()
            .map(|b| BenchmarkComparer::cumulative_returns(&valuation.snapshots, b))
            .collect(),
        portfolio_values: values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::value_prices;
    use chrono::NaiveDate;
    use portfolio_core::{PortfolioConfig, PriceSeries, Universe};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn valuation(entries: Vec<(&str, Vec<(&str, f64)>)>, long: &[&str], short: &[&str]) -> Valuation {
        let config = PortfolioConfig {
            universe: Universe::new(
                long.iter().map(|s| s.to_string()).collect(),
                short.iter().map(|s| s.to_string()).collect(),
            )
            .unwrap(),
            inception_date: d("2025-10-28"),
            ..PortfolioConfig::default()
        };
        let prices: HashMap<String, Arc<PriceSeries>> = entries
            .into_iter()
            .map(|(t, pts)| {
                let series: PriceSeries = pts.iter().map(|(day, p)| (d(day), *p)).collect();
                (t.to_string(), Arc::new(series))
            })
            .collect();
        value_prices(&config, &prices)
    }

    #[test]
    fn test_scenario_metrics() {
        let v = valuation(
            vec![
                ("AAA", vec![("2025-10-28", 100.0), ("2025-10-29", 110.0)]),
                ("BBB", vec![("2025-10-28", 50.0), ("2025-10-29", 45.0)]),
            ],
            &["AAA"],
            &["BBB"],
        );
        let m = compute_metrics(&v, &v.benchmarks);

        assert!(m.has_data);
        assert_eq!(m.days_active, 2);
        assert_eq!(m.latest_date, Some(d("2025-10-29")));
        assert!((m.current_value - 100_200.0).abs() < 1e-9);
        assert!((m.total_pnl - 200.0).abs() < 1e-9);
        assert!((m.total_return_pct - 0.2).abs() < 1e-9);
        assert!((m.long_pnl - 100.0).abs() < 1e-9);
        assert!((m.short_pnl - 100.0).abs() < 1e-9);
        // One daily return: no sample variance yet
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.volatility, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.full_tickers, 2);
    }

    #[test]
    fn test_single_point_series() {
        let v = valuation(
            vec![("AAA", vec![("2025-10-28", 100.0)]), ("BBB", vec![("2025-10-28", 50.0)])],
            &["AAA"],
            &["BBB"],
        );
        let m = compute_metrics(&v, &v.benchmarks);
        assert_eq!(m.days_active, 1);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.volatility, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.current_value, 100_000.0);
    }

    #[test]
    fn test_drawdown_and_volatility_signs() {
        let v = valuation(
            vec![
                ("AAA", vec![("2025-10-28", 100.0), ("2025-10-29", 120.0), ("2025-10-30", 90.0), ("2025-10-31", 95.0)]),
                ("BBB", vec![("2025-10-28", 50.0)]),
            ],
            &["AAA"],
            &["BBB"],
        );
        let m = compute_metrics(&v, &v.benchmarks);
        assert!(m.max_drawdown < 0.0);
        assert!(m.volatility > 0.0);

        let chart = chart_data(&v, &v.benchmarks);
        assert_eq!(chart.dates.len(), 4);
        assert_eq!(chart.daily_returns.len(), 3);
        assert!(chart.drawdown.iter().all(|dd| *dd <= 0.0));
        let worst_dd = chart.drawdown.iter().cloned().fold(0.0, f64::min);
        assert!((worst_dd - m.max_drawdown).abs() < 1e-9);
    }

    #[test]
    fn test_best_worst_ties_by_ticker() {
        let flat = vec![("2025-10-28", 10.0), ("2025-10-29", 10.0)];
        let v = valuation(
            vec![
                ("AAA", flat.clone()),
                ("BBB", flat.clone()),
                ("CCC", flat.clone()),
                ("DDD", flat.clone()),
                ("EEE", flat.clone()),
                ("FFF", flat),
                ("UP", vec![("2025-10-28", 10.0), ("2025-10-29", 12.0)]),
                ("SHRT", vec![("2025-10-28", 10.0), ("2025-10-29", 11.0)]),
            ],
            &["AAA", "BBB", "CCC", "DDD", "EEE", "FFF", "UP"],
            &["SHRT"],
        );
        let m = compute_metrics(&v, &v.benchmarks);

        let best: Vec<&str> = m.best_positions.iter().map(|p| p.ticker.as_str()).collect();
        assert_eq!(best, vec!["UP", "AAA", "BBB", "CCC", "DDD"]);
        let worst: Vec<&str> = m.worst_positions.iter().map(|p| p.ticker.as_str()).collect();
        assert_eq!(worst, vec!["SHRT", "AAA", "BBB", "CCC", "DDD"]);
    }

    #[test]
    fn test_missing_benchmark_reported_unavailable() {
        let v = valuation(
            vec![("AAA", vec![("2025-10-28", 100.0)]), ("BBB", vec![("2025-10-28", 50.0)])],
            &["AAA"],
            &["BBB"],
        );
        let m = compute_metrics(&v, &v.benchmarks);
        assert_eq!(m.benchmarks.len(), 2);
        assert!(m.benchmarks.iter().all(|b| !b.available && b.return_pct.is_none()));

        let json = serde_json::to_value(&m).unwrap();
        assert!(json["benchmarks"][0]["alpha_pct"].is_null());
    }

    #[test]
    fn test_benchmark_alpha() {
        let v = valuation(
            vec![
                ("AAA", vec![("2025-10-28", 100.0), ("2025-10-29", 110.0)]),
                ("BBB", vec![("2025-10-28", 50.0), ("2025-10-29", 45.0)]),
                ("^GSPC", vec![("2025-10-28", 6000.0), ("2025-10-29", 6006.0)]),
            ],
            &["AAA"],
            &["BBB"],
        );
        let m = compute_metrics(&v, &v.benchmarks);
        let spx = m.benchmarks.iter().find(|b| b.symbol == "^GSPC").unwrap();
        assert!(spx.available);
        assert!((spx.return_pct.unwrap() - 0.1).abs() < 1e-9);
        assert!((spx.alpha_pct.unwrap() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_alpha_uses_benchmark_window_when_index_starts_late() {
        let v = valuation(
            vec![
                ("AAA", vec![("2025-10-28", 100.0), ("2025-10-29", 110.0), ("2025-10-31", 110.0)]),
                ("BBB", vec![("2025-10-28", 50.0), ("2025-10-31", 50.0)]),
                ("^GSPC", vec![("2025-10-30", 6000.0), ("2025-10-31", 6000.0)]),
            ],
            &["AAA"],
            &["BBB"],
        );
        let m = compute_metrics(&v, &v.benchmarks);
        assert!((m.total_return_pct - 0.1).abs() < 1e-9);

        let spx = m.benchmarks.iter().find(|b| b.symbol == "^GSPC").unwrap();
        assert_eq!(spx.return_pct, Some(0.0));
        assert!(spx.alpha_pct.unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_empty_valuation_is_well_formed() {
        let v = Valuation::empty(d("2025-10-28"), 100_000.0);
        let m = compute_metrics(&v, &[]);
        assert!(!m.has_data);
        assert_eq!(m.days_active, 0);
        assert_eq!(m.current_value, 100_000.0);
        assert_eq!(m.latest_date, None);

        let chart = chart_data(&v, &[]);
        assert!(!chart.has_data);
        assert!(chart.dates.is_empty());
        assert!(chart.daily_returns.is_empty());
    }
}
