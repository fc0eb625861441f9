/// Pure mathematical utilities for portfolio analytics.
/// Stateless functions over plain value and return slices.

const TRADING_DAYS: f64 = 252.0;

/// Simple returns between consecutive values. Always `values.len() - 1`
/// points; a zero base yields a zero return.
pub fn daily_returns(values: &[f64]) -> Vec<f64> {
    if values.len() < 2 {
        return Vec::new();
    }
    values
        .windows(2)
        .map(|w| if w[0] != 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_std_dev(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let m = mean(xs);
    let variance = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() as f64 - 1.0);
    Some(variance.sqrt())
}

/// Annualized volatility as a fraction. Zero with fewer than two returns.
pub fn annualized_volatility(returns: &[f64]) -> f64 {
    sample_std_dev(returns)
        .map(|sd| sd * TRADING_DAYS.sqrt())
        .unwrap_or(0.0)
}

/// Sharpe ratio: (mean_return - rf_daily) / std * sqrt(252).
/// `None` when there are fewer than two returns or no variance.
pub fn sharpe_ratio(returns: &[f64], rf_annual: f64) -> Option<f64> {
    let std_dev = sample_std_dev(returns)?;
    if std_dev < 1e-12 {
        return None;
    }
    let excess = mean(returns) - rf_annual / TRADING_DAYS;
    Some((excess / std_dev) * TRADING_DAYS.sqrt())
}

/// Deepest fall from a running peak, as a positive fraction (0.15 = 15%
/// below peak). Zero for an empty or never-falling series.
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    values.iter().fold(0.0_f64, |worst, &v| {
        peak = peak.max(v);
        if peak > 0.0 {
            worst.max((peak - v) / peak)
        } else {
            worst
        }
    })
}

/// Percent below the running peak at every point. Never positive.
pub fn drawdown_series(values: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    values
        .iter()
        .map(|&v| {
            peak = peak.max(v);
            if peak > 0.0 && v < peak {
                (v / peak - 1.0) * 100.0
            } else {
                0.0
            }
        })
        .collect()
}

/// OLS regression: y = alpha + beta * x.
/// Returns (alpha, beta, r_squared), or `None` with fewer than three points.
pub fn ols_regression(y: &[f64], x: &[f64]) -> Option<(f64, f64, f64)> {
    let n = y.len().min(x.len());
    if n < 3 {
        return None;
    }
    let x_mean = mean(&x[..n]);
    let y_mean = mean(&y[..n]);

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    let mut ss_yy = 0.0;
    for (xi, yi) in x[..n].iter().zip(&y[..n]) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        ss_xy += dx * dy;
        ss_xx += dx * dx;
        ss_yy += dy * dy;
    }

    if ss_xx < 1e-15 {
        return Some((y_mean, 0.0, 0.0));
    }

    let beta = ss_xy / ss_xx;
    let alpha = y_mean - beta * x_mean;
    let r_squared = if ss_yy > 1e-15 {
        (ss_xy * ss_xy) / (ss_xx * ss_yy)
    } else {
        0.0
    };

    Some((alpha, beta, r_squared))
}

/// Annualized tracking error: std dev of return differences * sqrt(252).
pub fn tracking_error(portfolio_returns: &[f64], benchmark_returns: &[f64]) -> Option<f64> {
    let diffs: Vec<f64> = portfolio_returns
        .iter()
        .zip(benchmark_returns)
        .map(|(p, b)| p - b)
        .collect();
    sample_std_dev(&diffs).map(|sd| sd * TRADING_DAYS.sqrt())
}
