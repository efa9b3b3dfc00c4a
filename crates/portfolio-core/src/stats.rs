//! Sample statistics shared by the return, risk and tax pipelines.
//!
//! Everything here assumes daily observations; annualization uses
//! [`TRADING_PERIODS_PER_YEAR`].

use statrs::statistics::Statistics;

/// Trading periods per year used for every annualization.
pub const TRADING_PERIODS_PER_YEAR: f64 = 252.0;

/// Arithmetic mean. Returns 0.0 for an empty slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.mean()
}

/// Sample standard deviation (n - 1 denominator).
pub fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    data.std_dev()
}

/// Unbiased sample covariance of two equally long series.
pub fn covariance(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let mx = mean(&x[..n]);
    let my = mean(&y[..n]);
    let ss_xy: f64 = x[..n]
        .iter()
        .zip(&y[..n])
        .map(|(a, b)| (a - mx) * (b - my))
        .sum();
    ss_xy / (n - 1) as f64
}

/// Percentile (0-100 scale) with linear interpolation between order statistics.
pub fn percentile(data: &[f64], pct: f64) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    let mut sorted: Vec<f64> = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Wealth index `W[t] = prod(1 + r[0..=t])` starting from one unit invested.
pub fn cumulative_wealth(returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .scan(1.0_f64, |wealth, r| {
            *wealth *= 1.0 + r;
            Some(*wealth)
        })
        .collect()
}

/// Cumulative simple return series `C[t] = W[t] - 1`.
pub fn cumulative_returns(returns: &[f64]) -> Vec<f64> {
    cumulative_wealth(returns).into_iter().map(|w| w - 1.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std_dev() {
        let data = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&data) - 5.0).abs() < 1e-12);
        // sample variance = 32 / 7
        assert!((std_dev(&data) - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(std_dev(&[1.0]), 0.0);
    }

    #[test]
    fn test_covariance_matches_variance_on_same_series() {
        let data = vec![0.01, -0.02, 0.03, 0.0, 0.015];
        let var = std_dev(&data).powi(2);
        assert!((covariance(&data, &data) - var).abs() < 1e-15);
    }

    #[test]
    fn test_percentile_interpolates_linearly() {
        let data = vec![5.0, 1.0, 4.0, 2.0, 3.0];
        assert!((percentile(&data, 50.0) - 3.0).abs() < 1e-12);
        // rank = 0.05 * 4 = 0.2 -> 1.0 + 0.2 * (2.0 - 1.0)
        assert!((percentile(&data, 5.0) - 1.2).abs() < 1e-12);
        assert_eq!(percentile(&data, 0.0), 1.0);
        assert_eq!(percentile(&data, 100.0), 5.0);
    }

    #[test]
    fn test_cumulative_returns() {
        let cum = cumulative_returns(&[0.1, 0.1]);
        assert!((cum[0] - 0.1).abs() < 1e-12);
        assert!((cum[1] - 0.21).abs() < 1e-12);
    }
}
