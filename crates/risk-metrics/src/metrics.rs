//! Pure risk statistics over a daily return series.
//! Stateless functions, annualized with 252 trading periods per year.

use portfolio_core::{stats, PortfolioError, TRADING_PERIODS_PER_YEAR};

/// Default annual risk-free rate for the Sharpe ratio.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;
/// Default confidence level for historical VaR.
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;
/// Annualized volatility at or below this is treated as zero.
pub const ZERO_VOLATILITY: f64 = 1e-12;

fn require_observations(returns: &[f64]) -> Result<(), PortfolioError> {
    if returns.len() < 2 {
        return Err(PortfolioError::InsufficientData(format!(
            "risk metrics need at least 2 returns, got {}",
            returns.len()
        )));
    }
    Ok(())
}

/// Annualized volatility: sample std * sqrt(252).
pub fn volatility(returns: &[f64]) -> Result<f64, PortfolioError> {
    require_observations(returns)?;
    Ok(stats::std_dev(returns) * TRADING_PERIODS_PER_YEAR.sqrt())
}

/// Sharpe ratio: (mean * 252 - rf_annual) / annualized volatility.
///
/// Returns `Ok(None)` when volatility is zero: the risk-adjusted return of a
/// riskless series is undefined rather than infinite.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> Result<Option<f64>, PortfolioError> {
    let vol = volatility(returns)?;
    if vol <= ZERO_VOLATILITY {
        return Ok(None);
    }
    let annual_return = stats::mean(returns) * TRADING_PERIODS_PER_YEAR;
    Ok(Some((annual_return - risk_free_rate) / vol))
}

/// Most negative drawdown of the wealth index against its running peak.
/// Returns a value in [-1, 0]; 0 when wealth never falls below a prior peak.
pub fn max_drawdown(returns: &[f64]) -> Result<f64, PortfolioError> {
    require_observations(returns)?;
    let wealth = stats::cumulative_wealth(returns);

    let mut peak = wealth[0];
    let mut max_dd = 0.0_f64;
    for &w in &wealth {
        if w > peak {
            peak = w;
        }
        if peak > 0.0 {
            let dd = (w - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    Ok(max_dd)
}

/// Historical VaR: the `(1 - confidence) * 100`-th percentile of returns,
/// linearly interpolated. Reported as a return (negative for a loss).
pub fn value_at_risk(returns: &[f64], confidence_level: f64) -> Result<f64, PortfolioError> {
    require_observations(returns)?;
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(PortfolioError::Configuration(format!(
            "confidence level must be in (0, 1), got {}",
            confidence_level
        )));
    }
    Ok(stats::percentile(returns, (1.0 - confidence_level) * 100.0))
}
