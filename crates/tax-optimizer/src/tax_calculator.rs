//! Tax Calculator
//!
//! Estimates annualized tax liability from mean returns and a tax status.

use portfolio_core::{
    stats, PortfolioError, ReturnTable, TaxEfficiency, TaxStatus, WeightVector,
    TRADING_PERIODS_PER_YEAR,
};
use std::collections::BTreeMap;

/// Capital gains rate for taxable accounts (also the fallback).
const STANDARD_RATE: f64 = 0.15;
/// Tax-advantaged accounts.
const RETIREMENT_RATE: f64 = 0.0;
/// Higher bracket.
const HIGH_INCOME_RATE: f64 = 0.20;

/// Rate for a tax status. Unrecognized labels get the standard rate.
pub fn tax_rate(status: &TaxStatus) -> f64 {
    match status {
        TaxStatus::Standard => STANDARD_RATE,
        TaxStatus::Retirement => RETIREMENT_RATE,
        TaxStatus::HighIncome => HIGH_INCOME_RATE,
        TaxStatus::Other(label) => {
            tracing::debug!("Unrecognized tax status '{}', using standard rate", label);
            STANDARD_RATE
        }
    }
}

/// Liability = mean return * 252 * rate. Lower is better; no clamping, so a
/// losing series yields a negative liability.
pub struct TaxEfficiencyEstimator {
    status: TaxStatus,
}

impl TaxEfficiencyEstimator {
    pub fn new(status: TaxStatus) -> Self {
        Self { status }
    }

    pub fn status(&self) -> &TaxStatus {
        &self.status
    }

    pub fn rate(&self) -> f64 {
        tax_rate(&self.status)
    }

    /// Estimated liability for one return series.
    pub fn estimate(&self, returns: &[f64]) -> Result<f64, PortfolioError> {
        if returns.is_empty() {
            return Err(PortfolioError::InsufficientData(
                "tax estimate needs at least one return".to_string(),
            ));
        }
        let annual_return = stats::mean(returns) * TRADING_PERIODS_PER_YEAR;
        Ok(annual_return * self.rate())
    }

    /// Liability per asset column.
    pub fn estimate_per_asset(
        &self,
        returns: &ReturnTable,
    ) -> Result<BTreeMap<String, f64>, PortfolioError> {
        returns
            .iter_columns()
            .map(|(ticker, column)| Ok((ticker.to_string(), self.estimate(column)?)))
            .collect()
    }

    /// Per-asset liabilities plus the liability of the weighted portfolio.
    pub fn assess(
        &self,
        returns: &ReturnTable,
        weights: &WeightVector,
    ) -> Result<TaxEfficiency, PortfolioError> {
        let per_asset = self.estimate_per_asset(returns)?;
        let portfolio = self.estimate(&returns.portfolio_returns(weights)?)?;
        Ok(TaxEfficiency { per_asset, portfolio })
    }
}

impl Default for TaxEfficiencyEstimator {
    fn default() -> Self {
        Self::new(TaxStatus::default())
    }
}
