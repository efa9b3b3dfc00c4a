use crate::metrics::{self, DEFAULT_CONFIDENCE_LEVEL, DEFAULT_RISK_FREE_RATE};
use portfolio_core::{PortfolioError, ReturnTable, RiskProfile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters shared by every risk profile in one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskSettings {
    /// Annual risk-free rate subtracted in the Sharpe ratio.
    pub risk_free_rate: f64,
    /// VaR confidence level, e.g. 0.95.
    pub confidence_level: f64,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
        }
    }
}

pub struct RiskCalculator {
    settings: RiskSettings,
}

impl RiskCalculator {
    pub fn new(settings: RiskSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RiskSettings {
        &self.settings
    }

    /// Compute the full risk profile of one return series.
    pub fn compute(&self, returns: &[f64]) -> Result<RiskProfile, PortfolioError> {
        Ok(RiskProfile {
            volatility: metrics::volatility(returns)?,
            sharpe_ratio: metrics::sharpe_ratio(returns, self.settings.risk_free_rate)?,
            max_drawdown: metrics::max_drawdown(returns)?,
            value_at_risk: metrics::value_at_risk(returns, self.settings.confidence_level)?,
        })
    }

    /// Compute a risk profile for every asset column.
    pub fn compute_per_asset(
        &self,
        returns: &ReturnTable,
    ) -> Result<BTreeMap<String, RiskProfile>, PortfolioError> {
        returns
            .iter_columns()
            .map(|(ticker, column)| Ok((ticker.to_string(), self.compute(column)?)))
            .collect()
    }
}

impl Default for RiskCalculator {
    fn default() -> Self {
        Self::new(RiskSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn table() -> ReturnTable {
        let dates = (1..=4)
            .map(|d| NaiveDate::from_ymd_opt(2025, 1, d).unwrap())
            .collect();
        ReturnTable::new(
            vec!["SPY".to_string(), "CASH".to_string()],
            dates,
            vec![vec![0.01, -0.02, 0.015, 0.005], vec![0.0, 0.0, 0.0, 0.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_compute_profile() {
        let calc = RiskCalculator::default();
        let profile = calc.compute(&[0.01, -0.02, 0.015, 0.005]).unwrap();

        assert!(profile.volatility > 0.0);
        assert!(profile.sharpe_ratio.is_some());
        assert!(profile.max_drawdown < 0.0 && profile.max_drawdown >= -1.0);
        assert!(profile.value_at_risk < 0.0);
    }

    #[test]
    fn test_compute_per_asset() {
        let calc = RiskCalculator::default();
        let profiles = calc.compute_per_asset(&table()).unwrap();

        assert_eq!(profiles.len(), 2);
        let cash = &profiles["CASH"];
        assert_eq!(cash.volatility, 0.0);
        assert_eq!(cash.sharpe_ratio, None);
        assert_eq!(cash.max_drawdown, 0.0);
        assert_eq!(cash.value_at_risk, 0.0);
    }

    #[test]
    fn test_bad_confidence_propagates() {
        let calc = RiskCalculator::new(RiskSettings {
            risk_free_rate: 0.02,
            confidence_level: 0.0,
        });
        assert!(matches!(
            calc.compute(&[0.01, 0.02]),
            Err(PortfolioError::Configuration(_))
        ));
    }
}
