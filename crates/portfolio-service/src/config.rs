use portfolio_core::{PortfolioError, TaxStatus};
use portfolio_optimizer::OptimizerConfig;
use risk_metrics::RiskSettings;
use serde::{Deserialize, Serialize};
use std::env;

/// Immutable settings for one [`crate::PortfolioOptimizationService`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConfig {
    // Informational, copied into the report
    pub initial_capital: f64,
    // Accepted but not yet used by the optimizer
    pub risk_tolerance: f64,
    pub tax_status: TaxStatus,

    // Risk metric parameters
    pub risk_free_rate: f64,
    pub confidence_level: f64,

    pub optimizer: OptimizerConfig,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        let risk = RiskSettings::default();
        Self {
            initial_capital: 10_000.0,
            risk_tolerance: 5.0,
            tax_status: TaxStatus::Standard,
            risk_free_rate: risk.risk_free_rate,
            confidence_level: risk.confidence_level,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl OptimizationConfig {
    /// Defaults overridden by `PORTFOLIO_INITIAL_CAPITAL`, `PORTFOLIO_RISK_TOLERANCE`,
    /// `PORTFOLIO_TAX_STATUS` and `PORTFOLIO_RISK_FREE_RATE`.
    pub fn from_env() -> Result<Self, PortfolioError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, PortfolioError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |key: &str, default: f64| -> Result<f64, PortfolioError> {
            match lookup(key) {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    PortfolioError::Configuration(format!("{} is not a number: '{}'", key, raw))
                }),
                None => Ok(default),
            }
        };

        let config = Self {
            initial_capital: parse("PORTFOLIO_INITIAL_CAPITAL", defaults.initial_capital)?,
            risk_tolerance: parse("PORTFOLIO_RISK_TOLERANCE", defaults.risk_tolerance)?,
            tax_status: lookup("PORTFOLIO_TAX_STATUS")
                .map(TaxStatus::from)
                .unwrap_or(defaults.tax_status),
            risk_free_rate: parse("PORTFOLIO_RISK_FREE_RATE", defaults.risk_free_rate)?,
            confidence_level: defaults.confidence_level,
            optimizer: defaults.optimizer,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot be defaulted. An unknown tax status is not an
    /// error; it is taxed at the standard rate.
    pub fn validate(&self) -> Result<(), PortfolioError> {
        if !self.initial_capital.is_finite() || self.initial_capital < 0.0 {
            return Err(PortfolioError::Configuration(format!(
                "initial capital must be a non-negative amount, got {}",
                self.initial_capital
            )));
        }
        if !self.risk_tolerance.is_finite() {
            return Err(PortfolioError::Configuration(
                "risk tolerance must be finite".to_string(),
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(PortfolioError::Configuration(
                "risk-free rate must be finite".to_string(),
            ));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(PortfolioError::Configuration(format!(
                "confidence level must be in (0, 1), got {}",
                self.confidence_level
            )));
        }
        if self.optimizer.max_iterations == 0 {
            return Err(PortfolioError::Configuration(
                "optimizer needs at least one iteration".to_string(),
            ));
        }
        if !(self.optimizer.tolerance > 0.0) {
            return Err(PortfolioError::Configuration(format!(
                "optimizer tolerance must be positive, got {}",
                self.optimizer.tolerance
            )));
        }
        Ok(())
    }

    pub fn risk_settings(&self) -> RiskSettings {
        RiskSettings {
            risk_free_rate: self.risk_free_rate,
            confidence_level: self.confidence_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = OptimizationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tax_status, TaxStatus::Standard);
        assert_eq!(config.risk_free_rate, 0.02);
        assert_eq!(config.confidence_level, 0.95);
    }

    #[test]
    fn test_env_overrides() {
        let config = OptimizationConfig::from_lookup(lookup(&[
            ("PORTFOLIO_INITIAL_CAPITAL", "250000"),
            ("PORTFOLIO_TAX_STATUS", "high_income"),
            ("PORTFOLIO_RISK_FREE_RATE", " 0.045 "),
        ]))
        .unwrap();

        assert_eq!(config.initial_capital, 250_000.0);
        assert_eq!(config.tax_status, TaxStatus::HighIncome);
        assert_eq!(config.risk_free_rate, 0.045);
        assert_eq!(config.risk_tolerance, 5.0);
    }

    #[test]
    fn test_unknown_tax_status_is_accepted() {
        let config =
            OptimizationConfig::from_lookup(lookup(&[("PORTFOLIO_TAX_STATUS", "offshore")])).unwrap();
        assert_eq!(config.tax_status, TaxStatus::Other("offshore".to_string()));
    }

    #[test]
    fn test_bad_values_are_configuration_errors() {
        assert!(matches!(
            OptimizationConfig::from_lookup(lookup(&[("PORTFOLIO_INITIAL_CAPITAL", "lots")])),
            Err(PortfolioError::Configuration(_))
        ));
        assert!(matches!(
            OptimizationConfig::from_lookup(lookup(&[("PORTFOLIO_INITIAL_CAPITAL", "-5")])),
            Err(PortfolioError::Configuration(_))
        ));

        let config = OptimizationConfig {
            confidence_level: 1.0,
            ..OptimizationConfig::default()
        };
        assert!(matches!(config.validate(), Err(PortfolioError::Configuration(_))));
    }
}
