//! Risk Metrics
//!
//! Annualized volatility, Sharpe ratio, maximum drawdown and historical
//! Value-at-Risk over daily return series.

pub mod calculator;
pub mod metrics;

pub use calculator::{RiskCalculator, RiskSettings};
pub use metrics::{max_drawdown, sharpe_ratio, value_at_risk, volatility};
