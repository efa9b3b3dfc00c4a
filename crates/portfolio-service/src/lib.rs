//! Runs the whole pipeline for one ticker list: fetch prices, build returns,
//! optimize, then attach risk, tax and harvesting metrics.

use chrono::Utc;
use futures_util::future::join_all;
use portfolio_core::{
    stats, AssetWeight, OptimizationReport, PortfolioError, PriceHistoryProvider, PricePoint,
    PriceTable, ReturnSeriesBuilder, TRADING_PERIODS_PER_YEAR,
};
use portfolio_optimizer::MeanVarianceOptimizer;
use risk_metrics::RiskCalculator;
use std::collections::HashSet;
use std::sync::Arc;
use tax_optimizer::{LossHarvestingScanner, TaxEfficiencyEstimator};

pub mod config;
pub mod providers;

pub use config::OptimizationConfig;
pub use providers::{CsvPriceProvider, StaticPriceProvider};

pub struct PortfolioOptimizationService {
    provider: Arc<dyn PriceHistoryProvider>,
    config: OptimizationConfig,
    optimizer: MeanVarianceOptimizer,
    risk: RiskCalculator,
    tax: TaxEfficiencyEstimator,
}

impl PortfolioOptimizationService {
    pub fn new(
        provider: Arc<dyn PriceHistoryProvider>,
        config: OptimizationConfig,
    ) -> Result<Self, PortfolioError> {
        config.validate()?;
        Ok(Self {
            provider,
            optimizer: MeanVarianceOptimizer::new(config.optimizer),
            risk: RiskCalculator::new(config.risk_settings()),
            tax: TaxEfficiencyEstimator::new(config.tax_status.clone()),
            config,
        })
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Optimize over `tickers` using history for `period`.
    ///
    /// Tickers without data are excluded and listed in the report. Any other
    /// failure aborts the run with no report.
    pub async fn run(&self, tickers: &[String], period: &str) -> Result<OptimizationReport, PortfolioError> {
        let universe = dedupe(tickers);
        tracing::info!("Optimizing {} tickers over '{}'", universe.len(), period);

        let (series, excluded) = self.fetch_all(&universe, period).await?;
        if series.is_empty() {
            return Err(PortfolioError::InsufficientData(format!(
                "none of the {} requested tickers returned price data",
                universe.len()
            )));
        }

        let prices = PriceTable::from_series(series);
        let returns = ReturnSeriesBuilder::build(&prices)?;
        tracing::info!(
            "Built {} return periods for {} assets",
            returns.n_periods(),
            returns.n_assets()
        );

        let expected = returns.expected_returns();
        let covariance = returns.covariance_matrix()?;
        let outcome = self.optimizer.solve(&expected, &covariance, returns.n_assets())?;
        tracing::info!(
            "Optimizer solved in {} iterations (daily variance {:.3e})",
            outcome.iterations,
            outcome.objective
        );

        let weights = outcome.weights;
        let portfolio_returns = returns.portfolio_returns(&weights)?;

        let tax_efficiency = self.tax.assess(&returns, &weights)?;
        let loss_harvesting = LossHarvestingScanner::scan(&returns);
        let risk_profile = self.risk.compute(&portfolio_returns)?;
        let asset_risk = self.risk.compute_per_asset(&returns)?;

        // Return table columns follow fetch order, which follows input order.
        let weights = returns
            .tickers()
            .iter()
            .zip(weights.as_slice())
            .map(|(ticker, &weight)| AssetWeight {
                ticker: ticker.clone(),
                weight,
            })
            .collect();

        Ok(OptimizationReport {
            weights,
            tax_efficiency,
            loss_harvesting,
            expected_annual_return: stats::mean(&portfolio_returns) * TRADING_PERIODS_PER_YEAR,
            annual_volatility: risk_profile.volatility,
            risk_profile,
            asset_risk,
            excluded_tickers: excluded,
            observations: returns.n_periods(),
            tax_status: self.config.tax_status.clone(),
            initial_capital: self.config.initial_capital,
            generated_at: Utc::now(),
        })
    }

    /// Fetch every ticker concurrently, keeping input order.
    async fn fetch_all(
        &self,
        tickers: &[String],
        period: &str,
    ) -> Result<(Vec<(String, Vec<PricePoint>)>, Vec<String>), PortfolioError> {
        let futures: Vec<_> = tickers
            .iter()
            .map(|ticker| {
                let provider = &self.provider;
                async move { (ticker, provider.fetch_history(ticker, period).await) }
            })
            .collect();

        let mut series = Vec::with_capacity(tickers.len());
        let mut excluded = Vec::new();

        for (ticker, result) in join_all(futures).await {
            match result {
                Ok(points) if points.iter().any(|p| p.close.is_finite()) => {
                    series.push((ticker.clone(), points))
                }
                Ok(points) if points.is_empty() => {
                    tracing::warn!("No data found for {}, excluding it", ticker);
                    excluded.push(ticker.clone());
                }
                Ok(_) => {
                    tracing::warn!("No finite closes for {}, excluding it", ticker);
                    excluded.push(ticker.clone());
                }
                Err(e) if e.is_recoverable_per_ticker() => {
                    tracing::warn!("Failed to fetch {}: {}, excluding it", ticker, e);
                    excluded.push(ticker.clone());
                }
                Err(e) => return Err(e),
            }
        }

        Ok((series, excluded))
    }
}

fn dedupe(tickers: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tickers
        .iter()
        .filter(|t| {
            let fresh = seen.insert(t.as_str());
            if !fresh {
                tracing::warn!("Ticker {} requested more than once, ignoring repeats", t);
            }
            fresh
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use portfolio_core::{HarvestAction, TaxStatus};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn service(provider: StaticPriceProvider) -> PortfolioOptimizationService {
        PortfolioOptimizationService::new(Arc::new(provider), OptimizationConfig::default()).unwrap()
    }

    /// Prices from a repeating cycle of daily returns.
    fn closes(cycle: &[f64], periods: usize) -> Vec<f64> {
        let mut price = 100.0;
        let mut out = vec![price];
        for r in cycle.iter().cycle().take(periods) {
            price *= 1.0 + r;
            out.push(price);
        }
        out
    }

    #[tokio::test]
    async fn test_zero_variance_asset_takes_the_allocation() {
        let provider = StaticPriceProvider::new()
            .with_closes("A", start(), &[100.0, 110.0, 99.0, 108.9, 98.01])
            .with_closes("B", start(), &[100.0, 100.0, 100.0, 100.0, 100.0]);

        let report = service(provider).run(&symbols(&["A", "B"]), "dummy").await.unwrap();

        assert!(report.weight("A").unwrap() < 1e-3);
        assert!(report.weight("B").unwrap() > 0.999);
        assert!(report.annual_volatility < 1e-2);
        assert_eq!(report.observations, 4);
    }

    #[tokio::test]
    async fn test_constant_growth_and_flat_assets() {
        let provider = StaticPriceProvider::new()
            .with_closes("A", start(), &[100.0, 110.0, 121.0])
            .with_closes("B", start(), &[100.0, 100.0, 100.0]);
        let report = service(provider).run(&symbols(&["A", "B"]), "dummy").await.unwrap();

        // Both columns are constant, so the covariance vanishes and nothing
        // separates the assets: the allocation stays at equal weights.
        let total: f64 = report.weights.iter().map(|w| w.weight).sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!((report.weight("A").unwrap() - 0.5).abs() < 1e-6);
        assert_eq!(report.observations, 2);
        assert!(report.loss_harvesting.is_empty());

        // Per-asset tax liability from mean return 0.10 per period.
        let a_tax = report.tax_efficiency.per_asset["A"];
        assert!((a_tax - 0.10 * 252.0 * 0.15).abs() < 1e-9);
        assert_eq!(report.tax_efficiency.per_asset["B"], 0.0);
    }

    #[tokio::test]
    async fn test_missing_ticker_is_excluded() {
        let provider = StaticPriceProvider::new()
            .with_closes("VTI", start(), &closes(&[0.01, -0.005, 0.003], 30))
            .with_closes("BND", start(), &closes(&[0.001, 0.002, -0.001], 30))
            .with_series("EMPTY", Vec::new());

        let report = service(provider)
            .run(&symbols(&["VTI", "NOPE", "BND", "EMPTY"]), "5y")
            .await
            .unwrap();

        let tickers: Vec<&str> = report.weights.iter().map(|w| w.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["VTI", "BND"]);
        assert_eq!(report.excluded_tickers, vec!["NOPE".to_string(), "EMPTY".to_string()]);
        assert!(report.weight("NOPE").is_none());
        assert!(!report.asset_risk.contains_key("NOPE"));
    }

    #[tokio::test]
    async fn test_ticker_without_finite_closes_is_excluded() {
        let provider = StaticPriceProvider::new()
            .with_closes("A", start(), &closes(&[0.01, -0.004, 0.002], 3))
            .with_closes("B", start(), &closes(&[-0.002, 0.003, 0.001], 3))
            .with_closes("BAD", start(), &[f64::NAN; 4]);

        let report = service(provider)
            .run(&symbols(&["A", "B", "BAD"]), "5y")
            .await
            .unwrap();

        let tickers: Vec<&str> = report.weights.iter().map(|w| w.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["A", "B"]);
        assert_eq!(report.excluded_tickers, vec!["BAD".to_string()]);
        assert_eq!(report.observations, 3);
    }

    #[tokio::test]
    async fn test_more_tickers_than_observations() {
        // Eleven assets over four returns leaves a rank-deficient covariance.
        let cycles: [[f64; 4]; 11] = [
            [0.010, -0.004, 0.002, 0.006],
            [-0.002, 0.003, 0.001, -0.001],
            [0.004, 0.004, -0.006, 0.001],
            [0.000, 0.002, 0.002, -0.003],
            [0.007, -0.010, 0.005, 0.002],
            [-0.001, -0.001, 0.004, 0.000],
            [0.003, 0.001, -0.002, 0.004],
            [0.001, 0.000, 0.001, 0.001],
            [-0.005, 0.006, 0.000, -0.002],
            [0.002, -0.003, 0.003, 0.005],
            [0.006, 0.002, -0.004, -0.004],
        ];
        let names: Vec<String> = (0..cycles.len()).map(|i| format!("T{}", i)).collect();
        let provider = names
            .iter()
            .zip(cycles.iter())
            .fold(StaticPriceProvider::new(), |provider, (name, cycle)| {
                provider.with_closes(name, start(), &closes(cycle, 4))
            });

        let report = service(provider).run(&names, "5y").await.unwrap();

        assert_eq!(report.weights.len(), 11);
        assert_eq!(report.observations, 4);
        let total: f64 = report.weights.iter().map(|w| w.weight).sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(report.weights.iter().all(|w| (0.0..=1.0).contains(&w.weight)));
    }

    #[tokio::test]
    async fn test_duplicate_tickers_are_collapsed() {
        let provider = StaticPriceProvider::new()
            .with_closes("VTI", start(), &closes(&[0.01, -0.005, 0.003], 10))
            .with_closes("BND", start(), &closes(&[0.001, 0.002, -0.001], 10));

        let report = service(provider)
            .run(&symbols(&["BND", "VTI", "BND"]), "5y")
            .await
            .unwrap();
        assert_eq!(report.weights.len(), 2);
        assert_eq!(report.weights[0].ticker, "BND");
    }

    #[tokio::test]
    async fn test_report_includes_harvest_candidates_and_tax_status() {
        let provider = StaticPriceProvider::new()
            .with_closes("LOSER", start(), &[100.0, 95.0, 92.0, 88.0])
            .with_closes("STEADY", start(), &[50.0, 50.5, 50.2, 50.9]);
        let config = OptimizationConfig {
            tax_status: TaxStatus::Retirement,
            ..OptimizationConfig::default()
        };
        let service = PortfolioOptimizationService::new(Arc::new(provider), config).unwrap();

        let report = service.run(&symbols(&["LOSER", "STEADY"]), "1y").await.unwrap();

        let candidate = &report.loss_harvesting["LOSER"];
        assert_eq!(candidate.action, HarvestAction::Sell);
        assert!((candidate.loss_percentage - (-12.0)).abs() < 1e-9);
        assert!(!report.loss_harvesting.contains_key("STEADY"));

        assert_eq!(report.tax_status, TaxStatus::Retirement);
        assert_eq!(report.tax_efficiency.portfolio, 0.0);
        assert!(report.tax_efficiency.per_asset.values().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_no_data_at_all_is_insufficient() {
        let result = service(StaticPriceProvider::new())
            .run(&symbols(&["A", "B"]), "5y")
            .await;
        assert!(matches!(result, Err(PortfolioError::InsufficientData(_))));
    }

    #[tokio::test]
    async fn test_too_few_observations_abort_the_run() {
        // One return period: covariance and risk metrics are undefined.
        let provider = StaticPriceProvider::new()
            .with_closes("A", start(), &[100.0, 101.0])
            .with_closes("B", start(), &[50.0, 49.0]);
        let result = service(provider).run(&symbols(&["A", "B"]), "5y").await;
        assert!(matches!(result, Err(PortfolioError::InsufficientData(_))));
    }

    struct MisconfiguredProvider;

    #[async_trait]
    impl PriceHistoryProvider for MisconfiguredProvider {
        async fn fetch_history(&self, _ticker: &str, period: &str) -> Result<Vec<PricePoint>, PortfolioError> {
            Err(PortfolioError::Configuration(format!("unrecognized period '{}'", period)))
        }
    }

    #[tokio::test]
    async fn test_configuration_error_is_fatal() {
        let service =
            PortfolioOptimizationService::new(Arc::new(MisconfiguredProvider), OptimizationConfig::default())
                .unwrap();
        let result = service.run(&symbols(&["A"]), "forever").await;
        assert!(matches!(result, Err(PortfolioError::Configuration(_))));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = OptimizationConfig {
            initial_capital: f64::NAN,
            ..OptimizationConfig::default()
        };
        assert!(PortfolioOptimizationService::new(Arc::new(StaticPriceProvider::new()), config).is_err());
    }
}
