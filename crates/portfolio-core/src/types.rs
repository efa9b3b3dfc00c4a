use chrono::{DateTime, NaiveDate, Utc};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::stats;
use crate::PortfolioError;

/// Tolerance for the full-investment invariant of a [`WeightVector`].
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Closing price observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// Closing prices aligned by date: rows are dates ascending, columns are assets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceTable {
    tickers: Vec<String>,
    dates: Vec<NaiveDate>,
    /// One column per ticker, each aligned with `dates`.
    columns: Vec<Vec<Option<f64>>>,
}

impl PriceTable {
    /// Outer-join per-ticker series on date.
    ///
    /// Non-finite closes become missing cells. Tickers left with no finite close
    /// are dropped with a warning, as are repeated tickers after their first
    /// occurrence.
    pub fn from_series<I, S>(series: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<PricePoint>)>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut kept: Vec<(String, BTreeMap<NaiveDate, f64>)> = Vec::new();

        for (ticker, points) in series {
            let ticker = ticker.into();
            if !seen.insert(ticker.clone()) {
                tracing::warn!("Duplicate series for {}, keeping the first one", ticker);
                continue;
            }
            let by_date: BTreeMap<NaiveDate, f64> = points
                .into_iter()
                .filter(|p| p.close.is_finite())
                .map(|p| (p.date, p.close))
                .collect();
            if by_date.is_empty() {
                tracing::warn!("No usable price data for {}, dropping it from the table", ticker);
                continue;
            }
            kept.push((ticker, by_date));
        }

        let dates: Vec<NaiveDate> = kept
            .iter()
            .flat_map(|(_, by_date)| by_date.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let columns = kept
            .iter()
            .map(|(_, by_date)| dates.iter().map(|d| by_date.get(d).copied()).collect())
            .collect();

        Self {
            tickers: kept.into_iter().map(|(t, _)| t).collect(),
            dates,
            columns,
        }
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn column(&self, index: usize) -> Option<&[Option<f64>]> {
        self.columns.get(index).map(|c| c.as_slice())
    }

    pub fn n_assets(&self) -> usize {
        self.tickers.len()
    }

    pub fn n_rows(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty() || self.dates.is_empty()
    }
}

/// Simple period-over-period returns with every row fully observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnTable {
    tickers: Vec<String>,
    /// End date of each return period.
    dates: Vec<NaiveDate>,
    columns: Vec<Vec<f64>>,
}

impl ReturnTable {
    pub fn new(
        tickers: Vec<String>,
        dates: Vec<NaiveDate>,
        columns: Vec<Vec<f64>>,
    ) -> Result<Self, PortfolioError> {
        if tickers.is_empty() || dates.is_empty() {
            return Err(PortfolioError::InsufficientData(format!(
                "return table has {} rows and {} columns",
                dates.len(),
                tickers.len()
            )));
        }
        if columns.len() != tickers.len() {
            return Err(PortfolioError::InsufficientData(format!(
                "{} return columns for {} tickers",
                columns.len(),
                tickers.len()
            )));
        }
        for (ticker, column) in tickers.iter().zip(&columns) {
            if column.len() != dates.len() {
                return Err(PortfolioError::InsufficientData(format!(
                    "{} has {} returns, expected {}",
                    ticker,
                    column.len(),
                    dates.len()
                )));
            }
            if column.iter().any(|r| !r.is_finite()) {
                return Err(PortfolioError::InsufficientData(format!(
                    "{} has non-finite returns",
                    ticker
                )));
            }
        }
        Ok(Self { tickers, dates, columns })
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn column(&self, index: usize) -> Option<&[f64]> {
        self.columns.get(index).map(|c| c.as_slice())
    }

    /// `(ticker, returns)` pairs in column order.
    pub fn iter_columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.tickers
            .iter()
            .map(|t| t.as_str())
            .zip(self.columns.iter().map(|c| c.as_slice()))
    }

    pub fn n_assets(&self) -> usize {
        self.tickers.len()
    }

    pub fn n_periods(&self) -> usize {
        self.dates.len()
    }

    /// Per-asset arithmetic mean return (not annualized).
    pub fn expected_returns(&self) -> DVector<f64> {
        DVector::from_iterator(self.columns.len(), self.columns.iter().map(|c| stats::mean(c)))
    }

    /// Sample covariance matrix over the column order.
    pub fn covariance_matrix(&self) -> Result<DMatrix<f64>, PortfolioError> {
        if self.n_periods() < 2 {
            return Err(PortfolioError::InsufficientData(format!(
                "covariance needs at least 2 return periods, got {}",
                self.n_periods()
            )));
        }
        let n = self.n_assets();
        let mut cov = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in i..n {
                let c = stats::covariance(&self.columns[i], &self.columns[j]);
                cov[(i, j)] = c;
                cov[(j, i)] = c;
            }
        }
        Ok(cov)
    }

    /// Weighted portfolio return for each period.
    pub fn portfolio_returns(&self, weights: &WeightVector) -> Result<Vec<f64>, PortfolioError> {
        if weights.len() != self.n_assets() {
            return Err(PortfolioError::InsufficientData(format!(
                "{} weights for {} assets",
                weights.len(),
                self.n_assets()
            )));
        }
        Ok((0..self.n_periods())
            .map(|t| {
                self.columns
                    .iter()
                    .zip(weights.as_slice())
                    .map(|(column, w)| w * column[t])
                    .sum()
            })
            .collect())
    }
}

/// Long-only, fully invested allocation: each weight in [0, 1], summing to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>")]
pub struct WeightVector(Vec<f64>);

impl TryFrom<Vec<f64>> for WeightVector {
    type Error = PortfolioError;

    fn try_from(weights: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(weights)
    }
}

impl WeightVector {
    pub fn new(weights: Vec<f64>) -> Result<Self, PortfolioError> {
        if weights.is_empty() {
            return Err(PortfolioError::OptimizationFailed(
                "weight vector is empty".to_string(),
            ));
        }
        if let Some((i, w)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < -WEIGHT_TOLERANCE || **w > 1.0 + WEIGHT_TOLERANCE)
        {
            return Err(PortfolioError::OptimizationFailed(format!(
                "weight {} at position {} is outside [0, 1]",
                w, i
            )));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(PortfolioError::OptimizationFailed(format!(
                "weights sum to {}, expected 1",
                sum
            )));
        }
        Ok(Self(weights.into_iter().map(|w| w.clamp(0.0, 1.0)).collect()))
    }

    /// `1/n` in every slot.
    pub fn equal(n: usize) -> Result<Self, PortfolioError> {
        if n == 0 {
            return Err(PortfolioError::InsufficientData(
                "cannot weight an empty universe".to_string(),
            ));
        }
        Ok(Self(vec![1.0 / n as f64; n]))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

/// Optimized weight for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetWeight {
    pub ticker: String,
    pub weight: f64,
}

/// Annualized risk statistics for one return series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub volatility: f64,
    /// `None` when volatility is zero: the risk-adjusted return is undefined.
    pub sharpe_ratio: Option<f64>,
    /// Most negative peak-to-trough decline, in [-1, 0].
    pub max_drawdown: f64,
    /// Return quantile at `1 - confidence`; usually negative.
    pub value_at_risk: f64,
}

/// Tax treatment category of the account being optimized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaxStatus {
    #[default]
    Standard,
    Retirement,
    HighIncome,
    /// Any label outside the known set; taxed like `Standard`.
    Other(String),
}

impl TaxStatus {
    pub fn label(&self) -> &str {
        match self {
            TaxStatus::Standard => "standard",
            TaxStatus::Retirement => "retirement",
            TaxStatus::HighIncome => "high_income",
            TaxStatus::Other(label) => label,
        }
    }
}

impl fmt::Display for TaxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TaxStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "standard" => TaxStatus::Standard,
            "retirement" => TaxStatus::Retirement,
            "high_income" => TaxStatus::HighIncome,
            other => TaxStatus::Other(other.to_string()),
        })
    }
}

impl From<String> for TaxStatus {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

impl From<TaxStatus> for String {
    fn from(status: TaxStatus) -> Self {
        status.label().to_string()
    }
}

/// Recommended action for a harvest candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestAction {
    Sell,
}

/// An asset whose cumulative return crossed the harvesting threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossHarvestCandidate {
    pub asset: String,
    pub action: HarvestAction,
    /// Final cumulative return in percent (negative).
    pub loss_percentage: f64,
    pub reason: String,
}

/// Estimated annualized tax liability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxEfficiency {
    /// Liability per asset, from each asset's own mean return.
    pub per_asset: BTreeMap<String, f64>,
    /// Liability of the optimized portfolio (weight-aggregated).
    pub portfolio: f64,
}

/// Everything one optimization run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    /// Weights in input ticker order; excluded tickers are absent.
    pub weights: Vec<AssetWeight>,
    pub tax_efficiency: TaxEfficiency,
    pub loss_harvesting: BTreeMap<String, LossHarvestCandidate>,
    /// Risk of the optimized portfolio's return series.
    pub risk_profile: RiskProfile,
    pub asset_risk: BTreeMap<String, RiskProfile>,
    pub expected_annual_return: f64,
    pub annual_volatility: f64,
    /// Tickers dropped because the provider had no usable data.
    pub excluded_tickers: Vec<String>,
    /// Number of fully observed return periods used.
    pub observations: usize,
    pub tax_status: TaxStatus,
    pub initial_capital: f64,
    pub generated_at: DateTime<Utc>,
}

impl OptimizationReport {
    pub fn weight(&self, ticker: &str) -> Option<f64> {
        self.weights
            .iter()
            .find(|w| w.ticker == ticker)
            .map(|w| w.weight)
    }
}
