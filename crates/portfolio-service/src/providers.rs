//! Offline price history sources.

use async_trait::async_trait;
use chrono::NaiveDate;
use portfolio_core::{PortfolioError, PriceHistoryProvider, PricePoint};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// In-memory price histories. The period argument is ignored.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceProvider {
    series: HashMap<String, Vec<PricePoint>>,
}

impl StaticPriceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, ticker: impl Into<String>, points: Vec<PricePoint>) -> Self {
        self.series.insert(ticker.into(), points);
        self
    }

    /// Closes on consecutive calendar days starting at `start`.
    pub fn with_closes(self, ticker: impl Into<String>, start: NaiveDate, closes: &[f64]) -> Self {
        let points = start
            .iter_days()
            .zip(closes)
            .map(|(date, &close)| PricePoint::new(date, close))
            .collect();
        self.with_series(ticker, points)
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }
}

#[async_trait]
impl PriceHistoryProvider for StaticPriceProvider {
    async fn fetch_history(&self, ticker: &str, _period: &str) -> Result<Vec<PricePoint>, PortfolioError> {
        self.series
            .get(ticker)
            .cloned()
            .ok_or_else(|| PortfolioError::DataUnavailable(format!("no series loaded for {}", ticker)))
    }
}

/// Wide CSV of closes: a `date` column followed by one column per ticker.
///
/// ```text
/// date,AAPL,BND
/// 2024-01-02,185.64,72.40
/// 2024-01-03,184.25,
/// ```
///
/// Empty cells are missing observations. The whole file is served regardless
/// of the requested period.
#[derive(Debug, Clone)]
pub struct CsvPriceProvider {
    inner: StaticPriceProvider,
}

impl CsvPriceProvider {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PortfolioError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            PortfolioError::Configuration(format!("cannot open {}: {}", path.display(), e))
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PortfolioError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| PortfolioError::Configuration(format!("invalid price CSV header: {}", e)))?
            .clone();
        if headers.len() < 2 {
            return Err(PortfolioError::Configuration(
                "price CSV needs a date column and at least one ticker column".to_string(),
            ));
        }

        let tickers: Vec<String> = headers.iter().skip(1).map(|h| h.to_uppercase()).collect();
        let mut columns: Vec<Vec<PricePoint>> = vec![Vec::new(); tickers.len()];

        for (line, result) in reader.records().enumerate() {
            let record = result
                .map_err(|e| PortfolioError::Configuration(format!("invalid price CSV row: {}", e)))?;
            let raw_date = record.get(0).unwrap_or("");
            if raw_date.is_empty() {
                continue;
            }
            let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|_| {
                PortfolioError::Configuration(format!(
                    "row {}: '{}' is not a YYYY-MM-DD date",
                    line + 2,
                    raw_date
                ))
            })?;

            for (i, column) in columns.iter_mut().enumerate() {
                let cell = record.get(i + 1).unwrap_or("");
                if cell.is_empty() {
                    continue;
                }
                let close: f64 = cell.parse().map_err(|_| {
                    PortfolioError::Configuration(format!(
                        "row {}: '{}' is not a price for {}",
                        line + 2,
                        cell,
                        tickers[i]
                    ))
                })?;
                column.push(PricePoint::new(date, close));
            }
        }

        let inner = tickers
            .into_iter()
            .zip(columns)
            .fold(StaticPriceProvider::new(), |provider, (ticker, points)| {
                provider.with_series(ticker, points)
            });

        tracing::debug!("Loaded CSV prices for {} tickers", inner.series.len());
        Ok(Self { inner })
    }

    pub fn tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self.inner.tickers().map(str::to_string).collect();
        tickers.sort();
        tickers
    }
}

#[async_trait]
impl PriceHistoryProvider for CsvPriceProvider {
    async fn fetch_history(&self, ticker: &str, period: &str) -> Result<Vec<PricePoint>, PortfolioError> {
        self.inner.fetch_history(&ticker.to_uppercase(), period).await
    }
}
