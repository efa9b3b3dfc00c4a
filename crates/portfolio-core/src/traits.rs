use async_trait::async_trait;
use crate::{PortfolioError, PricePoint};

/// Source of historical closing prices.
///
/// Implementations return the series in ascending date order. An unknown
/// ticker yields an empty vector or `DataUnavailable`. The `period` string is
/// passed through untouched; interpreting it is the provider's business.
#[async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    async fn fetch_history(&self, ticker: &str, period: &str) -> Result<Vec<PricePoint>, PortfolioError>;
}
