use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortfolioError {
    /// A requested ticker has no price history. Recovered per ticker by the service.
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Optimization failed: {0}")]
    OptimizationFailed(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error: {0}")]
    ApiError(String),
}

impl PortfolioError {
    /// Whether the service may drop the offending ticker and carry on.
    pub fn is_recoverable_per_ticker(&self) -> bool {
        matches!(
            self,
            PortfolioError::DataUnavailable(_) | PortfolioError::ApiError(_)
        )
    }
}

pub type PortfolioResult<T> = Result<T, PortfolioError>;
