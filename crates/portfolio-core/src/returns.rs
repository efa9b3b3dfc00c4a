//! Price table to return table conversion.

use crate::{PortfolioError, PriceTable, ReturnTable};

/// Turns aligned closing prices into fully observed simple returns.
pub struct ReturnSeriesBuilder;

impl ReturnSeriesBuilder {
    /// Build `(p[t] - p[t-1]) / p[t-1]` for every asset.
    ///
    /// The first row has no prior price and is skipped. Any later row with a
    /// missing return for any asset is dropped whole, so the surviving rows keep
    /// their chronological order and are observed for every column.
    pub fn build(prices: &PriceTable) -> Result<ReturnTable, PortfolioError> {
        let n_assets = prices.n_assets();
        let n_rows = prices.n_rows();
        if n_assets == 0 || n_rows < 2 {
            return Err(PortfolioError::InsufficientData(format!(
                "need at least 2 price rows and 1 asset, got {} rows and {} assets",
                n_rows, n_assets
            )));
        }

        let columns: Vec<&[Option<f64>]> = (0..n_assets).filter_map(|i| prices.column(i)).collect();

        let mut dates = Vec::with_capacity(n_rows - 1);
        let mut returns: Vec<Vec<f64>> = vec![Vec::with_capacity(n_rows - 1); n_assets];
        let mut dropped = 0usize;

        for t in 1..n_rows {
            let row: Option<Vec<f64>> = columns
                .iter()
                .map(|column| simple_return(column[t - 1], column[t]))
                .collect();

            match row {
                Some(row) => {
                    dates.push(prices.dates()[t]);
                    for (column, r) in returns.iter_mut().zip(row) {
                        column.push(r);
                    }
                }
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            tracing::warn!("Dropped {} incomplete return rows out of {}", dropped, n_rows - 1);
        }

        if dates.is_empty() {
            return Err(PortfolioError::InsufficientData(format!(
                "no fully observed return rows across {} assets",
                n_assets
            )));
        }

        ReturnTable::new(prices.tickers().to_vec(), dates, returns)
    }
}

fn simple_return(prev: Option<f64>, curr: Option<f64>) -> Option<f64> {
    let (prev, curr) = (prev?, curr?);
    if prev == 0.0 || !prev.is_finite() || !curr.is_finite() {
        return None;
    }
    Some((curr - prev) / prev)
}
