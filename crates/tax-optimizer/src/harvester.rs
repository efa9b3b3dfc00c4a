//! Tax-Loss Harvesting Scanner
//!
//! Flags assets whose cumulative return over the sample is deep enough in the
//! red to be worth selling for the realized loss.

use portfolio_core::{stats, HarvestAction, LossHarvestCandidate, ReturnTable};
use std::collections::BTreeMap;

/// Final cumulative return must be strictly below this to qualify.
pub const HARVEST_THRESHOLD: f64 = -0.10;
/// Reason attached to every candidate.
pub const HARVEST_REASON: &str = "Tax loss harvesting";

pub struct LossHarvestingScanner;

impl LossHarvestingScanner {
    /// One candidate per asset whose final cumulative return is below -10%.
    /// Assets above the threshold are simply absent from the map.
    pub fn scan(returns: &ReturnTable) -> BTreeMap<String, LossHarvestCandidate> {
        let mut candidates = BTreeMap::new();

        for (ticker, column) in returns.iter_columns() {
            let Some(&total) = stats::cumulative_returns(column).last() else {
                continue;
            };

            if total < HARVEST_THRESHOLD {
                tracing::debug!("{} is down {:.2}%, flagging for harvest", ticker, total * 100.0);
                candidates.insert(
                    ticker.to_string(),
                    LossHarvestCandidate {
                        asset: ticker.to_string(),
                        action: HarvestAction::Sell,
                        loss_percentage: total * 100.0,
                        reason: HARVEST_REASON.to_string(),
                    },
                );
            }
        }

        candidates
    }
}
