//! Tax Optimizer
//!
//! Heuristic tax-liability estimate for an allocation and tax-loss harvesting
//! candidates from cumulative asset returns. Not a tax-lot ledger.

pub mod harvester;
pub mod tax_calculator;

pub use harvester::{LossHarvestingScanner, HARVEST_REASON, HARVEST_THRESHOLD};
pub use tax_calculator::{tax_rate, TaxEfficiencyEstimator};
