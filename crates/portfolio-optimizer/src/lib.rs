//! Long-only minimum-variance allocation.
//!
//! Minimizes the portfolio variance w'Σw over weights that are non-negative and
//! sum to one. The quadratic program is handed to the Clarabel interior-point
//! solver, which accepts a positive semidefinite Σ, so rank-deficient sample
//! covariances need no regularization.

pub mod optimizer;

pub use optimizer::{MeanVarianceOptimizer, OptimizationOutcome, OptimizerConfig};
