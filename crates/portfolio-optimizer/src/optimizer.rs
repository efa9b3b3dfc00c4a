use nalgebra::{DMatrix, DVector};
use portfolio_core::{PortfolioError, WeightVector};
use serde::{Deserialize, Serialize};

/// Solver settings for [`MeanVarianceOptimizer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Interior-point iteration cap.
    pub max_iterations: u32,
    /// Absolute and relative duality-gap tolerance.
    pub tolerance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-8,
        }
    }
}

/// Weights plus solver diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOutcome {
    pub weights: WeightVector,
    pub iterations: usize,
    /// Portfolio variance `wᵀ Σ w` under the input covariance.
    pub objective: f64,
}

/// Long-only minimum-variance optimizer.
///
/// Expected returns are validated against the covariance shape but do not enter
/// the objective.
#[derive(Debug, Clone, Default)]
pub struct MeanVarianceOptimizer {
    config: OptimizerConfig,
}

impl MeanVarianceOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn optimize(
        &self,
        expected_returns: &DVector<f64>,
        covariance: &DMatrix<f64>,
        asset_count: usize,
    ) -> Result<WeightVector, PortfolioError> {
        self.solve(expected_returns, covariance, asset_count)
            .map(|outcome| outcome.weights)
    }

    pub fn solve(
        &self,
        expected_returns: &DVector<f64>,
        covariance: &DMatrix<f64>,
        asset_count: usize,
    ) -> Result<OptimizationOutcome, PortfolioError> {
        validate_inputs(expected_returns, covariance, asset_count)?;

        if asset_count == 1 {
            return Ok(OptimizationOutcome {
                weights: WeightVector::new(vec![1.0])?,
                iterations: 0,
                objective: covariance[(0, 0)],
            });
        }

        // Daily variances are ~1e-4; normalize so the gap tolerance is scale free.
        let scale = covariance.diagonal().max();
        let scale = if scale > 0.0 { scale } else { 1.0 };
        let (x, iterations) = self.solve_simplex_qp(&(covariance / scale))?;

        let clamped: Vec<f64> = x.iter().map(|&w| w.max(0.0)).collect();
        let total: f64 = clamped.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return Err(PortfolioError::OptimizationFailed(
                "solver returned a zero weight vector".to_string(),
            ));
        }
        let weights = WeightVector::new(clamped.into_iter().map(|w| w / total).collect())?;

        let w = DVector::from_column_slice(weights.as_slice());
        let objective = w.dot(&(covariance * &w));

        tracing::debug!(
            "Minimum-variance solution in {} iterations, variance {:.6e}",
            iterations,
            objective
        );

        Ok(OptimizationOutcome {
            weights,
            iterations,
            objective,
        })
    }

    /// Minimize `½ wᵀ P w` subject to `1ᵀ w = 1` and `w ≥ 0`.
    ///
    /// `P` only needs to be positive semidefinite, so rank-deficient sample
    /// covariances (more assets than periods, duplicated series) are accepted.
    fn solve_simplex_qp(&self, p: &DMatrix<f64>) -> Result<(Vec<f64>, usize), PortfolioError> {
        use clarabel::algebra::*;
        use clarabel::solver::*;

        let n = p.nrows();
        let failed = |detail: String| {
            tracing::warn!("Minimum-variance solve failed over {} assets: {}", n, detail);
            PortfolioError::OptimizationFailed(detail)
        };

        // Upper triangle of P in column-major CSC form
        let mut p_colptr = Vec::with_capacity(n + 1);
        let mut p_rowval = Vec::new();
        let mut p_nzval = Vec::new();
        p_colptr.push(0);
        for j in 0..n {
            for i in 0..=j {
                let v = p[(i, j)];
                if v != 0.0 {
                    p_rowval.push(i);
                    p_nzval.push(v);
                }
            }
            p_colptr.push(p_rowval.len());
        }
        let p_csc = CscMatrix::new(n, n, p_colptr, p_rowval, p_nzval);
        let q = vec![0.0; n];

        // Row 0: budget equality. Rows 1..=n: -w_j + s_j = 0 with s_j >= 0.
        let mut a_colptr = Vec::with_capacity(n + 1);
        let mut a_rowval = Vec::with_capacity(2 * n);
        let mut a_nzval = Vec::with_capacity(2 * n);
        a_colptr.push(0);
        for j in 0..n {
            a_rowval.push(0);
            a_nzval.push(1.0);
            a_rowval.push(j + 1);
            a_nzval.push(-1.0);
            a_colptr.push(a_rowval.len());
        }
        let a_csc = CscMatrix::new(n + 1, n, a_colptr, a_rowval, a_nzval);

        let mut b = vec![0.0; n + 1];
        b[0] = 1.0;
        let cones = [ZeroConeT(1), NonnegativeConeT(n)];

        let settings = DefaultSettingsBuilder::default()
            .max_iter(self.config.max_iterations)
            .tol_gap_abs(self.config.tolerance)
            .tol_gap_rel(self.config.tolerance)
            .verbose(false)
            .build()
            .map_err(|e| failed(format!("invalid solver settings: {:?}", e)))?;

        let mut solver = DefaultSolver::new(&p_csc, &q, &a_csc, &b, &cones, settings)
            .map_err(|e| failed(format!("solver setup failed: {:?}", e)))?;
        solver.solve();

        let status = &solver.solution.status;
        if !matches!(status, SolverStatus::Solved) {
            return Err(failed(format!(
                "solver stopped with status {:?} after {} iterations",
                status, solver.solution.iterations
            )));
        }

        Ok((solver.solution.x.clone(), solver.solution.iterations as usize))
    }
}

fn validate_inputs(
    expected_returns: &DVector<f64>,
    covariance: &DMatrix<f64>,
    asset_count: usize,
) -> Result<(), PortfolioError> {
    if asset_count == 0 {
        return Err(PortfolioError::InsufficientData(
            "cannot optimize an empty universe".to_string(),
        ));
    }
    if expected_returns.len() != asset_count
        || covariance.nrows() != asset_count
        || covariance.ncols() != asset_count
    {
        return Err(PortfolioError::OptimizationFailed(format!(
            "shape mismatch: {} assets, {} expected returns, {}x{} covariance",
            asset_count,
            expected_returns.len(),
            covariance.nrows(),
            covariance.ncols()
        )));
    }
    if expected_returns.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
        return Err(PortfolioError::OptimizationFailed(
            "non-finite expected return or covariance entry".to_string(),
        ));
    }

    let magnitude = covariance.amax().max(1.0);
    for i in 0..asset_count {
        if covariance[(i, i)] < 0.0 {
            return Err(PortfolioError::OptimizationFailed(format!(
                "negative variance {} on asset {}",
                covariance[(i, i)],
                i
            )));
        }
        for j in (i + 1)..asset_count {
            if (covariance[(i, j)] - covariance[(j, i)]).abs() > 1e-9 * magnitude {
                return Err(PortfolioError::OptimizationFailed(format!(
                    "covariance is not symmetric at ({}, {})",
                    i, j
                )));
            }
        }
    }
    Ok(())
}
