//! L-BFGS minimisation of a scalar [`Function`].
//!
//! Purpose
//! -------
//! Give callers a one-call minimiser over the crate's function type: wrap the
//! function in an [`ArgMinAdapter`], build an L-BFGS solver with a
//! More–Thuente line search, run it through argmin's `Executor`, and return a
//! [`MinimizeOutcome`].
//!
//! Invariants & assumptions
//! ------------------------
//! - The function is scalar and `x0` has its input dimension.
//! - Gradients come from [`Function::gradient`], so functions without an
//!   analytical gradient are minimised on finite differences.
//!
//! Conventions
//! -----------
//! - [`SolverOptions`] follows the optimizer-options pattern: every field is
//!   optional, at least one stopping rule must be present, and numeric values
//!   are validated at construction.
use crate::function::{
    core::validation::validate_input_dim,
    errors::{FunctionError, FunctionResult},
    triad::Function,
    Point,
};
use crate::optimization::{
    adapter::ArgMinAdapter,
    types::{Cost, FnEvalMap, Grad, LbfgsMoreThuente, MoreThuenteLS, DEFAULT_LBFGS_MEM},
};
use argmin::core::{Executor, IterState, Solver, State, TerminationStatus};
use argmin_math::ArgminL2Norm;

/// Stopping rules and memory for [`minimize`].
///
/// Fields
/// ------
/// - `tol_grad`: stop when the gradient norm falls below this threshold.
/// - `tol_cost`: stop when the change in cost falls below this threshold.
/// - `max_iter`: hard cap on the number of iterations.
/// - `lbfgs_mem`: L-BFGS history length, [`DEFAULT_LBFGS_MEM`] when `None`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    pub tol_grad: Option<f64>,
    pub tol_cost: Option<f64>,
    pub max_iter: Option<usize>,
    pub lbfgs_mem: Option<usize>,
}

impl SolverOptions {
    /// Construct validated solver options.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::InvalidOption`
    ///   Returned when all three stopping rules are `None`, when a tolerance
    ///   is non-finite or not strictly positive, or when `max_iter` or
    ///   `lbfgs_mem` is zero.
    pub fn new(
        tol_grad: Option<f64>, tol_cost: Option<f64>, max_iter: Option<usize>, lbfgs_mem: Option<usize>,
    ) -> FunctionResult<Self> {
        if tol_grad.is_none() && tol_cost.is_none() && max_iter.is_none() {
            return Err(FunctionError::InvalidOption {
                key: "stopping_rule".to_string(),
                value: f64::NAN,
                reason: "at least one of tol_grad, tol_cost or max_iter must be provided",
            });
        }
        verify_tolerance("tol_grad", tol_grad)?;
        verify_tolerance("tol_cost", tol_cost)?;
        for (key, count) in [("max_iter", max_iter), ("lbfgs_mem", lbfgs_mem)] {
            if count == Some(0) {
                return Err(FunctionError::InvalidOption {
                    key: key.to_string(),
                    value: 0.0,
                    reason: "must be greater than zero",
                });
            }
        }
        Ok(Self { tol_grad, tol_cost, max_iter, lbfgs_mem })
    }
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self { tol_grad: Some(1e-8), tol_cost: None, max_iter: Some(300), lbfgs_mem: None }
    }
}

/// Result of [`minimize`].
///
/// - `x_hat`: best point found.
/// - `value`: objective value at `x_hat`.
/// - `converged`: `true` when argmin reported a termination reason.
/// - `status`: human-readable termination status.
/// - `iterations`: solver iterations performed.
/// - `fn_evals`: argmin's counters (`cost_count`, `gradient_count`, ...).
/// - `grad_norm`: norm of the last gradient, if the solver kept one.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizeOutcome {
    pub x_hat: Point,
    pub value: f64,
    pub converged: bool,
    pub status: String,
    pub iterations: usize,
    pub fn_evals: FnEvalMap,
    pub grad_norm: Option<f64>,
}

impl MinimizeOutcome {
    /// Build an outcome from the final solver state.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::BackendError`
    ///   Returned when the solver produced no best point.
    /// - `FunctionError::NonFiniteValue`
    ///   Returned when the best point or its value is not finite.
    pub fn new(
        x_hat: Option<Point>, value: f64, termination: TerminationStatus, iterations: u64, fn_evals: FnEvalMap,
        grad: Option<Grad>,
    ) -> FunctionResult<Self> {
        let x_hat = x_hat.ok_or_else(|| FunctionError::BackendError { text: "solver returned no best point".into() })?;
        if let Some(value) = x_hat.iter().copied().find(|v| !v.is_finite()) {
            return Err(FunctionError::NonFiniteValue { value });
        }
        if !value.is_finite() {
            return Err(FunctionError::NonFiniteValue { value });
        }
        let (converged, status) = match termination {
            TerminationStatus::NotTerminated => (false, "Not terminated".to_string()),
            other => (true, format!("{other:?}")),
        };
        let grad_norm = grad.map(|g| g.l2_norm());
        Ok(Self { x_hat, value, converged, status, iterations: iterations as usize, fn_evals, grad_norm })
    }
}

/// Minimise a scalar function from `x0` with L-BFGS and a More–Thuente line
/// search.
///
/// Errors
/// ------
/// - `FunctionError::NotScalarOutput` for vector-valued functions.
/// - `FunctionError::InputDimMismatch` when `x0` has the wrong length.
/// - Any error raised by the function during the run, or a solver error
///   mapped through `From<argmin::core::Error>`.
pub fn minimize(function: &Function, x0: Point, options: &SolverOptions) -> FunctionResult<MinimizeOutcome> {
    let problem = ArgMinAdapter::new(function)?;
    validate_input_dim(x0.len(), function.input_dimension())?;
    let solver = build_lbfgs(options)?;
    log::debug!(
        "minimize: L-BFGS (memory {}) from {} on {} inputs",
        options.lbfgs_mem.unwrap_or(DEFAULT_LBFGS_MEM),
        x0,
        function.input_dimension()
    );
    let outcome = run_lbfgs(x0, options, problem, solver)?;
    if !outcome.converged {
        log::warn!("minimize: solver stopped without a termination reason after {} iterations", outcome.iterations);
    }
    Ok(outcome)
}

/// Build the L-BFGS solver described by `options`.
pub fn build_lbfgs(options: &SolverOptions) -> FunctionResult<LbfgsMoreThuente> {
    let mem = options.lbfgs_mem.unwrap_or(DEFAULT_LBFGS_MEM);
    let mut solver = LbfgsMoreThuente::new(MoreThuenteLS::new(), mem);
    if let Some(g) = options.tol_grad {
        solver = solver.with_tolerance_grad(g)?;
    }
    if let Some(c) = options.tol_cost {
        solver = solver.with_tolerance_cost(c)?;
    }
    Ok(solver)
}

/// Run any argmin solver over the adapter and collect the outcome.
pub fn run_lbfgs<'a, S>(
    x0: Point, options: &SolverOptions, problem: ArgMinAdapter<'a>, solver: S,
) -> FunctionResult<MinimizeOutcome>
where
    S: Solver<ArgMinAdapter<'a>, IterState<Point, Grad, (), (), (), Cost>> + Send + 'static,
{
    let mut executor = Executor::new(problem, solver).configure(|state| state.param(x0));
    if let Some(max_iter) = options.max_iter {
        executor = executor.configure(|state| state.max_iters(max_iter as u64));
    }

    let mut result = executor.run()?.state().clone();
    let iterations = result.get_iter();
    let fn_evals = result.get_func_counts().clone();
    let termination = result.get_termination_status().clone();
    let grad = result.take_gradient();
    MinimizeOutcome::new(result.take_best_param(), result.get_best_cost(), termination, iterations, fn_evals, grad)
}

// ---- Helper methods ----

fn verify_tolerance(key: &str, tolerance: Option<f64>) -> FunctionResult<()> {
    match tolerance {
        Some(value) if !value.is_finite() || value <= 0.0 => Err(FunctionError::InvalidOption {
            key: key.to_string(),
            value,
            reason: "tolerance must be finite and strictly positive",
        }),
        _ => Ok(()),
    }
}
