//! function::analytic — leaf evaluations, gradients and Hessians.
//!
//! Purpose
//! -------
//! Provide the concrete building blocks every composite function bottoms
//! out in:
//! - closure-backed pieces ([`ClosureEvaluation`], [`ClosureGradient`],
//!   [`ClosureHessian`]) receiving the point and the current parameter;
//! - affine maps ([`LinearEvaluation`]) and their constant derivatives
//!   ([`ConstantGradient`], [`ConstantHessian`]);
//! - [`ZeroEvaluation`], a shape placeholder for the generic marginals.
//!
//! Conventions
//! -----------
//! - Closures return `FunctionResult` so user code can report failures;
//!   output shapes are checked by the public `evaluate`/`gradient`/`hessian`
//!   wrappers.
//! - Parametric closures read the parameter from the piece's own state on
//!   every call, so `set_parameter` takes effect immediately.
use crate::function::{
    core::{
        linalg::projection_matrix,
        sample::Sample,
        state::{DerivativeState, EvaluationState},
        tensor::SymmetricTensor,
        types::{Matrix, Point},
    },
    errors::{FunctionError, FunctionResult},
    evaluation::Evaluation,
    gradient::Gradient,
    hessian::Hessian,
};
use std::{fmt, sync::Arc};

type PointMap = Arc<dyn Fn(&Point, &Point) -> FunctionResult<Point> + Send + Sync>;
type MatrixMap = Arc<dyn Fn(&Point, &Point) -> FunctionResult<Matrix> + Send + Sync>;
type TensorMap = Arc<dyn Fn(&Point, &Point) -> FunctionResult<SymmetricTensor> + Send + Sync>;

// ---- Closures ----

/// Evaluation backed by a closure `(x, θ) ↦ y`.
pub struct ClosureEvaluation {
    input_dimension: usize,
    output_dimension: usize,
    function: PointMap,
    state: EvaluationState,
}

impl ClosureEvaluation {
    /// Non-parametric evaluation `x ↦ f(x)`.
    ///
    /// Examples
    /// --------
    /// ```
    /// use ndarray::array;
    /// use rust_numfunc::function::prelude::*;
    ///
    /// let square = ClosureEvaluation::new(1, 1, |x| Ok(array![x[0] * x[0]]));
    /// assert_eq!(square.evaluate(&array![3.0]).unwrap(), array![9.0]);
    /// ```
    pub fn new<F>(input_dimension: usize, output_dimension: usize, function: F) -> Self
    where
        F: Fn(&Point) -> FunctionResult<Point> + Send + Sync + 'static,
    {
        Self::parametric(input_dimension, output_dimension, Point::zeros(0), move |x, _| function(x))
    }

    /// Parametric evaluation `x ↦ f(x; θ)` starting at `parameter`.
    pub fn parametric<F>(
        input_dimension: usize, output_dimension: usize, parameter: Point, function: F,
    ) -> Self
    where
        F: Fn(&Point, &Point) -> FunctionResult<Point> + Send + Sync + 'static,
    {
        ClosureEvaluation {
            input_dimension,
            output_dimension,
            function: Arc::new(function),
            state: EvaluationState::new(parameter),
        }
    }
}

impl fmt::Debug for ClosureEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureEvaluation")
            .field("input_dimension", &self.input_dimension)
            .field("output_dimension", &self.output_dimension)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Evaluation for ClosureEvaluation {
    fn name(&self) -> &'static str {
        "ClosureEvaluation"
    }

    fn input_dimension(&self) -> usize {
        self.input_dimension
    }

    fn output_dimension(&self) -> usize {
        self.output_dimension
    }

    fn state(&self) -> &EvaluationState {
        &self.state
    }

    fn compute(&self, x: &Point) -> FunctionResult<Point> {
        (self.function)(x, &self.state.parameter())
    }
}

/// Gradient backed by a closure `(x, θ) ↦ ∇f(x; θ)`.
pub struct ClosureGradient {
    input_dimension: usize,
    output_dimension: usize,
    function: MatrixMap,
    state: DerivativeState,
}

impl ClosureGradient {
    /// Gradient from a closure returning the `n × m` matrix at `x`.
    ///
    /// Parameters
    /// ----------
    /// - `input_dimension`, `output_dimension`: `usize`
    ///   Must match the evaluation the gradient is paired with.
    /// - `function`: `F`
    ///   Called once per public `gradient` call; its shape is checked
    ///   afterwards.
    pub fn new<F>(input_dimension: usize, output_dimension: usize, function: F) -> Self
    where
        F: Fn(&Point) -> FunctionResult<Matrix> + Send + Sync + 'static,
    {
        Self::parametric(input_dimension, output_dimension, Point::zeros(0), move |x, _| function(x))
    }

    /// Parametric gradient `x ↦ ∇ₓf(x; θ)`.
    ///
    /// `parameter` should have the evaluation's length so that
    /// `Function::set_parameter` keeps both in step.
    pub fn parametric<F>(
        input_dimension: usize, output_dimension: usize, parameter: Point, function: F,
    ) -> Self
    where
        F: Fn(&Point, &Point) -> FunctionResult<Matrix> + Send + Sync + 'static,
    {
        ClosureGradient {
            input_dimension,
            output_dimension,
            function: Arc::new(function),
            state: DerivativeState::new(parameter),
        }
    }
}

impl fmt::Debug for ClosureGradient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureGradient")
            .field("input_dimension", &self.input_dimension)
            .field("output_dimension", &self.output_dimension)
            .finish_non_exhaustive()
    }
}

impl Gradient for ClosureGradient {
    fn name(&self) -> &'static str {
        "ClosureGradient"
    }

    fn input_dimension(&self) -> usize {
        self.input_dimension
    }

    fn output_dimension(&self) -> usize {
        self.output_dimension
    }

    fn state(&self) -> &DerivativeState {
        &self.state
    }

    fn compute(&self, x: &Point) -> FunctionResult<Matrix> {
        (self.function)(x, &self.state.parameter())
    }
}

/// Hessian backed by a closure `(x, θ) ↦ D²f(x; θ)`.
pub struct ClosureHessian {
    input_dimension: usize,
    output_dimension: usize,
    function: TensorMap,
    state: DerivativeState,
}

impl ClosureHessian {
    /// Hessian from a closure returning the `n × n × m` tensor at `x`.
    pub fn new<F>(input_dimension: usize, output_dimension: usize, function: F) -> Self
    where
        F: Fn(&Point) -> FunctionResult<SymmetricTensor> + Send + Sync + 'static,
    {
        Self::parametric(input_dimension, output_dimension, Point::zeros(0), move |x, _| function(x))
    }

    pub fn parametric<F>(
        input_dimension: usize, output_dimension: usize, parameter: Point, function: F,
    ) -> Self
    where
        F: Fn(&Point, &Point) -> FunctionResult<SymmetricTensor> + Send + Sync + 'static,
    {
        ClosureHessian {
            input_dimension,
            output_dimension,
            function: Arc::new(function),
            state: DerivativeState::new(parameter),
        }
    }
}

impl fmt::Debug for ClosureHessian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureHessian")
            .field("input_dimension", &self.input_dimension)
            .field("output_dimension", &self.output_dimension)
            .finish_non_exhaustive()
    }
}

impl Hessian for ClosureHessian {
    fn name(&self) -> &'static str {
        "ClosureHessian"
    }

    fn input_dimension(&self) -> usize {
        self.input_dimension
    }

    fn output_dimension(&self) -> usize {
        self.output_dimension
    }

    fn state(&self) -> &DerivativeState {
        &self.state
    }

    fn compute(&self, x: &Point) -> FunctionResult<SymmetricTensor> {
        (self.function)(x, &self.state.parameter())
    }
}

// ---- Affine maps ----

/// LinearEvaluation — affine map `y = c + Lᵀ (x − x₀)`.
///
/// Fields
/// ------
/// - `center`: `x₀ ∈ ℝⁿ`.
/// - `constant`: `c ∈ ℝᵐ`.
/// - `linear`: `L`, an `n × m` matrix (Jacobian-transposed layout, so `L`
///   is also the gradient).
#[derive(Debug)]
pub struct LinearEvaluation {
    center: Point,
    constant: Point,
    linear: Matrix,
    state: EvaluationState,
}

impl LinearEvaluation {
    /// Errors
    /// ------
    /// - `FunctionError::IncompatiblePieces`
    ///   Returned when `linear` is not `center.len() × constant.len()`.
    pub fn new(center: Point, constant: Point, linear: Matrix) -> FunctionResult<Self> {
        if linear.dim() != (center.len(), constant.len()) {
            return Err(FunctionError::IncompatiblePieces {
                combinator: "LinearEvaluation",
                reason: format!(
                    "linear term is {:?}, expected ({}, {})",
                    linear.dim(),
                    center.len(),
                    constant.len()
                ),
            });
        }
        Ok(LinearEvaluation { center, constant, linear, state: EvaluationState::default() })
    }

    /// Selection `ℝ^dim → ℝ^k` keeping `indices` in order.
    ///
    /// Callers validate `indices` against `dim`.
    pub fn projection(dim: usize, indices: &[usize]) -> Self {
        LinearEvaluation {
            center: Point::zeros(dim),
            constant: Point::zeros(indices.len()),
            linear: projection_matrix(dim, indices),
            state: EvaluationState::default(),
        }
    }

    pub fn linear(&self) -> &Matrix {
        &self.linear
    }
}

impl Evaluation for LinearEvaluation {
    fn name(&self) -> &'static str {
        "LinearEvaluation"
    }

    fn input_dimension(&self) -> usize {
        self.center.len()
    }

    fn output_dimension(&self) -> usize {
        self.constant.len()
    }

    fn state(&self) -> &EvaluationState {
        &self.state
    }

    fn compute(&self, x: &Point) -> FunctionResult<Point> {
        Ok(&self.constant + &self.linear.t().dot(&(x - &self.center)))
    }

    fn compute_sample(&self, xs: &Sample) -> FunctionResult<Sample> {
        let centered = &xs.data() - &self.center;
        Ok(Sample::new(centered.dot(&self.linear) + &self.constant))
    }
}

/// Gradient that does not depend on `x`.
#[derive(Debug)]
pub struct ConstantGradient {
    matrix: Matrix,
    state: DerivativeState,
}

impl ConstantGradient {
    /// Gradient that ignores `x`; `matrix` is `n × m`.
    pub fn new(matrix: Matrix) -> Self {
        ConstantGradient { matrix, state: DerivativeState::default() }
    }

    pub fn zeros(input_dimension: usize, output_dimension: usize) -> Self {
        Self::new(Matrix::zeros((input_dimension, output_dimension)))
    }
}

impl Gradient for ConstantGradient {
    fn name(&self) -> &'static str {
        "ConstantGradient"
    }

    fn input_dimension(&self) -> usize {
        self.matrix.nrows()
    }

    fn output_dimension(&self) -> usize {
        self.matrix.ncols()
    }

    fn state(&self) -> &DerivativeState {
        &self.state
    }

    fn compute(&self, _x: &Point) -> FunctionResult<Matrix> {
        Ok(self.matrix.clone())
    }
}

/// Hessian that does not depend on `x`.
#[derive(Debug)]
pub struct ConstantHessian {
    tensor: SymmetricTensor,
    state: DerivativeState,
}

impl ConstantHessian {
    /// Hessian that ignores `x`.
    pub fn new(tensor: SymmetricTensor) -> Self {
        ConstantHessian { tensor, state: DerivativeState::default() }
    }

    pub fn zeros(input_dimension: usize, output_dimension: usize) -> Self {
        Self::new(SymmetricTensor::zeros(input_dimension, output_dimension))
    }
}

impl Hessian for ConstantHessian {
    fn name(&self) -> &'static str {
        "ConstantHessian"
    }

    fn input_dimension(&self) -> usize {
        self.tensor.nrows()
    }

    fn output_dimension(&self) -> usize {
        self.tensor.nsheets()
    }

    fn state(&self) -> &DerivativeState {
        &self.state
    }

    fn compute(&self, _x: &Point) -> FunctionResult<SymmetricTensor> {
        Ok(self.tensor.clone())
    }
}

/// Constant zero map ℝⁿ → ℝᵐ.
#[derive(Debug)]
pub struct ZeroEvaluation {
    input_dimension: usize,
    output_dimension: usize,
    state: EvaluationState,
}

impl ZeroEvaluation {
    pub fn new(input_dimension: usize, output_dimension: usize) -> Self {
        ZeroEvaluation { input_dimension, output_dimension, state: EvaluationState::default() }
    }
}

impl Evaluation for ZeroEvaluation {
    fn name(&self) -> &'static str {
        "ZeroEvaluation"
    }

    fn input_dimension(&self) -> usize {
        self.input_dimension
    }

    fn output_dimension(&self) -> usize {
        self.output_dimension
    }

    fn state(&self) -> &EvaluationState {
        &self.state
    }

    fn compute(&self, _x: &Point) -> FunctionResult<Point> {
        Ok(Point::zeros(self.output_dimension))
    }

    fn compute_sample(&self, xs: &Sample) -> FunctionResult<Sample> {
        Ok(Sample::zeros(xs.size(), self.output_dimension))
    }
}
