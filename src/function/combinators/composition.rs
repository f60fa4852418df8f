//! combinators::composition — `h = f ∘ g` and its chain rules.
//!
//! Purpose
//! -------
//! Compose an outer evaluation `f` ("left") with an inner evaluation `g`
//! ("right"), and propagate first and second derivatives:
//!
//! - `Dh(x) = Dg(x) · Df(g(x))` (Jacobian-transposed layout, `n × k · k × m`);
//! - `D²h_l(x) = Dg(x) · D²f_l(y) · Dg(x)ᵀ + Σᵢ ∂f_l/∂yᵢ(y) · D²gᵢ(x)`.
//!
//! Invariants & assumptions
//! ------------------------
//! - `g.output_dimension() == f.input_dimension()`; checked once at
//!   construction, not per call.
//! - Parameters are ordered `[θ_g, θ_f]` (inner first). Derivative pieces
//!   follow the same order so a triad stays consistent.
//!
//! Conventions
//! -----------
//! - The composed gradient and Hessian store the inner evaluation to obtain
//!   `y = g(x)`; the generic marginals reuse this machinery with a
//!   [`ZeroEvaluation`](crate::function::analytic::ZeroEvaluation) placeholder
//!   since the outer projection is linear.
use crate::function::{
    core::{
        description::Description,
        linalg::stack_rows,
        sample::Sample,
        state::{DerivativeState, EvaluationState},
        tensor::SymmetricTensor,
        types::{Matrix, Point},
        validation::{concat_points, split_parameter},
    },
    errors::{FunctionError, FunctionResult},
    evaluation::{Evaluation, EvaluationHandle},
    finite_diff::CenteredFiniteDifferenceGradient,
    gradient::{Gradient, GradientHandle},
    hessian::{Hessian, HessianHandle},
};

/// Set `parameter` on a handle only when its dimension fits.
///
/// Derivative pieces hold shared handles to evaluations that belong to other
/// pieces of the same triad; this keeps them in step when a derivative is
/// updated on its own.
fn sync_parameter(dimension: usize, parameter: &Point, set: impl FnOnce(&Point) -> FunctionResult<()>) -> FunctionResult<()> {
    if dimension == parameter.len() {
        set(parameter)?;
    }
    Ok(())
}

/// ComposedEvaluation — `h(x) = left(right(x))`.
#[derive(Debug)]
pub struct ComposedEvaluation {
    left: EvaluationHandle,
    right: EvaluationHandle,
    left_gradient: Option<GradientHandle>,
    state: EvaluationState,
}

impl ComposedEvaluation {
    /// Errors
    /// ------
    /// - `FunctionError::CompositionDimMismatch`
    ///   Returned when `right.output_dimension() != left.input_dimension()`.
    pub fn new(left: EvaluationHandle, right: EvaluationHandle) -> FunctionResult<Self> {
        if right.output_dimension() != left.input_dimension() {
            return Err(FunctionError::CompositionDimMismatch {
                inner_output: right.output_dimension(),
                outer_input: left.input_dimension(),
            });
        }
        Ok(ComposedEvaluation { left, right, left_gradient: None, state: EvaluationState::default() })
    }

    /// Attach the outer gradient used by the analytical parameter gradient.
    /// Without it a centered finite difference of `left` is used.
    pub fn with_left_gradient(mut self, left_gradient: GradientHandle) -> Self {
        self.left_gradient = Some(left_gradient);
        self
    }

    pub fn left(&self) -> &EvaluationHandle {
        &self.left
    }

    pub fn right(&self) -> &EvaluationHandle {
        &self.right
    }

    fn left_gradient_at(&self, y: &Point) -> FunctionResult<Matrix> {
        match &self.left_gradient {
            Some(gradient) => gradient.gradient(y),
            None => CenteredFiniteDifferenceGradient::with_default_step(self.left.clone())?.gradient(y),
        }
    }
}

impl Evaluation for ComposedEvaluation {
    fn name(&self) -> &'static str {
        "ComposedEvaluation"
    }

    fn input_dimension(&self) -> usize {
        self.right.input_dimension()
    }

    fn output_dimension(&self) -> usize {
        self.left.output_dimension()
    }

    fn state(&self) -> &EvaluationState {
        &self.state
    }

    fn compute(&self, x: &Point) -> FunctionResult<Point> {
        self.left.evaluate(&self.right.evaluate(x)?)
    }

    fn compute_sample(&self, xs: &Sample) -> FunctionResult<Sample> {
        self.left.evaluate_sample(&self.right.evaluate_sample(xs)?)
    }

    fn parameter(&self) -> Point {
        concat_points(&[self.right.parameter(), self.left.parameter()])
    }

    fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        let blocks =
            split_parameter(parameter, &[self.right.parameter_dimension(), self.left.parameter_dimension()])?;
        self.right.set_parameter(&blocks[0])?;
        self.left.set_parameter(&blocks[1])?;
        self.state.clear_cache();
        Ok(())
    }

    fn parameter_description(&self) -> Description {
        self.right.parameter_description().concat(&self.left.parameter_description())
    }

    /// `[∂g/∂θ_g · Df(y) ; ∂f/∂θ_f (y)]` with `y = g(x)`.
    fn parameter_gradient(&self, x: &Point) -> FunctionResult<Matrix> {
        let y = self.right.evaluate(x)?;
        let right_block = self.right.parameter_gradient(x)?;
        let right_block = if right_block.nrows() > 0 {
            right_block.dot(&self.left_gradient_at(&y)?)
        } else {
            Matrix::zeros((0, self.output_dimension()))
        };
        let left_block = self.left.parameter_gradient(&y)?;
        stack_rows(&[right_block, left_block], self.output_dimension())
    }

    fn default_input_description(&self) -> Description {
        self.right.input_description()
    }

    fn default_output_description(&self) -> Description {
        self.left.output_description()
    }
}

/// ComposedGradient — `Dh(x) = Dg(x) · Df(g(x))`.
#[derive(Debug)]
pub struct ComposedGradient {
    left_gradient: GradientHandle,
    right_evaluation: EvaluationHandle,
    right_gradient: GradientHandle,
    state: DerivativeState,
}

impl ComposedGradient {
    /// Errors
    /// ------
    /// - `FunctionError::IncompatiblePieces`
    ///   Returned when the inner evaluation and gradient disagree on shape or
    ///   when the inner output does not feed the outer gradient.
    pub fn new(
        left_gradient: GradientHandle, right_evaluation: EvaluationHandle,
        right_gradient: GradientHandle,
    ) -> FunctionResult<Self> {
        check_inner_pair(&right_evaluation, right_gradient.input_dimension(), right_gradient.output_dimension())?;
        if left_gradient.input_dimension() != right_evaluation.output_dimension() {
            return Err(FunctionError::IncompatiblePieces {
                combinator: "ComposedGradient",
                reason: format!(
                    "outer gradient expects {} inputs, inner evaluation yields {}",
                    left_gradient.input_dimension(),
                    right_evaluation.output_dimension()
                ),
            });
        }
        Ok(ComposedGradient { left_gradient, right_evaluation, right_gradient, state: DerivativeState::default() })
    }
}

impl Gradient for ComposedGradient {
    fn name(&self) -> &'static str {
        "ComposedGradient"
    }

    fn input_dimension(&self) -> usize {
        self.right_gradient.input_dimension()
    }

    fn output_dimension(&self) -> usize {
        self.left_gradient.output_dimension()
    }

    fn state(&self) -> &DerivativeState {
        &self.state
    }

    fn compute(&self, x: &Point) -> FunctionResult<Matrix> {
        let y = self.right_evaluation.evaluate(x)?;
        let inner = self.right_gradient.gradient(x)?;
        let outer = self.left_gradient.gradient(&y)?;
        Ok(inner.dot(&outer))
    }

    fn parameter(&self) -> Point {
        concat_points(&[self.right_gradient.parameter(), self.left_gradient.parameter()])
    }

    fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        let blocks = split_parameter(
            parameter,
            &[self.right_gradient.parameter_dimension(), self.left_gradient.parameter_dimension()],
        )?;
        self.right_gradient.set_parameter(&blocks[0])?;
        self.left_gradient.set_parameter(&blocks[1])?;
        sync_parameter(self.right_evaluation.parameter_dimension(), &blocks[0], |p| {
            self.right_evaluation.set_parameter(p)
        })
    }
}

/// ComposedHessian — second-order chain rule.
#[derive(Debug)]
pub struct ComposedHessian {
    left_gradient: GradientHandle,
    left_hessian: HessianHandle,
    right_evaluation: EvaluationHandle,
    right_gradient: GradientHandle,
    right_hessian: HessianHandle,
    state: DerivativeState,
}

impl ComposedHessian {
    /// Errors
    /// ------
    /// - `FunctionError::IncompatiblePieces`
    ///   Returned when any of the five pieces disagrees with the others on
    ///   input or output dimension.
    pub fn new(
        left_gradient: GradientHandle, left_hessian: HessianHandle,
        right_evaluation: EvaluationHandle, right_gradient: GradientHandle,
        right_hessian: HessianHandle,
    ) -> FunctionResult<Self> {
        check_inner_pair(&right_evaluation, right_gradient.input_dimension(), right_gradient.output_dimension())?;
        check_inner_pair(&right_evaluation, right_hessian.input_dimension(), right_hessian.output_dimension())?;
        let k = right_evaluation.output_dimension();
        let consistent = left_gradient.input_dimension() == k
            && left_hessian.input_dimension() == k
            && left_gradient.output_dimension() == left_hessian.output_dimension();
        if !consistent {
            return Err(FunctionError::IncompatiblePieces {
                combinator: "ComposedHessian",
                reason: format!(
                    "outer gradient is {}→{}, outer Hessian is {}→{}, inner output is {k}",
                    left_gradient.input_dimension(),
                    left_gradient.output_dimension(),
                    left_hessian.input_dimension(),
                    left_hessian.output_dimension()
                ),
            });
        }
        Ok(ComposedHessian {
            left_gradient,
            left_hessian,
            right_evaluation,
            right_gradient,
            right_hessian,
            state: DerivativeState::default(),
        })
    }
}

impl Hessian for ComposedHessian {
    fn name(&self) -> &'static str {
        "ComposedHessian"
    }

    fn input_dimension(&self) -> usize {
        self.right_hessian.input_dimension()
    }

    fn output_dimension(&self) -> usize {
        self.left_hessian.output_dimension()
    }

    fn state(&self) -> &DerivativeState {
        &self.state
    }

    fn compute(&self, x: &Point) -> FunctionResult<SymmetricTensor> {
        let y = self.right_evaluation.evaluate(x)?;
        let inner_gradient = self.right_gradient.gradient(x)?;
        let inner_hessian = self.right_hessian.hessian(x)?;
        let outer_gradient = self.left_gradient.gradient(&y)?;
        let outer_hessian = self.left_hessian.hessian(&y)?;
        let n = x.len();
        let k = y.len();
        let m = self.output_dimension();
        let mut hessian = SymmetricTensor::zeros(n, m);
        for l in 0..m {
            let mut sheet = inner_gradient.dot(&outer_hessian.sheet(l)).dot(&inner_gradient.t());
            for i in 0..k {
                let weight = outer_gradient[[i, l]];
                if weight != 0.0 {
                    sheet.scaled_add(weight, &inner_hessian.sheet(i));
                }
            }
            hessian.set_sheet(l, &sheet);
        }
        Ok(hessian)
    }

    fn parameter(&self) -> Point {
        concat_points(&[self.right_hessian.parameter(), self.left_hessian.parameter()])
    }

    fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        let blocks = split_parameter(
            parameter,
            &[self.right_hessian.parameter_dimension(), self.left_hessian.parameter_dimension()],
        )?;
        self.right_hessian.set_parameter(&blocks[0])?;
        self.left_hessian.set_parameter(&blocks[1])?;
        sync_parameter(self.right_gradient.parameter_dimension(), &blocks[0], |p| {
            self.right_gradient.set_parameter(p)
        })?;
        sync_parameter(self.left_gradient.parameter_dimension(), &blocks[1], |p| {
            self.left_gradient.set_parameter(p)
        })?;
        sync_parameter(self.right_evaluation.parameter_dimension(), &blocks[0], |p| {
            self.right_evaluation.set_parameter(p)
        })
    }
}

// ---- Helper methods ----

fn check_inner_pair(evaluation: &EvaluationHandle, input: usize, output: usize) -> FunctionResult<()> {
    if evaluation.input_dimension() != input || evaluation.output_dimension() != output {
        return Err(FunctionError::IncompatiblePieces {
            combinator: "composition",
            reason: format!(
                "inner evaluation is {}→{}, inner derivative is {input}→{output}",
                evaluation.input_dimension(),
                evaluation.output_dimension()
            ),
        });
    }
    Ok(())
}
