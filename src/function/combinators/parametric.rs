//! combinators::parametric — freeze some inputs of a function as parameters.
//!
//! Purpose
//! -------
//! Turn `f : ℝⁿ → ℝᵐ` into `g(x; θ) = f(x ⊕ θ)` where the positions listed
//! as parameter positions are filled from `θ` and the remaining positions
//! (in increasing order) from `x`. The frozen values become `g`'s parameter
//! vector, so `set_parameter` moves them.
//!
//! Key behaviors
//! -------------
//! - [`ParametricEvaluation::new`] names the frozen positions;
//!   [`ParametricEvaluation::on_inputs`] names the free ones and freezes the
//!   complement at a reference point.
//! - Gradient and Hessian select the rows (and sheets) of the underlying
//!   derivative at the free positions. `parameter_gradient` selects the
//!   rows at the frozen positions.
//! - Descriptions come from the underlying function: input names at the
//!   free positions, parameter names at the frozen ones.
//!
//! Invariants & assumptions
//! ------------------------
//! - Free and frozen positions partition `0..n`.
//! - The derivative pieces share the evaluation through an `Arc`, so a
//!   parameter update made through any of them is seen by all three.
use crate::function::{
    core::{
        description::Description,
        sample::Sample,
        state::{DerivativeState, EvaluationState},
        tensor::SymmetricTensor,
        types::{Matrix, Point},
        validation::{complement_indices, validate_indices, validate_input_dim},
    },
    errors::{FunctionError, FunctionResult},
    evaluation::{Evaluation, EvaluationHandle},
    finite_diff::CenteredFiniteDifferenceGradient,
    gradient::{Gradient, GradientHandle},
    hessian::{Hessian, HessianHandle},
};
use ndarray::{Array2, Axis};
use std::sync::Arc;

/// ParametricEvaluation — `x ↦ f(x ⊕ θ)`.
#[derive(Debug)]
pub struct ParametricEvaluation {
    function: EvaluationHandle,
    gradient: Option<GradientHandle>,
    parameter_positions: Vec<usize>,
    input_positions: Vec<usize>,
    state: EvaluationState,
}

impl ParametricEvaluation {
    /// Freeze `parameter_positions` of `function` at `parameter_values`.
    ///
    /// Errors
    /// ------
    /// - `EmptyIndices`, `IndexOutOfRange`, `DuplicateIndex`
    ///   Returned for invalid positions.
    /// - `ParameterDimMismatch`
    ///   Returned when `parameter_values.len() != parameter_positions.len()`.
    pub fn new(
        function: EvaluationHandle, parameter_positions: &[usize], parameter_values: Point,
    ) -> FunctionResult<Self> {
        validate_indices(parameter_positions, function.input_dimension())?;
        if parameter_values.len() != parameter_positions.len() {
            return Err(FunctionError::ParameterDimMismatch {
                expected: parameter_positions.len(),
                found: parameter_values.len(),
            });
        }
        Self::build(function, parameter_positions.to_vec(), parameter_values)
    }

    /// Keep `input_positions` free and freeze every other position at the
    /// matching coordinate of `reference_point`.
    ///
    /// Errors
    /// ------
    /// - Index errors for invalid `input_positions`.
    /// - `InputDimMismatch` when `reference_point` is not a full input.
    pub fn on_inputs(
        function: EvaluationHandle, input_positions: &[usize], reference_point: &Point,
    ) -> FunctionResult<Self> {
        let n = function.input_dimension();
        validate_indices(input_positions, n)?;
        validate_input_dim(reference_point.len(), n)?;
        let parameter_positions = complement_indices(input_positions, n);
        let values = reference_point.select(Axis(0), &parameter_positions);
        Self::build(function, parameter_positions, values)
    }

    fn build(
        function: EvaluationHandle, parameter_positions: Vec<usize>, parameter_values: Point,
    ) -> FunctionResult<Self> {
        let input_positions = complement_indices(&parameter_positions, function.input_dimension());
        let state = EvaluationState::new(parameter_values);
        state.set_parameter_description(function.input_description().select(&parameter_positions))?;
        Ok(ParametricEvaluation { function, gradient: None, parameter_positions, input_positions, state })
    }

    /// Attach the analytical gradient of the underlying function; used by
    /// `parameter_gradient`. Without it a centered finite difference is used.
    pub fn with_gradient(mut self, gradient: GradientHandle) -> Self {
        self.gradient = Some(gradient);
        self
    }

    pub fn function(&self) -> &EvaluationHandle {
        &self.function
    }

    pub fn parameter_positions(&self) -> &[usize] {
        &self.parameter_positions
    }

    pub fn input_positions(&self) -> &[usize] {
        &self.input_positions
    }

    /// Rebuild the full input of the underlying function from the free
    /// coordinates `x` and the current parameter.
    pub fn full_point(&self, x: &Point) -> Point {
        let theta = self.state.parameter();
        let mut full = Point::zeros(self.function.input_dimension());
        for (&pos, &value) in self.input_positions.iter().zip(x.iter()) {
            full[pos] = value;
        }
        for (&pos, &value) in self.parameter_positions.iter().zip(theta.iter()) {
            full[pos] = value;
        }
        full
    }

    fn full_sample(&self, xs: &Sample) -> Sample {
        let theta = self.state.parameter();
        let mut full = Array2::zeros((xs.size(), self.function.input_dimension()));
        let data = xs.data();
        for (j, &pos) in self.input_positions.iter().enumerate() {
            full.column_mut(pos).assign(&data.column(j));
        }
        for (&pos, &value) in self.parameter_positions.iter().zip(theta.iter()) {
            full.column_mut(pos).fill(value);
        }
        Sample::new(full)
    }
}

impl Evaluation for ParametricEvaluation {
    fn name(&self) -> &'static str {
        "ParametricEvaluation"
    }

    fn input_dimension(&self) -> usize {
        self.input_positions.len()
    }

    fn output_dimension(&self) -> usize {
        self.function.output_dimension()
    }

    fn state(&self) -> &EvaluationState {
        &self.state
    }

    fn compute(&self, x: &Point) -> FunctionResult<Point> {
        self.function.evaluate(&self.full_point(x))
    }

    fn compute_sample(&self, xs: &Sample) -> FunctionResult<Sample> {
        self.function.evaluate_sample(&self.full_sample(xs))
    }

    /// Rows of the full gradient at the frozen positions.
    fn parameter_gradient(&self, x: &Point) -> FunctionResult<Matrix> {
        validate_input_dim(x.len(), self.input_dimension())?;
        let full = self.full_point(x);
        let gradient = match &self.gradient {
            Some(gradient) => gradient.gradient(&full)?,
            None => CenteredFiniteDifferenceGradient::with_default_step(self.function.clone())?.gradient(&full)?,
        };
        Ok(gradient.select(Axis(0), &self.parameter_positions))
    }

    fn default_input_description(&self) -> Description {
        self.function.input_description().select(&self.input_positions)
    }

    fn default_output_description(&self) -> Description {
        self.function.output_description()
    }
}

/// ParametricGradient — free-position rows of the underlying gradient.
#[derive(Debug)]
pub struct ParametricGradient {
    evaluation: Arc<ParametricEvaluation>,
    gradient: GradientHandle,
    state: DerivativeState,
}

impl ParametricGradient {
    /// Errors
    /// ------
    /// - `FunctionError::IncompatiblePieces`
    ///   Returned when `gradient` does not match the underlying function.
    pub fn new(evaluation: Arc<ParametricEvaluation>, gradient: GradientHandle) -> FunctionResult<Self> {
        check_underlying(
            "ParametricGradient",
            &evaluation,
            (gradient.input_dimension(), gradient.output_dimension()),
        )?;
        Ok(ParametricGradient { evaluation, gradient, state: DerivativeState::default() })
    }
}

impl Gradient for ParametricGradient {
    fn name(&self) -> &'static str {
        "ParametricGradient"
    }

    fn input_dimension(&self) -> usize {
        self.evaluation.input_dimension()
    }

    fn output_dimension(&self) -> usize {
        self.evaluation.output_dimension()
    }

    fn state(&self) -> &DerivativeState {
        &self.state
    }

    fn compute(&self, x: &Point) -> FunctionResult<Matrix> {
        let full = self.gradient.gradient(&self.evaluation.full_point(x))?;
        Ok(full.select(Axis(0), self.evaluation.input_positions()))
    }

    fn parameter(&self) -> Point {
        self.evaluation.parameter()
    }

    fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        self.evaluation.set_parameter(parameter)
    }
}

/// ParametricHessian — free-position block of the underlying Hessian.
#[derive(Debug)]
pub struct ParametricHessian {
    evaluation: Arc<ParametricEvaluation>,
    hessian: HessianHandle,
    state: DerivativeState,
}

impl ParametricHessian {
    /// Restrict the Hessian of the underlying function to the free inputs.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::IncompatiblePieces`
    ///   Returned when `hessian` does not match the underlying function.
    pub fn new(evaluation: Arc<ParametricEvaluation>, hessian: HessianHandle) -> FunctionResult<Self> {
        check_underlying("ParametricHessian", &evaluation, (hessian.input_dimension(), hessian.output_dimension()))?;
        Ok(ParametricHessian { evaluation, hessian, state: DerivativeState::default() })
    }
}

impl Hessian for ParametricHessian {
    fn name(&self) -> &'static str {
        "ParametricHessian"
    }

    fn input_dimension(&self) -> usize {
        self.evaluation.input_dimension()
    }

    fn output_dimension(&self) -> usize {
        self.evaluation.output_dimension()
    }

    fn state(&self) -> &DerivativeState {
        &self.state
    }

    fn compute(&self, x: &Point) -> FunctionResult<SymmetricTensor> {
        let full = self.hessian.hessian(&self.evaluation.full_point(x))?;
        let sheets: Vec<usize> = (0..full.nsheets()).collect();
        Ok(full.select(self.evaluation.input_positions(), &sheets))
    }

    fn parameter(&self) -> Point {
        self.evaluation.parameter()
    }

    fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        self.evaluation.set_parameter(parameter)
    }
}

// ---- Helper methods ----

fn check_underlying(
    combinator: &'static str, evaluation: &ParametricEvaluation, shape: (usize, usize),
) -> FunctionResult<()> {
    let f = evaluation.function();
    if (f.input_dimension(), f.output_dimension()) != shape {
        return Err(FunctionError::IncompatiblePieces {
            combinator,
            reason: format!(
                "underlying function is {}→{}, derivative is {}→{}",
                f.input_dimension(),
                f.output_dimension(),
                shape.0,
                shape.1
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::analytic::{ClosureGradient, ClosureEvaluation, ClosureHessian};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Freezing positions and evaluating on the free ones.
    // - The complementary constructor on free positions.
    // - Row/sheet selection of the underlying derivatives.
    // - Parameter updates shared across the three pieces.
    // -------------------------------------------------------------------------

    // f(x0, x1, x2) = x0 x1 + x2²
    fn base() -> EvaluationHandle {
        Arc::new(ClosureEvaluation::new(3, 1, |x| Ok(array![x[0] * x[1] + x[2] * x[2]])))
    }

    fn base_gradient() -> GradientHandle {
        Arc::new(ClosureGradient::new(3, 1, |x| Ok(array![[x[1]], [x[0]], [2.0 * x[2]]])))
    }

    #[test]
    // Purpose
    // -------
    // Verify evaluation and parameter bookkeeping after freezing x1.
    //
    // Given
    // -----
    // - f with x1 frozen at 3, evaluated at free point [2, 1].
    //
    // Expect
    // ------
    // - g = 3·2 + 1 = 7; input dimension 2; parameter [3] named "x1".
    // - After set_parameter([4]): g = 9.
    fn freezing_a_position_makes_it_a_parameter() {
        // Arrange
        let g = ParametricEvaluation::new(base(), &[1], array![3.0]).unwrap();
        let x = array![2.0, 1.0];

        // Act
        let before = g.evaluate(&x).unwrap();
        g.set_parameter(&array![4.0]).unwrap();
        let after = g.evaluate(&x).unwrap();

        // Assert
        assert_eq!(g.input_dimension(), 2);
        assert_eq!(before, array![7.0]);
        assert_eq!(after, array![9.0]);
        assert_eq!(g.parameter_description().as_slice(), &["x1"]);
        assert_eq!(g.input_description().as_slice(), &["x0", "x2"]);
    }

    #[test]
    // Purpose
    // -------
    // Ensure both constructors agree and validate their arguments.
    //
    // Given
    // -----
    // - `on_inputs([0, 2], [9, 3, 9])` against `new([1], [3])`.
    // - Two values for one position.
    //
    // Expect
    // ------
    // - Same value on a sample; `ParameterDimMismatch { expected: 1, found: 2 }`.
    fn constructors_agree_and_validate() {
        // Arrange
        let a = ParametricEvaluation::new(base(), &[1], array![3.0]).unwrap();
        let b = ParametricEvaluation::on_inputs(base(), &[0, 2], &array![9.0, 3.0, 9.0]).unwrap();
        let xs = Sample::new(array![[2.0, 1.0], [0.0, 5.0]]);

        // Act
        let ya = a.evaluate_sample(&xs).unwrap();
        let yb = b.evaluate_sample(&xs).unwrap();
        let err = ParametricEvaluation::new(base(), &[1], array![3.0, 4.0]).expect_err("too many values");

        // Assert
        assert_eq!(ya.data(), yb.data());
        assert_eq!(ya.data(), array![[7.0], [25.0]]);
        assert_eq!(err, FunctionError::ParameterDimMismatch { expected: 1, found: 2 });
    }

    #[test]
    // Purpose
    // -------
    // Check gradient, Hessian, and parameter gradient selection.
    //
    // Given
    // -----
    // - x1 frozen at 3 and free point [2, 1].
    //
    // Expect
    // ------
    // - ∇g = [x1, 2 x2] = [3, 2]; D²g = [[0, 0], [0, 2]].
    // - ∂g/∂θ = x0 = 2.
    fn derivatives_select_free_and_frozen_rows() {
        // Arrange
        let eval = Arc::new(ParametricEvaluation::new(base(), &[1], array![3.0]).unwrap().with_gradient(base_gradient()));
        let hess: HessianHandle = Arc::new(ClosureHessian::new(3, 1, |_| {
            SymmetricTensor::from_sheets(3, &[array![[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 2.0]]])
        }));
        let grad = ParametricGradient::new(eval.clone(), base_gradient()).unwrap();
        let hess = ParametricHessian::new(eval.clone(), hess).unwrap();
        let x = array![2.0, 1.0];

        // Act
        let d = grad.gradient(&x).unwrap();
        let d2 = hess.hessian(&x).unwrap();
        let pg = eval.parameter_gradient(&x).unwrap();

        // Assert
        assert_eq!(d, array![[3.0], [2.0]]);
        assert_eq!(d2.sheet(0), array![[0.0, 0.0], [0.0, 2.0]]);
        assert_abs_diff_eq!(pg, array![[2.0]], epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Verify a parameter set through the gradient reaches the evaluation.
    //
    // Given
    // -----
    // - A parametric gradient sharing the evaluation; set_parameter([5]).
    //
    // Expect
    // ------
    // - The evaluation parameter is [5] and ∂g/∂x0 = 5.
    fn parameter_updates_are_shared() {
        // Arrange
        let eval = Arc::new(ParametricEvaluation::new(base(), &[1], array![3.0]).unwrap());
        let grad = ParametricGradient::new(eval.clone(), base_gradient()).unwrap();

        // Act
        grad.set_parameter(&array![5.0]).unwrap();
        let d = grad.gradient(&array![2.0, 1.0]).unwrap();

        // Assert
        assert_eq!(eval.parameter(), array![5.0]);
        assert_eq!(d[[0, 0]], 5.0);
    }
}
