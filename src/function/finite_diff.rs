//! function::finite_diff — centered finite-difference derivatives.
//!
//! Purpose
//! -------
//! Provide the numerical stand-ins used whenever no analytical derivative
//! is available: [`CenteredFiniteDifferenceGradient`] and
//! [`CenteredFiniteDifferenceHessian`], both built on top of an
//! [`EvaluationHandle`] with one step per input component.
//!
//! Key behaviors
//! -------------
//! - The whole stencil is assembled into one [`Sample`] and evaluated with
//!   a single `evaluate_sample` call, so batched evaluations (linear
//!   combinations, aggregations) see one batch instead of `2n` points.
//! - Gradient: `∂f_j/∂x_i ≈ (f_j(x + εᵢeᵢ) − f_j(x − εᵢeᵢ)) / (2εᵢ)`.
//! - Hessian diagonal: `(f(x + εᵢeᵢ) − 2f(x) + f(x − εᵢeᵢ)) / εᵢ²`;
//!   off-diagonal `(f₊₊ − f₊₋ − f₋₊ + f₋₋) / (4εᵢεⱼ)`, computed for `i < j`
//!   and mirrored.
//!
//! Invariants & assumptions
//! ------------------------
//! - Steps are finite, strictly positive, and one per input component.
//! - Parameters are those of the wrapped evaluation: reads and writes are
//!   forwarded, so a finite-difference piece never drifts from its value.
//!
//! Testing notes
//! -------------
//! - Unit tests compare against closed forms and against the `finitediff`
//!   crate's central differences.
use crate::function::{
    core::{
        options::{DEFAULT_GRADIENT_EPSILON, DEFAULT_HESSIAN_EPSILON},
        sample::Sample,
        state::DerivativeState,
        tensor::SymmetricTensor,
        types::{Matrix, Point},
        validation::validate_epsilon,
    },
    errors::FunctionResult,
    evaluation::EvaluationHandle,
    gradient::Gradient,
    hessian::Hessian,
};
use ndarray::Array2;

/// Centered finite-difference gradient of an evaluation.
#[derive(Debug)]
pub struct CenteredFiniteDifferenceGradient {
    evaluation: EvaluationHandle,
    epsilon: Point,
    state: DerivativeState,
}

impl CenteredFiniteDifferenceGradient {
    /// Errors
    /// ------
    /// - `FunctionError::EpsilonDimMismatch` / `FunctionError::InvalidEpsilon`
    ///   Returned when `epsilon` has the wrong length or a non-positive entry.
    pub fn new(evaluation: EvaluationHandle, epsilon: Point) -> FunctionResult<Self> {
        validate_epsilon(&epsilon, evaluation.input_dimension())?;
        Ok(CenteredFiniteDifferenceGradient { evaluation, epsilon, state: DerivativeState::default() })
    }

    /// Same step in every direction.
    pub fn with_step(evaluation: EvaluationHandle, step: f64) -> FunctionResult<Self> {
        let epsilon = Point::from_elem(evaluation.input_dimension(), step);
        Self::new(evaluation, epsilon)
    }

    /// Default step `1e-5` in every direction.
    pub fn with_default_step(evaluation: EvaluationHandle) -> FunctionResult<Self> {
        Self::with_step(evaluation, DEFAULT_GRADIENT_EPSILON)
    }

    pub fn epsilon(&self) -> &Point {
        &self.epsilon
    }

    pub fn evaluation(&self) -> &EvaluationHandle {
        &self.evaluation
    }
}

impl Gradient for CenteredFiniteDifferenceGradient {
    fn name(&self) -> &'static str {
        "CenteredFiniteDifferenceGradient"
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
        let n = x.len();
        let m = self.evaluation.output_dimension();
        let mut stencil = Array2::zeros((2 * n, n));
        for i in 0..n {
            let mut plus = stencil.row_mut(2 * i);
            plus.assign(x);
            plus[i] += self.epsilon[i];
            let mut minus = stencil.row_mut(2 * i + 1);
            minus.assign(x);
            minus[i] -= self.epsilon[i];
        }
        let values = self.evaluation.evaluate_sample(&Sample::new(stencil))?;
        let values = values.data();
        let mut gradient = Matrix::zeros((n, m));
        for i in 0..n {
            let scale = 0.5 / self.epsilon[i];
            for j in 0..m {
                gradient[[i, j]] = (values[[2 * i, j]] - values[[2 * i + 1, j]]) * scale;
            }
        }
        Ok(gradient)
    }

    fn parameter(&self) -> Point {
        self.evaluation.parameter()
    }

    fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        self.evaluation.set_parameter(parameter)
    }
}

/// Centered finite-difference Hessian of an evaluation.
#[derive(Debug)]
pub struct CenteredFiniteDifferenceHessian {
    evaluation: EvaluationHandle,
    epsilon: Point,
    state: DerivativeState,
}

impl CenteredFiniteDifferenceHessian {
    pub fn new(evaluation: EvaluationHandle, epsilon: Point) -> FunctionResult<Self> {
        validate_epsilon(&epsilon, evaluation.input_dimension())?;
        Ok(CenteredFiniteDifferenceHessian { evaluation, epsilon, state: DerivativeState::default() })
    }

    pub fn with_step(evaluation: EvaluationHandle, step: f64) -> FunctionResult<Self> {
        let epsilon = Point::from_elem(evaluation.input_dimension(), step);
        Self::new(evaluation, epsilon)
    }

    /// Default step `1e-4` in every direction.
    pub fn with_default_step(evaluation: EvaluationHandle) -> FunctionResult<Self> {
        Self::with_step(evaluation, DEFAULT_HESSIAN_EPSILON)
    }

    pub fn epsilon(&self) -> &Point {
        &self.epsilon
    }

    pub fn evaluation(&self) -> &EvaluationHandle {
        &self.evaluation
    }
}

impl Hessian for CenteredFiniteDifferenceHessian {
    fn name(&self) -> &'static str {
        "CenteredFiniteDifferenceHessian"
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

    /// Stencil layout: row 0 is `x`, rows `1 + 2i` / `2 + 2i` are `x ± εᵢeᵢ`,
    /// then four rows `(++, +−, −+, −−)` per pair `i < j`.
    fn compute(&self, x: &Point) -> FunctionResult<SymmetricTensor> {
        let n = x.len();
        let m = self.evaluation.output_dimension();
        let eps = &self.epsilon;
        let pairs = n * n.saturating_sub(1) / 2;
        let mut stencil = Array2::zeros((1 + 2 * n + 4 * pairs, n));
        for mut row in stencil.rows_mut() {
            row.assign(x);
        }
        for i in 0..n {
            stencil[[1 + 2 * i, i]] += eps[i];
            stencil[[2 + 2 * i, i]] -= eps[i];
        }
        let mut row = 1 + 2 * n;
        for i in 0..n {
            for j in (i + 1)..n {
                for (k, (si, sj)) in [(1.0, 1.0), (1.0, -1.0), (-1.0, 1.0), (-1.0, -1.0)].iter().enumerate() {
                    stencil[[row + k, i]] += si * eps[i];
                    stencil[[row + k, j]] += sj * eps[j];
                }
                row += 4;
            }
        }
        let values = self.evaluation.evaluate_sample(&Sample::new(stencil))?;
        let f = values.data();
        let mut hessian = SymmetricTensor::zeros(n, m);
        for k in 0..m {
            let center = f[[0, k]];
            for i in 0..n {
                let value = (f[[1 + 2 * i, k]] - 2.0 * center + f[[2 + 2 * i, k]]) / (eps[i] * eps[i]);
                hessian.set(i, i, k, value);
            }
            let mut row = 1 + 2 * n;
            for i in 0..n {
                for j in (i + 1)..n {
                    let value = (f[[row, k]] - f[[row + 1, k]] - f[[row + 2, k]] + f[[row + 3, k]])
                        / (4.0 * eps[i] * eps[j]);
                    hessian.set(i, j, k, value);
                    row += 4;
                }
            }
        }
        Ok(hessian)
    }

    fn parameter(&self) -> Point {
        self.evaluation.parameter()
    }

    fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        self.evaluation.set_parameter(parameter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{analytic::ClosureEvaluation, errors::FunctionError, evaluation::Evaluation};
    use approx::assert_abs_diff_eq;
    use finitediff::FiniteDiff;
    use ndarray::array;
    use std::sync::Arc;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Gradient and Hessian stencils against closed forms.
    // - Agreement with the `finitediff` crate's central differences.
    // - Step validation and parameter forwarding.
    // - Single-batch stencil evaluation (call counting).
    // -------------------------------------------------------------------------

    fn cubic() -> EvaluationHandle {
        // f(x) = [x0² x1 + x1³, x0 + x1]
        Arc::new(ClosureEvaluation::new(2, 2, |x| {
            Ok(array![x[0] * x[0] * x[1] + x[1].powi(3), x[0] + x[1]])
        }))
    }

    #[test]
    // Purpose
    // -------
    // Verify the centered gradient against the closed form and `finitediff`.
    //
    // Given
    // -----
    // - f(x) = [x0² x1 + x1³, x0 + x1] at x = [1, 2].
    //
    // Expect
    // ------
    // - ∇f = [[2 x0 x1, 1], [x0² + 3 x1², 1]] = [[4, 1], [13, 1]].
    // - Column 0 matches `central_diff` on the first component.
    // - All four stencil points are evaluated as one batch of 4 calls.
    fn gradient_matches_closed_form_and_finitediff() {
        // Arrange
        let f = cubic();
        let fd = CenteredFiniteDifferenceGradient::with_default_step(f.clone()).unwrap();
        let x = array![1.0, 2.0];

        // Act
        let g = fd.gradient(&x).unwrap();
        let reference = x.central_diff(&|p: &Point| p[0] * p[0] * p[1] + p[1].powi(3));

        // Assert
        assert_abs_diff_eq!(g, array![[4.0, 1.0], [13.0, 1.0]], epsilon = 1e-6);
        assert_abs_diff_eq!(g.column(0).to_owned(), reference, epsilon = 1e-6);
        assert_eq!(f.calls(), 4);
    }

    #[test]
    // Purpose
    // -------
    // Verify the centered Hessian stencil on a polynomial with cross terms.
    //
    // Given
    // -----
    // - The same f at x = [1, 2].
    //
    // Expect
    // ------
    // - Sheet 0: [[2 x1, 2 x0], [2 x0, 6 x1]] = [[4, 2], [2, 12]].
    // - Sheet 1 is zero; every sheet is exactly symmetric.
    fn hessian_matches_closed_form() {
        // Arrange
        let fd = CenteredFiniteDifferenceHessian::with_default_step(cubic()).unwrap();

        // Act
        let h = fd.hessian(&array![1.0, 2.0]).unwrap();

        // Assert
        assert_abs_diff_eq!(h.sheet(0).to_owned(), array![[4.0, 2.0], [2.0, 12.0]], epsilon = 1e-4);
        assert_abs_diff_eq!(h.sheet(1).to_owned(), Matrix::zeros((2, 2)), epsilon = 1e-4);
        assert_eq!(h.max_asymmetry(), 0.0);
    }

    #[test]
    // Purpose
    // -------
    // Ensure invalid steps are rejected at construction.
    //
    // Given
    // -----
    // - A 2-D evaluation with steps `[1e-5]` and `[1e-5, -1.0]`.
    //
    // Expect
    // ------
    // - EpsilonDimMismatch and InvalidEpsilon respectively.
    fn invalid_steps_are_rejected() {
        // Act
        let short = CenteredFiniteDifferenceGradient::new(cubic(), array![1e-5]);
        let negative = CenteredFiniteDifferenceHessian::new(cubic(), array![1e-5, -1.0]);

        // Assert
        assert!(matches!(short, Err(FunctionError::EpsilonDimMismatch { expected: 2, found: 1 })));
        assert!(matches!(negative, Err(FunctionError::InvalidEpsilon { index: 1, .. })));
    }

    #[test]
    // Purpose
    // -------
    // Check that parameters are forwarded to the wrapped evaluation.
    //
    // Given
    // -----
    // - f(x; θ) = θ0 · x0², wrapped in a finite-difference gradient.
    //
    // Expect
    // ------
    // - Setting θ = [3] through the gradient changes both the evaluation's
    //   parameter and the derivative (6 x0 at x0 = 1).
    fn parameters_are_forwarded_to_evaluation() {
        // Arrange
        let f: EvaluationHandle =
            Arc::new(ClosureEvaluation::parametric(1, 1, array![1.0], |x, p| Ok(array![p[0] * x[0] * x[0]])));
        let fd = CenteredFiniteDifferenceGradient::with_default_step(f.clone()).unwrap();

        // Act
        fd.set_parameter(&array![3.0]).unwrap();
        let g = fd.gradient(&array![1.0]).unwrap();

        // Assert
        assert_eq!(f.parameter(), array![3.0]);
        assert_abs_diff_eq!(g[[0, 0]], 6.0, epsilon = 1e-6);
    }
}
