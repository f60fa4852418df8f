//! combinators::product — `h = f · g` for scalar-valued `f`, `g`.
//!
//! - `Dh = f ∇g + g ∇f`
//! - `D²h = f D²g + g D²f + ∇f ∇gᵀ + ∇g ∇fᵀ`
//!
//! Both factors must be scalar-valued and share the input dimension.
//! Parameters are ordered `[θ_f, θ_g]`.
use crate::function::{
    core::{
        description::Description,
        linalg::{outer, stack_rows},
        sample::Sample,
        state::{DerivativeState, EvaluationState},
        tensor::SymmetricTensor,
        types::{Matrix, Point},
        validation::{concat_points, split_parameter},
    },
    errors::{FunctionError, FunctionResult},
    evaluation::{Evaluation, EvaluationHandle},
    gradient::{Gradient, GradientHandle},
    hessian::{Hessian, HessianHandle},
};
use ndarray::array;

/// Both factors scalar-valued over the same input space.
fn check_factors(combinator: &'static str, left: (usize, usize), right: (usize, usize)) -> FunctionResult<()> {
    for (_, output) in [left, right] {
        if output != 1 {
            return Err(FunctionError::NotScalarOutput { combinator, found: output });
        }
    }
    if left.0 != right.0 {
        return Err(FunctionError::InconsistentInputDimension { index: 1, expected: left.0, found: right.0 });
    }
    Ok(())
}

/// ProductEvaluation — `h(x) = f(x) g(x)`.
#[derive(Debug)]
pub struct ProductEvaluation {
    left: EvaluationHandle,
    right: EvaluationHandle,
    state: EvaluationState,
}

impl ProductEvaluation {
    /// Errors
    /// ------
    /// - `FunctionError::NotScalarOutput`
    ///   Returned when either factor is vector-valued.
    /// - `FunctionError::InconsistentInputDimension`
    ///   Returned when the factors have different input dimensions.
    pub fn new(left: EvaluationHandle, right: EvaluationHandle) -> FunctionResult<Self> {
        check_factors(
            "ProductEvaluation",
            (left.input_dimension(), left.output_dimension()),
            (right.input_dimension(), right.output_dimension()),
        )?;
        Ok(ProductEvaluation { left, right, state: EvaluationState::default() })
    }
}

impl Evaluation for ProductEvaluation {
    fn name(&self) -> &'static str {
        "ProductEvaluation"
    }

    fn input_dimension(&self) -> usize {
        self.left.input_dimension()
    }

    fn output_dimension(&self) -> usize {
        1
    }

    fn state(&self) -> &EvaluationState {
        &self.state
    }

    fn compute(&self, x: &Point) -> FunctionResult<Point> {
        let f = self.left.evaluate(x)?;
        let g = self.right.evaluate(x)?;
        Ok(array![f[0] * g[0]])
    }

    fn compute_sample(&self, xs: &Sample) -> FunctionResult<Sample> {
        let fs = self.left.evaluate_sample(xs)?;
        let gs = self.right.evaluate_sample(xs)?;
        Ok(Sample::new(&fs.data() * &gs.data()))
    }

    fn parameter(&self) -> Point {
        concat_points(&[self.left.parameter(), self.right.parameter()])
    }

    fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        let blocks =
            split_parameter(parameter, &[self.left.parameter_dimension(), self.right.parameter_dimension()])?;
        self.left.set_parameter(&blocks[0])?;
        self.right.set_parameter(&blocks[1])?;
        self.state.clear_cache();
        Ok(())
    }

    fn parameter_description(&self) -> Description {
        self.left.parameter_description().concat(&self.right.parameter_description())
    }

    /// `[∂f/∂θ_f · g(x) ; ∂g/∂θ_g · f(x)]`.
    fn parameter_gradient(&self, x: &Point) -> FunctionResult<Matrix> {
        let f = self.left.evaluate(x)?[0];
        let g = self.right.evaluate(x)?[0];
        let left_block = self.left.parameter_gradient(x)? * g;
        let right_block = self.right.parameter_gradient(x)? * f;
        stack_rows(&[left_block, right_block], 1)
    }
}

/// ProductGradient — first-order product rule.
#[derive(Debug)]
pub struct ProductGradient {
    left_evaluation: EvaluationHandle,
    left_gradient: GradientHandle,
    right_evaluation: EvaluationHandle,
    right_gradient: GradientHandle,
    state: DerivativeState,
}

impl ProductGradient {
    /// Product rule `∇(f g) = g ∇f + f ∇g`.
    ///
    /// Parameters
    /// ----------
    /// - `left_evaluation`, `left_gradient`: `f` and its gradient.
    /// - `right_evaluation`, `right_gradient`: `g` and its gradient.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::NotScalarOutput`
    ///   Returned when either factor is vector-valued.
    /// - `FunctionError::InconsistentInputDimension`
    ///   Returned when the factors have different input dimensions.
    pub fn new(
        left_evaluation: EvaluationHandle, left_gradient: GradientHandle,
        right_evaluation: EvaluationHandle, right_gradient: GradientHandle,
    ) -> FunctionResult<Self> {
        check_factors(
            "ProductGradient",
            (left_gradient.input_dimension(), left_gradient.output_dimension()),
            (right_gradient.input_dimension(), right_gradient.output_dimension()),
        )?;
        check_factors(
            "ProductGradient",
            (left_evaluation.input_dimension(), left_evaluation.output_dimension()),
            (right_evaluation.input_dimension(), right_evaluation.output_dimension()),
        )?;
        Ok(ProductGradient {
            left_evaluation,
            left_gradient,
            right_evaluation,
            right_gradient,
            state: DerivativeState::default(),
        })
    }
}

impl Gradient for ProductGradient {
    fn name(&self) -> &'static str {
        "ProductGradient"
    }

    fn input_dimension(&self) -> usize {
        self.left_gradient.input_dimension()
    }

    fn output_dimension(&self) -> usize {
        1
    }

    fn state(&self) -> &DerivativeState {
        &self.state
    }

    fn compute(&self, x: &Point) -> FunctionResult<Matrix> {
        let f = self.left_evaluation.evaluate(x)?[0];
        let g = self.right_evaluation.evaluate(x)?[0];
        let df = self.left_gradient.gradient(x)?;
        let dg = self.right_gradient.gradient(x)?;
        Ok(dg * f + df * g)
    }

    fn parameter(&self) -> Point {
        concat_points(&[self.left_gradient.parameter(), self.right_gradient.parameter()])
    }

    fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        let dims = [self.left_gradient.parameter_dimension(), self.right_gradient.parameter_dimension()];
        let blocks = split_parameter(parameter, &dims)?;
        self.left_gradient.set_parameter(&blocks[0])?;
        self.right_gradient.set_parameter(&blocks[1])?;
        if self.left_evaluation.parameter_dimension() == dims[0] {
            self.left_evaluation.set_parameter(&blocks[0])?;
        }
        if self.right_evaluation.parameter_dimension() == dims[1] {
            self.right_evaluation.set_parameter(&blocks[1])?;
        }
        Ok(())
    }
}

/// ProductHessian — second-order product rule.
#[derive(Debug)]
pub struct ProductHessian {
    left_evaluation: EvaluationHandle,
    left_gradient: GradientHandle,
    left_hessian: HessianHandle,
    right_evaluation: EvaluationHandle,
    right_gradient: GradientHandle,
    right_hessian: HessianHandle,
    state: DerivativeState,
}

impl ProductHessian {
    /// `D²(f g) = g D²f + f D²g + ∇f ∇gᵀ + ∇g ∇fᵀ`.
    ///
    /// Errors are those of [`ProductGradient::new`].
    pub fn new(
        left_evaluation: EvaluationHandle, left_gradient: GradientHandle, left_hessian: HessianHandle,
        right_evaluation: EvaluationHandle, right_gradient: GradientHandle, right_hessian: HessianHandle,
    ) -> FunctionResult<Self> {
        check_factors(
            "ProductHessian",
            (left_hessian.input_dimension(), left_hessian.output_dimension()),
            (right_hessian.input_dimension(), right_hessian.output_dimension()),
        )?;
        check_factors(
            "ProductHessian",
            (left_gradient.input_dimension(), left_gradient.output_dimension()),
            (right_gradient.input_dimension(), right_gradient.output_dimension()),
        )?;
        if left_evaluation.output_dimension() != 1 || right_evaluation.output_dimension() != 1 {
            return Err(FunctionError::NotScalarOutput {
                combinator: "ProductHessian",
                found: left_evaluation.output_dimension().max(right_evaluation.output_dimension()),
            });
        }
        Ok(ProductHessian {
            left_evaluation,
            left_gradient,
            left_hessian,
            right_evaluation,
            right_gradient,
            right_hessian,
            state: DerivativeState::default(),
        })
    }
}

impl Hessian for ProductHessian {
    fn name(&self) -> &'static str {
        "ProductHessian"
    }

    fn input_dimension(&self) -> usize {
        self.left_hessian.input_dimension()
    }

    fn output_dimension(&self) -> usize {
        1
    }

    fn state(&self) -> &DerivativeState {
        &self.state
    }

    fn compute(&self, x: &Point) -> FunctionResult<SymmetricTensor> {
        let f = self.left_evaluation.evaluate(x)?[0];
        let g = self.right_evaluation.evaluate(x)?[0];
        let df = self.left_gradient.gradient(x)?;
        let dg = self.right_gradient.gradient(x)?;
        let d2f = self.left_hessian.hessian(x)?;
        let d2g = self.right_hessian.hessian(x)?;
        let cross = outer(df.column(0), dg.column(0));
        let mut sheet = &d2g.sheet(0) * f + &d2f.sheet(0) * g;
        sheet += &cross;
        sheet += &cross.t();
        let mut hessian = SymmetricTensor::zeros(x.len(), 1);
        hessian.set_sheet(0, &sheet);
        Ok(hessian)
    }

    fn parameter(&self) -> Point {
        concat_points(&[self.left_hessian.parameter(), self.right_hessian.parameter()])
    }

    fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        let dims = [self.left_hessian.parameter_dimension(), self.right_hessian.parameter_dimension()];
        let blocks = split_parameter(parameter, &dims)?;
        self.left_hessian.set_parameter(&blocks[0])?;
        self.right_hessian.set_parameter(&blocks[1])?;
        if self.left_evaluation.parameter_dimension() == dims[0] {
            self.left_evaluation.set_parameter(&blocks[0])?;
        }
        if self.right_evaluation.parameter_dimension() == dims[1] {
            self.right_evaluation.set_parameter(&blocks[1])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::analytic::{ClosureEvaluation, ConstantGradient, ConstantHessian};
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Product rule values for h(x) = x0 · x1.
    // - Scalar-output and input-dimension checks.
    // - Parameter-gradient stacking.
    // -------------------------------------------------------------------------

    fn coordinate(index: usize) -> (EvaluationHandle, GradientHandle, HessianHandle) {
        let e: EvaluationHandle = Arc::new(ClosureEvaluation::new(2, 1, move |x| Ok(array![x[index]])));
        let mut column = Matrix::zeros((2, 1));
        column[[index, 0]] = 1.0;
        let g: GradientHandle = Arc::new(ConstantGradient::new(column));
        let h: HessianHandle = Arc::new(ConstantHessian::zeros(2, 1));
        (e, g, h)
    }

    #[test]
    // Purpose
    // -------
    // Verify first and second-order product rules on h(x) = x0 x1.
    //
    // Given
    // -----
    // - f = x0, g = x1 at x = [3, 4].
    //
    // Expect
    // ------
    // - h = 12, ∇h = [4, 3], D²h = [[0, 1], [1, 0]].
    fn product_rules_for_coordinate_product() {
        // Arrange
        let (fe, fg, fh) = coordinate(0);
        let (ge, gg, gh) = coordinate(1);
        let x = array![3.0, 4.0];

        // Act
        let value = ProductEvaluation::new(fe.clone(), ge.clone()).unwrap().evaluate(&x).unwrap();
        let gradient = ProductGradient::new(fe.clone(), fg.clone(), ge.clone(), gg.clone())
            .unwrap()
            .gradient(&x)
            .unwrap();
        let hessian = ProductHessian::new(fe, fg, fh, ge, gg, gh).unwrap().hessian(&x).unwrap();

        // Assert
        assert_eq!(value, array![12.0]);
        assert_eq!(gradient, array![[4.0], [3.0]]);
        assert_eq!(hessian.sheet(0), array![[0.0, 1.0], [1.0, 0.0]]);
    }

    #[test]
    // Purpose
    // -------
    // Ensure vector-valued factors and mismatched inputs are rejected.
    //
    // Given
    // -----
    // - A 2-output factor, then scalar factors over ℝ² and ℝ¹.
    //
    // Expect
    // ------
    // - NotScalarOutput, then InconsistentInputDimension.
    fn product_requires_scalar_factors_on_same_space() {
        // Arrange
        let (f, _, _) = coordinate(0);
        let vector: EvaluationHandle = Arc::new(ClosureEvaluation::new(2, 2, |x| Ok(x.clone())));
        let narrow: EvaluationHandle = Arc::new(ClosureEvaluation::new(1, 1, |x| Ok(x.clone())));

        // Act
        let not_scalar = ProductEvaluation::new(f.clone(), vector).expect_err("vector factor");
        let mismatch = ProductEvaluation::new(f, narrow).expect_err("different inputs");

        // Assert
        assert_eq!(not_scalar, FunctionError::NotScalarOutput { combinator: "ProductEvaluation", found: 2 });
        assert_eq!(mismatch, FunctionError::InconsistentInputDimension { index: 1, expected: 2, found: 1 });
    }

    #[test]
    // Purpose
    // -------
    // Check the parameter gradient `[∂f/∂a · g ; ∂g/∂b · f]`.
    //
    // Given
    // -----
    // - f(x; a) = a x0, g(x; b) = b + x1 with a = 2, b = 1 at x = [3, 4].
    //
    // Expect
    // ------
    // - ∂h/∂a = x0 · g = 3 · 5 = 15, ∂h/∂b = f = 6.
    fn parameter_gradient_uses_cross_values() {
        // Arrange
        let f: EvaluationHandle =
            Arc::new(ClosureEvaluation::parametric(2, 1, array![2.0], |x, p| Ok(array![p[0] * x[0]])));
        let g: EvaluationHandle =
            Arc::new(ClosureEvaluation::parametric(2, 1, array![1.0], |x, p| Ok(array![p[0] + x[1]])));
        let h = ProductEvaluation::new(f, g).unwrap();

        // Act
        let pg = h.parameter_gradient(&array![3.0, 4.0]).unwrap();

        // Assert
        assert_abs_diff_eq!(pg, array![[15.0], [6.0]], epsilon = 1e-5);
    }
}
