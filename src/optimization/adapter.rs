//! Adapter that exposes a scalar [`Function`] as an `argmin` problem.
//!
//! The cost is `f(x)[0]`, the gradient is the single column of the `n × 1`
//! gradient, and the Hessian is the single sheet of the `n × n × 1` tensor.
//! Derivatives go through [`Function::gradient`] / [`Function::hessian`], so
//! the finite-difference fallback of the triad applies here as well.
use crate::function::{
    errors::{FunctionError, FunctionResult},
    triad::Function,
    Point,
};
use crate::optimization::types::{Cost, Grad, HessianMatrix};
use argmin::core::{CostFunction, Error, Gradient as ArgminGradient, Hessian as ArgminHessian};

#[derive(Debug, Clone)]
pub struct ArgMinAdapter<'a> {
    function: &'a Function,
}

impl<'a> ArgMinAdapter<'a> {
    /// Wrap `function` for argmin.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::NotScalarOutput`
    ///   Returned when `function` has more than one output.
    pub fn new(function: &'a Function) -> FunctionResult<Self> {
        let found = function.output_dimension();
        if found != 1 {
            return Err(FunctionError::NotScalarOutput { combinator: "ArgMinAdapter", found });
        }
        Ok(Self { function })
    }

    pub fn function(&self) -> &Function {
        self.function
    }
}

impl<'a> CostFunction for ArgMinAdapter<'a> {
    type Param = Point;
    type Output = Cost;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, Error> {
        let value = self.function.evaluate(x)?[0];
        if !value.is_finite() {
            return Err((FunctionError::NonFiniteValue { value }).into());
        }
        Ok(value)
    }
}

impl<'a> ArgminGradient for ArgMinAdapter<'a> {
    type Param = Point;
    type Gradient = Grad;

    fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, Error> {
        let gradient = self.function.gradient(x)?;
        let column = gradient.column(0).to_owned();
        if let Some(value) = column.iter().copied().find(|v| !v.is_finite()) {
            return Err((FunctionError::NonFiniteValue { value }).into());
        }
        Ok(column)
    }
}

impl<'a> ArgminHessian for ArgMinAdapter<'a> {
    type Param = Point;
    type Hessian = HessianMatrix;

    fn hessian(&self, x: &Self::Param) -> Result<Self::Hessian, Error> {
        let hessian = self.function.hessian(x)?;
        Ok(hessian.sheet(0).to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::analytic::{ClosureEvaluation, ClosureGradient, ClosureHessian};
    use crate::function::core::tensor::SymmetricTensor;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::sync::Arc;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Cost, gradient, and Hessian extraction for a scalar function.
    // - Rejection of vector-valued functions and non-finite costs.
    // - Round-tripping adapter errors back into `FunctionError`.
    // -------------------------------------------------------------------------

    fn quadratic() -> Function {
        // f(x) = x0² + 3 x0 x1
        Function::from_parts(
            Arc::new(ClosureEvaluation::new(2, 1, |x| Ok(array![x[0] * x[0] + 3.0 * x[0] * x[1]]))),
            Arc::new(ClosureGradient::new(2, 1, |x| Ok(array![[2.0 * x[0] + 3.0 * x[1]], [3.0 * x[0]]]))),
            Arc::new(ClosureHessian::new(2, 1, |_| SymmetricTensor::from_sheets(2, &[array![[2.0, 3.0], [3.0, 0.0]]]))),
        )
        .unwrap()
    }

    #[test]
    // Purpose
    // -------
    // Verify the adapter forwards the triad's cost and derivatives.
    //
    // Given
    // -----
    // - f(x) = x0² + 3 x0 x1 at [1, 2].
    //
    // Expect
    // ------
    // - cost 7, gradient [8, 3], Hessian [[2, 3], [3, 0]].
    fn adapter_forwards_cost_and_derivatives() {
        // Arrange
        let f = quadratic();
        let adapter = ArgMinAdapter::new(&f).unwrap();
        let x = array![1.0, 2.0];

        // Act
        let cost = adapter.cost(&x).unwrap();
        let grad = adapter.gradient(&x).unwrap();
        let hess = adapter.hessian(&x).unwrap();

        // Assert
        assert_abs_diff_eq!(cost, 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(grad, array![8.0, 3.0], epsilon = 1e-12);
        assert_abs_diff_eq!(hess, array![[2.0, 3.0], [3.0, 0.0]], epsilon = 1e-12);
        assert_eq!(adapter.function().evaluation_calls(), 1);
    }

    #[test]
    // Purpose
    // -------
    // Ensure only scalar functions can be adapted.
    //
    // Given
    // -----
    // - The identity on ℝ².
    //
    // Expect
    // ------
    // - `NotScalarOutput { found: 2 }`.
    fn adapter_rejects_vector_output() {
        // Arrange
        let f = Function::from_evaluation(Arc::new(ClosureEvaluation::new(2, 2, |x| Ok(x.clone())))).unwrap();

        // Act
        let err = ArgMinAdapter::new(&f).unwrap_err();

        // Assert
        assert!(matches!(err, FunctionError::NotScalarOutput { found: 2, .. }));
    }

    #[test]
    // Purpose
    // -------
    // Ensure non-finite costs surface as `NonFiniteValue` after the argmin
    // error is converted back.
    //
    // Given
    // -----
    // - f(x) = ln(x0) at x0 = 0.
    //
    // Expect
    // ------
    // - `FunctionError::NonFiniteValue`.
    fn non_finite_cost_is_reported() {
        // Arrange
        let f = Function::from_evaluation(Arc::new(ClosureEvaluation::new(1, 1, |x| Ok(array![x[0].ln()])))).unwrap();
        let adapter = ArgMinAdapter::new(&f).unwrap();

        // Act
        let err: FunctionError = adapter.cost(&array![0.0]).unwrap_err().into();

        // Assert
        assert!(matches!(err, FunctionError::NonFiniteValue { .. }));
    }

    #[test]
    // Purpose
    // -------
    // Ensure input-dimension errors from the triad survive the trip through
    // argmin's error type.
    //
    // Given
    // -----
    // - The 2-input quadratic evaluated at a 3-vector.
    //
    // Expect
    // ------
    // - `InputDimMismatch { expected: 2, found: 3 }`.
    fn dimension_errors_round_trip() {
        // Arrange
        let f = quadratic();
        let adapter = ArgMinAdapter::new(&f).unwrap();

        // Act
        let err: FunctionError = adapter.gradient(&array![1.0, 2.0, 3.0]).unwrap_err().into();

        // Assert
        assert_eq!(err, FunctionError::InputDimMismatch { expected: 2, found: 3 });
    }
}
