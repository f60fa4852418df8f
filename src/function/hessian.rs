//! function::hessian — the second-derivative half of a function.
//!
//! A [`Hessian`] returns a [`SymmetricTensor`] of shape `(n, n, m)`: one
//! symmetric `n × n` sheet per output component. The call protocol mirrors
//! [`Gradient`](crate::function::Gradient).
use crate::function::{
    core::{
        state::DerivativeState,
        tensor::SymmetricTensor,
        types::Point,
        validation::{validate_hessian_shape, validate_input_dim},
    },
    errors::{FunctionError, FunctionResult},
};
use std::{fmt::Debug, sync::Arc};

/// Shared handle to a Hessian.
pub type HessianHandle = Arc<dyn Hessian>;

/// Second-derivative half of a numerical function ℝⁿ → ℝᵐ.
pub trait Hessian: Send + Sync + Debug {
    // Required methods
    fn name(&self) -> &'static str;
    fn input_dimension(&self) -> usize;
    fn output_dimension(&self) -> usize;
    fn state(&self) -> &DerivativeState;

    /// Raw computation without bookkeeping.
    fn compute(&self, _x: &Point) -> FunctionResult<SymmetricTensor> {
        Err(FunctionError::NotImplemented { method: "hessian", implementor: self.name() })
    }

    /// Second derivatives at `x`.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::InputDimMismatch`
    ///   Returned when `x.len() != input_dimension()`.
    /// - `FunctionError::HessianShapeMismatch`
    ///   Returned when the implementor's tensor is not `(n, n, m)`.
    fn hessian(&self, x: &Point) -> FunctionResult<SymmetricTensor> {
        validate_input_dim(x.len(), self.input_dimension())?;
        self.state().increment_calls();
        let hessian = self.compute(x)?;
        validate_hessian_shape(
            self.name(),
            &hessian,
            (self.input_dimension(), self.output_dimension()),
        )?;
        Ok(hessian)
    }

    fn calls(&self) -> usize {
        self.state().calls()
    }

    fn parameter(&self) -> Point {
        self.state().parameter()
    }

    fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        self.state().set_parameter(parameter)
    }

    fn parameter_dimension(&self) -> usize {
        self.parameter().len()
    }
}
