//! function::gradient — the first-derivative half of a function.
//!
//! A [`Gradient`] returns the Jacobian transposed: an
//! `input_dimension × output_dimension` matrix whose entry `(i, j)` is
//! `∂f_j/∂x_i`. Implementors provide [`Gradient::compute`]; the public
//! [`Gradient::gradient`] checks the input, counts the call, and verifies the
//! returned shape.
use crate::function::{
    core::{
        state::DerivativeState,
        types::{Matrix, Point},
        validation::{validate_gradient_shape, validate_input_dim},
    },
    errors::{FunctionError, FunctionResult},
};
use std::{fmt::Debug, sync::Arc};

/// Shared handle to a gradient.
pub type GradientHandle = Arc<dyn Gradient>;

/// First-derivative half of a numerical function ℝⁿ → ℝᵐ.
pub trait Gradient: Send + Sync + Debug {
    // Required methods
    fn name(&self) -> &'static str;
    fn input_dimension(&self) -> usize;
    fn output_dimension(&self) -> usize;
    fn state(&self) -> &DerivativeState;

    /// Raw computation without bookkeeping.
    fn compute(&self, _x: &Point) -> FunctionResult<Matrix> {
        Err(FunctionError::NotImplemented { method: "gradient", implementor: self.name() })
    }

    /// Jacobian transposed at `x`.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::InputDimMismatch`
    ///   Returned when `x.len() != input_dimension()`.
    /// - `FunctionError::GradientShapeMismatch`
    ///   Returned when the implementor's matrix is not `n × m`.
    fn gradient(&self, x: &Point) -> FunctionResult<Matrix> {
        validate_input_dim(x.len(), self.input_dimension())?;
        self.state().increment_calls();
        let gradient = self.compute(x)?;
        validate_gradient_shape(
            self.name(),
            &gradient,
            (self.input_dimension(), self.output_dimension()),
        )?;
        Ok(gradient)
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
