//! function::formula — seam for building functions from text formulas.
//!
//! The crate does not ship an expression parser. A caller that has one
//! implements [`FormulaEngine`] and hands it to
//! [`Function::from_formulas`](crate::function::Function::from_formulas).
//! Engines that cannot differentiate symbolically keep the default
//! `compile_gradient` / `compile_hessian`, and the triad falls back to
//! finite differences.
use crate::function::{
    errors::{FunctionError, FunctionResult},
    evaluation::EvaluationHandle,
    gradient::GradientHandle,
    hessian::HessianHandle,
};
use std::fmt::Debug;

pub trait FormulaEngine: Send + Sync + Debug {
    /// Compile `formulas` (one per output) over `input_variables`.
    fn compile(&self, input_variables: &[String], formulas: &[String]) -> FunctionResult<EvaluationHandle>;

    fn compile_gradient(&self, _input_variables: &[String], _formulas: &[String]) -> FunctionResult<GradientHandle> {
        Err(FunctionError::NoAnalyticalDerivative { combinator: "FormulaEngine" })
    }

    fn compile_hessian(&self, _input_variables: &[String], _formulas: &[String]) -> FunctionResult<HessianHandle> {
        Err(FunctionError::NoAnalyticalDerivative { combinator: "FormulaEngine" })
    }
}
