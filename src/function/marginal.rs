//! function::marginal — restrict a piece to a subset of its outputs.
//!
//! Purpose
//! -------
//! Build the evaluation, gradient, or Hessian of `x ↦ (fᵢ(x))_{i ∈ I}` for
//! an ordered index list `I`.
//!
//! Key behaviors
//! -------------
//! - Evaluations first ask the implementor for a specialised marginal
//!   (linear combinations, dual linear combinations, aggregations offer
//!   one); otherwise the marginal is the composition of a linear
//!   projection with the evaluation.
//! - Specialised marginals may drop the parameters of unselected terms;
//!   [`projected_evaluation`] keeps all of them and is what
//!   [`Function::marginal`](crate::function::Function::marginal) falls back
//!   to when the dimensions would diverge.
//! - Gradients and Hessians always go through the composition chain rule
//!   with a constant projection gradient. Since the projection is linear,
//!   the inner evaluation is a [`ZeroEvaluation`] placeholder and the outer
//!   Hessian is zero.
//!
//! Invariants & assumptions
//! ------------------------
//! - `I` is non-empty, in range, and duplicate-free; the order of `I` is
//!   the order of the marginal's outputs.
use crate::function::{
    analytic::{ConstantGradient, ConstantHessian, LinearEvaluation, ZeroEvaluation},
    combinators::composition::{ComposedEvaluation, ComposedGradient, ComposedHessian},
    core::{linalg::projection_matrix, validation::validate_indices},
    errors::FunctionResult,
    evaluation::{Evaluation, EvaluationHandle},
    gradient::{Gradient, GradientHandle},
    hessian::{Hessian, HessianHandle},
};
use std::sync::Arc;

/// Marginal of an evaluation on the outputs `indices`.
///
/// Errors
/// ------
/// - `EmptyIndices`, `IndexOutOfRange`, `DuplicateIndex` for invalid
///   `indices`, and anything a specialised marginal returns.
pub fn evaluation_marginal(evaluation: &EvaluationHandle, indices: &[usize]) -> FunctionResult<EvaluationHandle> {
    let m = evaluation.output_dimension();
    validate_indices(indices, m)?;
    if let Some(marginal) = evaluation.specialized_marginal(indices) {
        log::debug!("{}: using specialised marginal", evaluation.name());
        return marginal;
    }
    projected_evaluation(evaluation, indices)
}

/// Marginal of an evaluation through the generic projection composition.
///
/// Unlike [`evaluation_marginal`], the result always carries the full
/// parameter vector of `evaluation`, in the same order, so it stays in step
/// with [`gradient_marginal`] and [`hessian_marginal`].
///
/// Errors
/// ------
/// - `EmptyIndices`, `IndexOutOfRange`, `DuplicateIndex` for invalid
///   `indices`.
pub fn projected_evaluation(evaluation: &EvaluationHandle, indices: &[usize]) -> FunctionResult<EvaluationHandle> {
    let m = evaluation.output_dimension();
    validate_indices(indices, m)?;
    let projection: EvaluationHandle = Arc::new(LinearEvaluation::projection(m, indices));
    Ok(Arc::new(ComposedEvaluation::new(projection, evaluation.clone())?))
}

/// Marginal of a gradient: the columns `indices` of the full gradient.
pub fn gradient_marginal(gradient: &GradientHandle, indices: &[usize]) -> FunctionResult<GradientHandle> {
    let (n, m) = (gradient.input_dimension(), gradient.output_dimension());
    validate_indices(indices, m)?;
    let projection: GradientHandle = Arc::new(ConstantGradient::new(projection_matrix(m, indices)));
    let placeholder: EvaluationHandle = Arc::new(ZeroEvaluation::new(n, m));
    Ok(Arc::new(ComposedGradient::new(projection, placeholder, gradient.clone())?))
}

/// Marginal of a Hessian: the sheets `indices` of the full Hessian.
pub fn hessian_marginal(hessian: &HessianHandle, indices: &[usize]) -> FunctionResult<HessianHandle> {
    let (n, m) = (hessian.input_dimension(), hessian.output_dimension());
    validate_indices(indices, m)?;
    let composed = ComposedHessian::new(
        Arc::new(ConstantGradient::new(projection_matrix(m, indices))),
        Arc::new(ConstantHessian::zeros(m, indices.len())),
        Arc::new(ZeroEvaluation::new(n, m)),
        Arc::new(ConstantGradient::zeros(n, m)),
        hessian.clone(),
    )?;
    Ok(Arc::new(composed))
}
