//! rust_numfunc — composable numerical functions with derivatives.
//!
//! Purpose
//! -------
//! Model vector functions `f : ℝⁿ → ℝᵐ` as a triad of evaluation, gradient
//! and Hessian, combine them, and hand scalar ones to an optimizer.
//!
//! Key behaviors
//! -------------
//! - [`function`]: the pieces, the [`function::Function`] triad, the
//!   combinators (composition, product, linear and dual linear combinations,
//!   aggregation, indicator, parametric specialisation), marginals, and the
//!   finite-difference fallback.
//! - [`optimization`]: the argmin adapter and an L-BFGS minimiser.
//!
//! Conventions
//! -----------
//! - Gradients are `input × output` matrices; Hessians are
//!   `input × input × output` symmetric tensors.
//! - Fallible operations return [`function::FunctionResult`]; diagnostics go
//!   through the `log` facade.
//!
//! Testing notes
//! -------------
//! - Unit tests live next to each module; `tests/` holds the end-to-end
//!   pipeline.
pub mod function;
pub mod optimization;
