//! function::core::types — shared numeric aliases.
//!
//! Purpose
//! -------
//! Centralize the numeric container aliases used across the function core
//! so that evaluations, derivatives, and combinators agree on shapes without
//! spelling out `ndarray` generics everywhere.
//!
//! Conventions
//! -----------
//! - [`Point`] is a column vector in ℝⁿ.
//! - [`Matrix`] carries gradients in the "Jacobian transposed" layout:
//!   `input_dim × output_dim`, entry `(i, j) = ∂f_j/∂x_i`.
//! - Second derivatives live in
//!   [`SymmetricTensor`](crate::function::core::tensor::SymmetricTensor).
use ndarray::{Array1, Array2};

/// Point in ℝⁿ (input or output of an evaluation).
pub type Point = Array1<f64>;

/// Dense matrix; gradients are `input_dim × output_dim`.
pub type Matrix = Array2<f64>;
