//! Validation helpers for the function core.
//!
//! This module centralizes the consistency checks shared by evaluations,
//! derivatives, and combinators:
//!
//! - **Dimension checks**: [`validate_input_dim`], [`validate_sample_dim`],
//!   [`validate_parameter_dim`].
//! - **Shape checks on implementor output**: [`validate_output_dim`],
//!   [`validate_gradient_shape`], [`validate_hessian_shape`].
//! - **Index sets**: [`validate_indices`] (range, uniqueness, non-empty) and
//!   [`complement_indices`].
//! - **Finite-difference steps**: [`validate_epsilon`].
//! - **Parameter plumbing for combinators**: [`split_parameter`].
//!
//! These helpers standardize error reporting by returning
//! [`FunctionError`] variants, so combinators stay free of ad-hoc checks.
use crate::function::{
    core::{tensor::SymmetricTensor, types::{Matrix, Point}},
    errors::{FunctionError, FunctionResult},
};
use ndarray::s;

/// Input point length must equal the declared input dimension.
pub fn validate_input_dim(found: usize, expected: usize) -> FunctionResult<()> {
    if found != expected {
        return Err(FunctionError::InputDimMismatch { expected, found });
    }
    Ok(())
}

/// Sample column count must equal the declared input dimension.
pub fn validate_sample_dim(found: usize, expected: usize) -> FunctionResult<()> {
    if found != expected {
        return Err(FunctionError::SampleDimMismatch { expected, found });
    }
    Ok(())
}

/// Parameter length must equal the current parameter dimension.
pub fn validate_parameter_dim(found: usize, expected: usize) -> FunctionResult<()> {
    if found != expected {
        return Err(FunctionError::ParameterDimMismatch { expected, found });
    }
    Ok(())
}

/// An implementor must return exactly `expected` outputs.
pub fn validate_output_dim(
    implementor: &'static str, found: usize, expected: usize,
) -> FunctionResult<()> {
    if found != expected {
        return Err(FunctionError::OutputDimMismatch { implementor, expected, found });
    }
    Ok(())
}

/// A gradient must be `input_dim × output_dim`.
pub fn validate_gradient_shape(
    implementor: &'static str, gradient: &Matrix, expected: (usize, usize),
) -> FunctionResult<()> {
    let found = gradient.dim();
    if found != expected {
        return Err(FunctionError::GradientShapeMismatch { implementor, expected, found });
    }
    Ok(())
}

/// A Hessian must be `(input_dim, output_dim)` in `(n, m)` terms.
pub fn validate_hessian_shape(
    implementor: &'static str, hessian: &SymmetricTensor, expected: (usize, usize),
) -> FunctionResult<()> {
    let found = hessian.dim();
    if found != expected {
        return Err(FunctionError::HessianShapeMismatch { implementor, expected, found });
    }
    Ok(())
}

/// Validate an index set against `bound`.
///
/// # Checks
/// 1. The set is not empty.
/// 2. Every index is `< bound`.
/// 3. No index appears twice.
///
/// # Errors
/// - [`FunctionError::EmptyIndices`], [`FunctionError::IndexOutOfRange`],
///   [`FunctionError::DuplicateIndex`] — first failure only.
pub fn validate_indices(indices: &[usize], bound: usize) -> FunctionResult<()> {
    if indices.is_empty() {
        return Err(FunctionError::EmptyIndices);
    }
    let mut seen = vec![false; bound];
    for &index in indices {
        if index >= bound {
            return Err(FunctionError::IndexOutOfRange { index, bound });
        }
        if seen[index] {
            return Err(FunctionError::DuplicateIndex { index });
        }
        seen[index] = true;
    }
    Ok(())
}

/// Sorted positions in `0..bound` that are not in `indices`.
pub fn complement_indices(indices: &[usize], bound: usize) -> Vec<usize> {
    let mut taken = vec![false; bound];
    for &index in indices {
        if index < bound {
            taken[index] = true;
        }
    }
    (0..bound).filter(|&i| !taken[i]).collect()
}

/// Every finite-difference step must be finite and strictly positive, and
/// there must be one per input component.
pub fn validate_epsilon(epsilon: &Point, input_dimension: usize) -> FunctionResult<()> {
    if epsilon.len() != input_dimension {
        return Err(FunctionError::EpsilonDimMismatch {
            expected: input_dimension,
            found: epsilon.len(),
        });
    }
    for (index, &value) in epsilon.iter().enumerate() {
        if !value.is_finite() || value <= 0.0 {
            return Err(FunctionError::InvalidEpsilon { index, value });
        }
    }
    Ok(())
}

/// Split a concatenated parameter vector into consecutive blocks.
///
/// # Errors
/// - [`FunctionError::ParameterDimMismatch`] if `parameter.len()` differs
///   from the sum of `dims`.
pub fn split_parameter(parameter: &Point, dims: &[usize]) -> FunctionResult<Vec<Point>> {
    let total: usize = dims.iter().sum();
    validate_parameter_dim(parameter.len(), total)?;
    let mut blocks = Vec::with_capacity(dims.len());
    let mut start = 0;
    for &dim in dims {
        blocks.push(parameter.slice(s![start..start + dim]).to_owned());
        start += dim;
    }
    Ok(blocks)
}

/// Concatenate parameter blocks in order.
pub fn concat_points(blocks: &[Point]) -> Point {
    blocks.iter().flat_map(|b| b.iter().copied()).collect()
}
