//! function::core::tensor — rank-3 tensors symmetric in their first two axes.
//!
//! Purpose
//! -------
//! Store the Hessian of a vector-valued function ℝⁿ → ℝᵐ as one symmetric
//! `n × n` sheet per output component, backed by an `Array3<f64>` of shape
//! `(n, n, m)`.
//!
//! Key behaviors
//! -------------
//! - Writes through [`SymmetricTensor::set`] update both `(i, j, k)` and
//!   `(j, i, k)`, so symmetry holds by construction.
//! - [`SymmetricTensor::set_sheet`] stores the symmetric part
//!   `½(A + Aᵀ)` of the supplied matrix.
//! - Linear algebra needed by the chain and product rules
//!   ([`scaled_add`](SymmetricTensor::scaled_add),
//!   [`select`](SymmetricTensor::select),
//!   [`concatenate`](SymmetricTensor::concatenate)) stays in this module.
//!
//! Invariants & assumptions
//! ------------------------
//! - Storage shape is always `(n, n, m)`; constructors reject anything else.
//! - Tensors built from raw arrays are trusted to be symmetric; use
//!   [`SymmetricTensor::max_asymmetry`] to audit them.
use crate::function::{
    core::types::Matrix,
    errors::{FunctionError, FunctionResult},
};
use ndarray::{Array3, ArrayView2, ArrayViewMut2, Axis};
use std::ops::Index;

/// `(n, n, m)` tensor, symmetric in the first two axes.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetricTensor {
    data: Array3<f64>,
}

impl SymmetricTensor {
    /// Zero tensor with `m` sheets of size `n × n`.
    pub fn zeros(n: usize, m: usize) -> Self {
        SymmetricTensor { data: Array3::zeros((n, n, m)) }
    }

    /// Wrap raw `(n, n, m)` storage.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::TensorShapeMismatch`
    ///   Returned when the first two axes differ in length.
    pub fn from_array(data: Array3<f64>) -> FunctionResult<Self> {
        let shape = data.shape();
        if shape[0] != shape[1] {
            return Err(FunctionError::TensorShapeMismatch { shape: shape.to_vec() });
        }
        Ok(SymmetricTensor { data })
    }

    /// Build from one `n × n` sheet per output component.
    ///
    /// Each sheet is symmetrized via [`SymmetricTensor::set_sheet`].
    pub fn from_sheets(n: usize, sheets: &[Matrix]) -> FunctionResult<Self> {
        let mut tensor = SymmetricTensor::zeros(n, sheets.len());
        for (k, sheet) in sheets.iter().enumerate() {
            if sheet.nrows() != n || sheet.ncols() != n {
                return Err(FunctionError::TensorShapeMismatch {
                    shape: vec![sheet.nrows(), sheet.ncols(), sheets.len()],
                });
            }
            tensor.set_sheet(k, sheet);
        }
        Ok(tensor)
    }

    /// Input dimension `n`.
    pub fn nrows(&self) -> usize {
        self.data.shape()[0]
    }

    /// Number of sheets `m` (output dimension).
    pub fn nsheets(&self) -> usize {
        self.data.shape()[2]
    }

    /// `(n, m)`.
    pub fn dim(&self) -> (usize, usize) {
        (self.nrows(), self.nsheets())
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> f64 {
        self.data[[i, j, k]]
    }

    /// Write `value` at `(i, j, k)` and `(j, i, k)`.
    pub fn set(&mut self, i: usize, j: usize, k: usize, value: f64) {
        self.data[[i, j, k]] = value;
        self.data[[j, i, k]] = value;
    }

    pub fn sheet(&self, k: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(2), k)
    }

    fn sheet_mut(&mut self, k: usize) -> ArrayViewMut2<'_, f64> {
        self.data.index_axis_mut(Axis(2), k)
    }

    /// Store the symmetric part of `matrix` as sheet `k`.
    pub fn set_sheet(&mut self, k: usize, matrix: &Matrix) {
        let n = self.nrows();
        let mut sheet = self.sheet_mut(k);
        for i in 0..n {
            sheet[[i, i]] = matrix[[i, i]];
            for j in 0..i {
                let avg = 0.5 * (matrix[[i, j]] + matrix[[j, i]]);
                sheet[[i, j]] = avg;
                sheet[[j, i]] = avg;
            }
        }
    }

    /// `self += alpha · other`; shapes must agree.
    pub fn scaled_add(&mut self, alpha: f64, other: &SymmetricTensor) {
        self.data.scaled_add(alpha, &other.data);
    }

    /// `alpha · self`.
    pub fn scaled(&self, alpha: f64) -> SymmetricTensor {
        SymmetricTensor { data: &self.data * alpha }
    }

    /// Restrict to the given rows/columns and sheets.
    ///
    /// Callers validate indices beforehand.
    pub fn select(&self, rows: &[usize], sheets: &[usize]) -> SymmetricTensor {
        let data = self.data.select(Axis(0), rows).select(Axis(1), rows).select(Axis(2), sheets);
        SymmetricTensor { data }
    }

    /// Stack sheets of tensors sharing the same `n`.
    pub fn concatenate(tensors: &[SymmetricTensor]) -> FunctionResult<SymmetricTensor> {
        let n = tensors.first().map(|t| t.nrows()).unwrap_or(0);
        let views: Vec<_> = tensors.iter().map(|t| t.data.view()).collect();
        let data = ndarray::concatenate(Axis(2), &views).map_err(|_| {
            FunctionError::TensorShapeMismatch {
                shape: tensors.iter().flat_map(|t| t.data.shape().to_vec()).collect(),
            }
        })?;
        if data.shape()[0] != n {
            return Err(FunctionError::TensorShapeMismatch { shape: data.shape().to_vec() });
        }
        Ok(SymmetricTensor { data })
    }

    /// Largest `|T[i, j, k] - T[j, i, k]|`.
    pub fn max_asymmetry(&self) -> f64 {
        let (n, m) = self.dim();
        let mut worst = 0.0_f64;
        for k in 0..m {
            for i in 0..n {
                for j in 0..i {
                    worst = worst.max((self.data[[i, j, k]] - self.data[[j, i, k]]).abs());
                }
            }
        }
        worst
    }

    pub fn as_array(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn into_array(self) -> Array3<f64> {
        self.data
    }
}

impl Index<(usize, usize, usize)> for SymmetricTensor {
    type Output = f64;

    fn index(&self, (i, j, k): (usize, usize, usize)) -> &Self::Output {
        &self.data[[i, j, k]]
    }
}
