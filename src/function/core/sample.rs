//! function::core::sample — row-major collections of points.
//!
//! Purpose
//! -------
//! Represent a set of observations sharing one dimension as an
//! `ndarray::Array2<f64>` (one row per point) with an optional per-column
//! [`Description`]. Samples are the batch currency of
//! [`Evaluation::evaluate_sample`](crate::function::Evaluation::evaluate_sample)
//! and of the finite-difference stencils.
//!
//! Invariants & assumptions
//! ------------------------
//! - When present, the description has exactly `dimension()` names.
//! - Row order is meaningful and preserved by every operation.
use crate::function::{
    core::{description::Description, types::Point},
    errors::{FunctionError, FunctionResult},
};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

/// Ordered collection of points of equal dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    data: Array2<f64>,
    description: Option<Description>,
}

impl Sample {
    /// Wrap a `size × dimension` array.
    pub fn new(data: Array2<f64>) -> Self {
        Sample { data, description: None }
    }

    /// Sample of `size` zero points in ℝ^`dimension`.
    pub fn zeros(size: usize, dimension: usize) -> Self {
        Sample::new(Array2::zeros((size, dimension)))
    }

    /// Stack `points` as rows.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::RaggedSample`
    ///   Returned when any point's length differs from `dimension`.
    pub fn from_points(dimension: usize, points: &[Point]) -> FunctionResult<Self> {
        let mut data = Array2::zeros((points.len(), dimension));
        for (row, point) in points.iter().enumerate() {
            if point.len() != dimension {
                return Err(FunctionError::RaggedSample {
                    row,
                    expected: dimension,
                    found: point.len(),
                });
            }
            data.row_mut(row).assign(point);
        }
        Ok(Sample::new(data))
    }

    /// Number of points.
    pub fn size(&self) -> usize {
        self.data.nrows()
    }

    /// Dimension of every point.
    pub fn dimension(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.data.row(index)
    }

    pub fn rows(&self) -> impl Iterator<Item = ArrayView1<'_, f64>> + '_ {
        self.data.rows().into_iter()
    }

    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn into_data(self) -> Array2<f64> {
        self.data
    }

    /// Sub-sample made of the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Sample {
        Sample { data: self.data.select(Axis(0), rows), description: self.description.clone() }
    }

    pub fn description(&self) -> Option<&Description> {
        self.description.as_ref()
    }

    /// Attach column names.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::DescriptionSizeMismatch`
    ///   Returned when `description.len() != self.dimension()`.
    pub fn set_description(&mut self, description: Description) -> FunctionResult<()> {
        if description.len() != self.dimension() {
            return Err(FunctionError::DescriptionSizeMismatch {
                expected: self.dimension(),
                found: description.len(),
            });
        }
        self.description = Some(description);
        Ok(())
    }

    /// Builder-style variant of [`Sample::set_description`].
    pub fn with_description(mut self, description: Description) -> FunctionResult<Self> {
        self.set_description(description)?;
        Ok(self)
    }
}
