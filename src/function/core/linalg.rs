//! Small dense linear-algebra helpers shared by the combinators.
use crate::function::{
    core::types::Matrix,
    errors::{FunctionError, FunctionResult},
};
use ndarray::{ArrayView1, Axis};

/// `dim × indices.len()` selection matrix with `P[indices[j], j] = 1`.
///
/// Multiplying a Jacobian-transpose on the right by `P` keeps the selected
/// output columns in the order given.
pub fn projection_matrix(dim: usize, indices: &[usize]) -> Matrix {
    let mut p = Matrix::zeros((dim, indices.len()));
    for (j, &i) in indices.iter().enumerate() {
        p[[i, j]] = 1.0;
    }
    p
}

/// Outer product `a bᵀ`.
pub fn outer(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> Matrix {
    a.insert_axis(Axis(1)).dot(&b.insert_axis(Axis(0)))
}

/// Stack row blocks on top of each other.
///
/// An empty list (or a list of empty blocks) yields a `0 × ncols` matrix.
pub fn stack_rows(blocks: &[Matrix], ncols: usize) -> FunctionResult<Matrix> {
    let views: Vec<_> = blocks.iter().filter(|b| b.nrows() > 0).map(|b| b.view()).collect();
    if views.is_empty() {
        return Ok(Matrix::zeros((0, ncols)));
    }
    ndarray::concatenate(Axis(0), &views).map_err(|_| FunctionError::IncompatiblePieces {
        combinator: "stack_rows",
        reason: format!(
            "row blocks have column counts {:?}",
            blocks.iter().map(|b| b.ncols()).collect::<Vec<_>>()
        ),
    })
}

/// Concatenate column blocks side by side.
pub fn stack_columns(blocks: &[Matrix], nrows: usize) -> FunctionResult<Matrix> {
    let views: Vec<_> = blocks.iter().filter(|b| b.ncols() > 0).map(|b| b.view()).collect();
    if views.is_empty() {
        return Ok(Matrix::zeros((nrows, 0)));
    }
    ndarray::concatenate(Axis(1), &views).map_err(|_| FunctionError::IncompatiblePieces {
        combinator: "stack_columns",
        reason: format!(
            "column blocks have row counts {:?}",
            blocks.iter().map(|b| b.nrows()).collect::<Vec<_>>()
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    // Purpose
    // -------
    // Verify the projection matrix selects columns in the requested order.
    //
    // Given
    // -----
    // - A 1×3 row `[10, 20, 30]` and indices `[2, 0]`.
    //
    // Expect
    // ------
    // - The product is `[30, 10]`.
    fn projection_matrix_selects_in_order() {
        // Arrange
        let row = array![[10.0, 20.0, 30.0]];

        // Act
        let picked = row.dot(&projection_matrix(3, &[2, 0]));

        // Assert
        assert_eq!(picked, array![[30.0, 10.0]]);
    }

    #[test]
    // Purpose
    // -------
    // Check stacking skips empty blocks and keeps the declared width.
    //
    // Given
    // -----
    // - A `0 × 2` block followed by a `1 × 2` block, then only empty blocks.
    //
    // Expect
    // ------
    // - The first stack is the `1 × 2` block; the second is `0 × 2`.
    fn stack_rows_skips_empty_blocks() {
        // Arrange
        let empty = Matrix::zeros((0, 2));
        let one = array![[1.0, 2.0]];

        // Act
        let stacked = stack_rows(&[empty.clone(), one.clone()], 2).unwrap();
        let nothing = stack_rows(&[empty], 2).unwrap();

        // Assert
        assert_eq!(stacked, one);
        assert_eq!(nothing.dim(), (0, 2));
        assert_eq!(outer(array![1.0, 2.0].view(), array![3.0].view()), array![[3.0], [6.0]]);
    }
}
