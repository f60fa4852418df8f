//! combinators::aggregated — stack the outputs of several functions.
//!
//! Purpose
//! -------
//! `h(x) = [f₁(x), f₂(x), …]` for functions sharing the input dimension.
//! The output dimension is the sum of the children's output dimensions.
//!
//! Key behaviors
//! -------------
//! - Gradients are concatenated column-wise, Hessians sheet-wise.
//! - The parameter gradient is block diagonal: `θᵢ` only moves `fᵢ`.
//! - Marginals select inside each child, so a marginal contained in one
//!   block is that block's own marginal (or the block itself when the
//!   selection covers it in order). No projection is layered on top.
//!
//! Invariants & assumptions
//! ------------------------
//! - At least one child; every child has `input_dimension() == n`.
use crate::function::{
    core::{
        description::Description,
        linalg::stack_columns,
        sample::Sample,
        state::{DerivativeState, EvaluationState},
        tensor::SymmetricTensor,
        types::{Matrix, Point},
        validation::{concat_points, split_parameter},
    },
    errors::{FunctionError, FunctionResult},
    evaluation::{Evaluation, EvaluationHandle},
    gradient::{Gradient, GradientHandle},
    hessian::{Hessian, HessianHandle},
    marginal::evaluation_marginal,
};
use ndarray::{s, Axis};
use std::sync::Arc;

fn check_blocks(what: &'static str, inputs: &[usize]) -> FunctionResult<usize> {
    let &n = inputs.first().ok_or(FunctionError::EmptyCollection { what })?;
    for (index, &found) in inputs.iter().enumerate() {
        if found != n {
            return Err(FunctionError::InconsistentInputDimension { index, expected: n, found });
        }
    }
    Ok(n)
}

/// AggregatedEvaluation — concatenated outputs.
#[derive(Debug)]
pub struct AggregatedEvaluation {
    functions: Vec<EvaluationHandle>,
    input_dimension: usize,
    output_dimension: usize,
    state: EvaluationState,
}

impl AggregatedEvaluation {
    /// Errors
    /// ------
    /// - `EmptyCollection` for an empty list.
    /// - `InconsistentInputDimension` naming the first offending child.
    pub fn new(functions: Vec<EvaluationHandle>) -> FunctionResult<Self> {
        let inputs: Vec<_> = functions.iter().map(|f| f.input_dimension()).collect();
        let input_dimension = check_blocks("AggregatedEvaluation", &inputs)?;
        let output_dimension = functions.iter().map(|f| f.output_dimension()).sum();
        Ok(AggregatedEvaluation { functions, input_dimension, output_dimension, state: EvaluationState::default() })
    }

    pub fn functions(&self) -> &[EvaluationHandle] {
        &self.functions
    }

    /// Map a global output index to `(block, local index)`.
    fn locate(&self, index: usize) -> (usize, usize) {
        let mut offset = 0;
        for (block, f) in self.functions.iter().enumerate() {
            let m = f.output_dimension();
            if index < offset + m {
                return (block, index - offset);
            }
            offset += m;
        }
        (self.functions.len(), index - offset)
    }

    fn block_marginal(&self, block: usize, local: &[usize]) -> FunctionResult<EvaluationHandle> {
        let f = &self.functions[block];
        let whole = local.len() == f.output_dimension() && local.iter().enumerate().all(|(i, &k)| i == k);
        if whole {
            Ok(f.clone())
        } else {
            evaluation_marginal(f, local)
        }
    }
}

impl Evaluation for AggregatedEvaluation {
    fn name(&self) -> &'static str {
        "AggregatedEvaluation"
    }

    fn input_dimension(&self) -> usize {
        self.input_dimension
    }

    fn output_dimension(&self) -> usize {
        self.output_dimension
    }

    fn state(&self) -> &EvaluationState {
        &self.state
    }

    fn compute(&self, x: &Point) -> FunctionResult<Point> {
        let blocks = self.functions.iter().map(|f| f.evaluate(x)).collect::<FunctionResult<Vec<_>>>()?;
        Ok(concat_points(&blocks))
    }

    fn compute_sample(&self, xs: &Sample) -> FunctionResult<Sample> {
        let blocks = self.functions.iter().map(|f| f.evaluate_sample(xs)).collect::<FunctionResult<Vec<_>>>()?;
        let views: Vec<_> = blocks.iter().map(|b| b.data()).collect();
        let data = ndarray::concatenate(Axis(1), &views)
            .map_err(|e| FunctionError::IncompatiblePieces { combinator: "AggregatedEvaluation", reason: e.to_string() })?;
        Ok(Sample::new(data))
    }

    fn parameter(&self) -> Point {
        concat_points(&self.functions.iter().map(|f| f.parameter()).collect::<Vec<_>>())
    }

    fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        let dims: Vec<_> = self.functions.iter().map(|f| f.parameter_dimension()).collect();
        for (f, block) in self.functions.iter().zip(split_parameter(parameter, &dims)?) {
            f.set_parameter(&block)?;
        }
        self.state.clear_cache();
        Ok(())
    }

    fn parameter_description(&self) -> Description {
        self.functions
            .iter()
            .fold(Description::default(), |acc, f| acc.concat(&f.parameter_description()))
    }

    fn parameter_gradient(&self, x: &Point) -> FunctionResult<Matrix> {
        let blocks =
            self.functions.iter().map(|f| f.parameter_gradient(x)).collect::<FunctionResult<Vec<_>>>()?;
        let rows = blocks.iter().map(|b| b.nrows()).sum();
        let mut gradient = Matrix::zeros((rows, self.output_dimension));
        let (mut r, mut c) = (0, 0);
        for block in &blocks {
            let (p, m) = block.dim();
            gradient.slice_mut(s![r..r + p, c..c + m]).assign(block);
            r += p;
            c += m;
        }
        Ok(gradient)
    }

    fn specialized_marginal(&self, indices: &[usize]) -> Option<FunctionResult<EvaluationHandle>> {
        // Consecutive indices landing in the same block form one run.
        let mut runs: Vec<(usize, Vec<usize>)> = Vec::new();
        for &index in indices {
            let (block, local) = self.locate(index);
            match runs.last_mut() {
                Some((current, locals)) if *current == block => locals.push(local),
                _ => runs.push((block, vec![local])),
            }
        }
        let pieces = runs
            .iter()
            .map(|(block, local)| self.block_marginal(*block, local))
            .collect::<FunctionResult<Vec<_>>>();
        Some(pieces.and_then(|mut pieces| {
            if pieces.len() == 1 {
                Ok(pieces.remove(0))
            } else {
                AggregatedEvaluation::new(pieces).map(|a| Arc::new(a) as EvaluationHandle)
            }
        }))
    }

    fn default_input_description(&self) -> Description {
        self.functions[0].input_description()
    }

    fn default_output_description(&self) -> Description {
        self.functions
            .iter()
            .fold(Description::default(), |acc, f| acc.concat(&f.output_description()))
    }
}

/// AggregatedGradient — column blocks `[Df₁ | Df₂ | …]`.
#[derive(Debug)]
pub struct AggregatedGradient {
    gradients: Vec<GradientHandle>,
    input_dimension: usize,
    output_dimension: usize,
    state: DerivativeState,
}

impl AggregatedGradient {
    /// Stack the children's gradients column-wise, in order.
    ///
    /// Errors
    /// ------
    /// - `EmptyCollection` for an empty list.
    /// - `InconsistentInputDimension` naming the first offending child.
    pub fn new(gradients: Vec<GradientHandle>) -> FunctionResult<Self> {
        let inputs: Vec<_> = gradients.iter().map(|g| g.input_dimension()).collect();
        let input_dimension = check_blocks("AggregatedGradient", &inputs)?;
        let output_dimension = gradients.iter().map(|g| g.output_dimension()).sum();
        Ok(AggregatedGradient { gradients, input_dimension, output_dimension, state: DerivativeState::default() })
    }
}

impl Gradient for AggregatedGradient {
    fn name(&self) -> &'static str {
        "AggregatedGradient"
    }

    fn input_dimension(&self) -> usize {
        self.input_dimension
    }

    fn output_dimension(&self) -> usize {
        self.output_dimension
    }

    fn state(&self) -> &DerivativeState {
        &self.state
    }

    fn compute(&self, x: &Point) -> FunctionResult<Matrix> {
        let blocks = self.gradients.iter().map(|g| g.gradient(x)).collect::<FunctionResult<Vec<_>>>()?;
        stack_columns(&blocks, self.input_dimension)
    }

    fn parameter(&self) -> Point {
        concat_points(&self.gradients.iter().map(|g| g.parameter()).collect::<Vec<_>>())
    }

    fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        let dims: Vec<_> = self.gradients.iter().map(|g| g.parameter_dimension()).collect();
        for (g, block) in self.gradients.iter().zip(split_parameter(parameter, &dims)?) {
            g.set_parameter(&block)?;
        }
        Ok(())
    }
}

/// AggregatedHessian — sheets of every child in order.
#[derive(Debug)]
pub struct AggregatedHessian {
    hessians: Vec<HessianHandle>,
    input_dimension: usize,
    output_dimension: usize,
    state: DerivativeState,
}

impl AggregatedHessian {
    /// Same checks as [`AggregatedGradient::new`].
    pub fn new(hessians: Vec<HessianHandle>) -> FunctionResult<Self> {
        let inputs: Vec<_> = hessians.iter().map(|h| h.input_dimension()).collect();
        let input_dimension = check_blocks("AggregatedHessian", &inputs)?;
        let output_dimension = hessians.iter().map(|h| h.output_dimension()).sum();
        Ok(AggregatedHessian { hessians, input_dimension, output_dimension, state: DerivativeState::default() })
    }
}

impl Hessian for AggregatedHessian {
    fn name(&self) -> &'static str {
        "AggregatedHessian"
    }

    fn input_dimension(&self) -> usize {
        self.input_dimension
    }

    fn output_dimension(&self) -> usize {
        self.output_dimension
    }

    fn state(&self) -> &DerivativeState {
        &self.state
    }

    fn compute(&self, x: &Point) -> FunctionResult<SymmetricTensor> {
        let blocks = self.hessians.iter().map(|h| h.hessian(x)).collect::<FunctionResult<Vec<_>>>()?;
        SymmetricTensor::concatenate(&blocks)
    }

    fn parameter(&self) -> Point {
        concat_points(&self.hessians.iter().map(|h| h.parameter()).collect::<Vec<_>>())
    }

    fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        let dims: Vec<_> = self.hessians.iter().map(|h| h.parameter_dimension()).collect();
        for (h, block) in self.hessians.iter().zip(split_parameter(parameter, &dims)?) {
            h.set_parameter(&block)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::analytic::{ClosureEvaluation, ClosureGradient, ConstantHessian};
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Output concatenation for points and samples.
    // - Column-wise gradient stacking.
    // - Marginals resolved inside the children.
    // - Block-diagonal parameter gradients.
    // - Hessian sheet stacking.
    // -------------------------------------------------------------------------

    fn square_and_sum() -> EvaluationHandle {
        Arc::new(ClosureEvaluation::new(2, 2, |x| Ok(array![x[0] * x[0], x[0] + x[1]])))
    }

    fn product() -> EvaluationHandle {
        Arc::new(ClosureEvaluation::new(2, 1, |x| Ok(array![x[0] * x[1]])))
    }

    #[test]
    // Purpose
    // -------
    // Verify the outputs are concatenated in child order.
    //
    // Given
    // -----
    // - [x0², x0 + x1] aggregated with [x0 x1] at x = [2, 3] and a sample.
    //
    // Expect
    // ------
    // - [4, 5, 6]; the sample rows agree with point evaluation.
    fn outputs_are_concatenated() {
        // Arrange
        let h = AggregatedEvaluation::new(vec![square_and_sum(), product()]).unwrap();
        let xs = Sample::new(array![[2.0, 3.0], [1.0, -1.0]]);

        // Act
        let y = h.evaluate(&array![2.0, 3.0]).unwrap();
        let ys = h.evaluate_sample(&xs).unwrap();

        // Assert
        assert_eq!(h.output_dimension(), 3);
        assert_eq!(y, array![4.0, 5.0, 6.0]);
        assert_eq!(ys.data(), array![[4.0, 5.0, 6.0], [1.0, 0.0, -1.0]]);
        assert_eq!(ys.description().unwrap().as_slice(), &["y0", "y1", "y0"]);
    }

    #[test]
    // Purpose
    // -------
    // Ensure mismatched inputs are rejected and gradients stack by column.
    //
    // Given
    // -----
    // - A 2-input and a 3-input function; then two gradient pieces.
    //
    // Expect
    // ------
    // - `InconsistentInputDimension { index: 1, expected: 2, found: 3 }`.
    // - A 2 × 3 gradient [[2 x0, 1, x1], [0, 1, x0]].
    fn construction_checks_and_gradient_stacking() {
        // Arrange
        let wide: EvaluationHandle = Arc::new(ClosureEvaluation::new(3, 1, |x| Ok(array![x.sum()])));
        let g1: GradientHandle =
            Arc::new(ClosureGradient::new(2, 2, |x| Ok(array![[2.0 * x[0], 1.0], [0.0, 1.0]])));
        let g2: GradientHandle = Arc::new(ClosureGradient::new(2, 1, |x| Ok(array![[x[1]], [x[0]]])));

        // Act
        let err = AggregatedEvaluation::new(vec![square_and_sum(), wide]).expect_err("inputs differ");
        let d = AggregatedGradient::new(vec![g1, g2]).unwrap().gradient(&array![2.0, 3.0]).unwrap();

        // Assert
        assert_eq!(err, FunctionError::InconsistentInputDimension { index: 1, expected: 2, found: 3 });
        assert_eq!(d, array![[4.0, 1.0, 3.0], [0.0, 1.0, 2.0]]);
    }

    #[test]
    // Purpose
    // -------
    // Check marginals resolve inside the children.
    //
    // Given
    // -----
    // - h = [x0², x0 + x1, x0 x1]; marginals [0, 1], [2], and [2, 0].
    //
    // Expect
    // ------
    // - [0, 1] returns the first child itself.
    // - [2] returns the second child itself.
    // - [2, 0] is an aggregation of two pieces evaluating to [6, 4].
    fn marginals_select_inside_blocks() {
        // Arrange
        let first = square_and_sum();
        let second = product();
        let h = AggregatedEvaluation::new(vec![first.clone(), second.clone()]).unwrap();
        let x = array![2.0, 3.0];

        // Act
        let m01 = h.specialized_marginal(&[0, 1]).unwrap().unwrap();
        let m2 = h.specialized_marginal(&[2]).unwrap().unwrap();
        let m20 = h.specialized_marginal(&[2, 0]).unwrap().unwrap();

        // Assert
        assert!(Arc::ptr_eq(&m01, &first));
        assert!(Arc::ptr_eq(&m2, &second));
        assert_eq!(m20.name(), "AggregatedEvaluation");
        assert_eq!(m20.evaluate(&x).unwrap(), array![6.0, 4.0]);
    }

    #[test]
    // Purpose
    // -------
    // Verify the parameter gradient is block diagonal.
    //
    // Given
    // -----
    // - f₁(x; a) = a x0 and f₂(x; b) = [b, 2b] with a = 1, b = 5 at x = [3, 0].
    //
    // Expect
    // ------
    // - Rows [a, b], columns [f₁, f₂₀, f₂₁]: [[3, 0, 0], [0, 1, 2]].
    fn parameter_gradient_is_block_diagonal() {
        // Arrange
        let f1: EvaluationHandle =
            Arc::new(ClosureEvaluation::parametric(2, 1, array![1.0], |x, p| Ok(array![p[0] * x[0]])));
        let f2: EvaluationHandle =
            Arc::new(ClosureEvaluation::parametric(2, 2, array![5.0], |_, p| Ok(array![p[0], 2.0 * p[0]])));
        let h = AggregatedEvaluation::new(vec![f1, f2]).unwrap();

        // Act
        let pg = h.parameter_gradient(&array![3.0, 0.0]).unwrap();

        // Assert
        assert_eq!(h.parameter(), array![1.0, 5.0]);
        approx::assert_abs_diff_eq!(pg, array![[3.0, 0.0, 0.0], [0.0, 1.0, 2.0]], epsilon = 1e-5);
    }

    #[test]
    // Purpose
    // -------
    // Verify the aggregated Hessian stacks the children's sheets in order.
    //
    // Given
    // -----
    // - A 2→1 child with sheet [[1, 2], [2, 3]] and a 2→2 child with sheets
    //   [[4, 0], [0, 5]] and [[0, 6], [6, 0]].
    //
    // Expect
    // ------
    // - Shape (2, 3); sheet 0 from the first child, sheets 1 and 2 from the
    //   second, unchanged.
    fn hessian_sheets_are_stacked_in_child_order() {
        // Arrange
        let first_sheets = vec![array![[1.0, 2.0], [2.0, 3.0]]];
        let second_sheets = vec![array![[4.0, 0.0], [0.0, 5.0]], array![[0.0, 6.0], [6.0, 0.0]]];
        let first: HessianHandle =
            Arc::new(ConstantHessian::new(SymmetricTensor::from_sheets(2, &first_sheets).unwrap()));
        let second: HessianHandle =
            Arc::new(ConstantHessian::new(SymmetricTensor::from_sheets(2, &second_sheets).unwrap()));
        let h = AggregatedHessian::new(vec![first, second]).unwrap();

        // Act
        let d = h.hessian(&array![0.5, -1.0]).unwrap();

        // Assert
        assert_eq!(h.output_dimension(), 3);
        assert_eq!(d.dim(), (2, 3));
        assert_eq!(d.sheet(0), first_sheets[0].view());
        assert_eq!(d.sheet(1), second_sheets[0].view());
        assert_eq!(d.sheet(2), second_sheets[1].view());
    }
}
