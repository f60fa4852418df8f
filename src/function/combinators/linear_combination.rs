//! combinators::linear_combination — `h(x) = Σ cᵢ fᵢ(x)`.
//!
//! Purpose
//! -------
//! Weighted sums of functions sharing input and output dimensions, with
//! scalar coefficients. Derivatives are linear in the coefficients:
//! `Dh = Σ cᵢ Dfᵢ`, `D²h = Σ cᵢ D²fᵢ`.
//!
//! Key behaviors
//! -------------
//! - Construction validates the collection (non-empty, one coefficient per
//!   function, shared input and output dimensions) and prunes near-zero
//!   terms through [`prune_terms`].
//! - Point and sample evaluations run as a rayon map-reduce over the terms.
//!   Each task reads shared sub-functions and owns its accumulator; the merge
//!   is a plain sum, so results agree across thread counts up to rounding.
//! - Marginals are linear combinations of the sub-function marginals.
//!
//! Invariants & assumptions
//! ------------------------
//! - After construction no stored coefficient is zero.
//! - Parameters are the concatenation of the terms' parameters, in order.
use crate::function::{
    core::{
        description::Description,
        linalg::stack_rows,
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
use ndarray::Array2;
use rayon::prelude::*;
use std::sync::Arc;

/// prune_terms — indices of the terms that survive near-zero pruning.
///
/// Parameters
/// ----------
/// - `magnitudes`: `&[f64]`
///   Size of each coefficient (`|cᵢ|`, or the sup-norm of a vector
///   coefficient).
/// - `small_coefficient`: `f64`
///   Relative threshold in `[0, 1)`.
/// - `combinator`: `&str`
///   Name used in the warning.
///
/// Returns
/// -------
/// `FunctionResult<Vec<usize>>`
///   Positions `i` with `magnitudes[i] > small_coefficient · max(magnitudes)`,
///   in increasing order. Every dropped term is logged with `log::warn!`.
///
/// Errors
/// ------
/// - `FunctionError::AllCoefficientsZero`
///   Returned when every magnitude is zero.
pub fn prune_terms(magnitudes: &[f64], small_coefficient: f64, combinator: &str) -> FunctionResult<Vec<usize>> {
    let largest = magnitudes.iter().fold(0.0_f64, |acc, &m| acc.max(m));
    if largest == 0.0 {
        return Err(FunctionError::AllCoefficientsZero);
    }
    let threshold = small_coefficient * largest;
    let mut kept = Vec::with_capacity(magnitudes.len());
    for (i, &magnitude) in magnitudes.iter().enumerate() {
        if magnitude > threshold {
            kept.push(i);
        } else {
            log::warn!(
                "{combinator}: dropped near-zero coefficient at position {i} \
                 (magnitude {magnitude:e} <= {small_coefficient:e} * {largest:e})"
            );
        }
    }
    Ok(kept)
}

/// Shared collection checks: non-empty, sizes agree, and all members have
/// the dimensions of the first one. Returns `(input_dim, output_dim)`.
pub(crate) fn check_collection(
    what: &'static str, dimensions: &[(usize, usize)], coefficients: usize,
) -> FunctionResult<(usize, usize)> {
    let &(n, m) = dimensions.first().ok_or(FunctionError::EmptyCollection { what })?;
    if dimensions.len() != coefficients {
        return Err(FunctionError::CollectionSizeMismatch { functions: dimensions.len(), coefficients });
    }
    for (index, &(input, output)) in dimensions.iter().enumerate().skip(1) {
        if input != n {
            return Err(FunctionError::InconsistentInputDimension { index, expected: n, found: input });
        }
        if output != m {
            return Err(FunctionError::InconsistentOutputDimension { index, expected: m, found: output });
        }
    }
    Ok((n, m))
}

/// Keep only the listed positions of `items`.
pub(crate) fn keep<T: Clone>(items: &[T], kept: &[usize]) -> Vec<T> {
    kept.iter().map(|&i| items[i].clone()).collect()
}

/// LinearCombinationEvaluation — `Σ cᵢ fᵢ(x)`.
#[derive(Debug)]
pub struct LinearCombinationEvaluation {
    functions: Vec<EvaluationHandle>,
    coefficients: Vec<f64>,
    input_dimension: usize,
    output_dimension: usize,
    state: EvaluationState,
}

impl LinearCombinationEvaluation {
    /// Errors
    /// ------
    /// - `EmptyCollection`, `CollectionSizeMismatch`,
    ///   `InconsistentInputDimension`, `InconsistentOutputDimension`
    ///   for malformed collections.
    /// - `AllCoefficientsZero` when nothing survives pruning.
    pub fn new(
        functions: Vec<EvaluationHandle>, coefficients: Vec<f64>, small_coefficient: f64,
    ) -> FunctionResult<Self> {
        let dims: Vec<_> = functions.iter().map(|f| (f.input_dimension(), f.output_dimension())).collect();
        let (input_dimension, output_dimension) =
            check_collection("LinearCombinationEvaluation", &dims, coefficients.len())?;
        let magnitudes: Vec<f64> = coefficients.iter().map(|c| c.abs()).collect();
        let kept = prune_terms(&magnitudes, small_coefficient, "LinearCombinationEvaluation")?;
        Ok(LinearCombinationEvaluation {
            functions: keep(&functions, &kept),
            coefficients: keep(&coefficients, &kept),
            input_dimension,
            output_dimension,
            state: EvaluationState::default(),
        })
    }

    pub fn functions(&self) -> &[EvaluationHandle] {
        &self.functions
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

impl Evaluation for LinearCombinationEvaluation {
    fn name(&self) -> &'static str {
        "LinearCombinationEvaluation"
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
        let m = self.output_dimension;
        self.functions
            .par_iter()
            .zip(self.coefficients.par_iter())
            .map(|(f, &c)| f.evaluate(x).map(|y| y * c))
            .try_reduce(|| Point::zeros(m), |a, b| Ok(a + b))
    }

    fn compute_sample(&self, xs: &Sample) -> FunctionResult<Sample> {
        let shape = (xs.size(), self.output_dimension);
        let data = self
            .functions
            .par_iter()
            .zip(self.coefficients.par_iter())
            .map(|(f, &c)| f.evaluate_sample(xs).map(|ys| ys.into_data() * c))
            .try_reduce(|| Array2::zeros(shape), |a, b| Ok(a + b))?;
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
        let blocks = self
            .functions
            .iter()
            .zip(&self.coefficients)
            .map(|(f, &c)| f.parameter_gradient(x).map(|g| g * c))
            .collect::<FunctionResult<Vec<_>>>()?;
        stack_rows(&blocks, self.output_dimension)
    }

    fn specialized_marginal(&self, indices: &[usize]) -> Option<FunctionResult<EvaluationHandle>> {
        let build = || -> FunctionResult<EvaluationHandle> {
            let marginals = self
                .functions
                .iter()
                .map(|f| evaluation_marginal(f, indices))
                .collect::<FunctionResult<Vec<_>>>()?;
            Ok(Arc::new(LinearCombinationEvaluation::new(marginals, self.coefficients.clone(), 0.0)?))
        };
        Some(build())
    }
}

/// LinearCombinationGradient — `Σ cᵢ ∇fᵢ`.
#[derive(Debug)]
pub struct LinearCombinationGradient {
    gradients: Vec<GradientHandle>,
    coefficients: Vec<f64>,
    input_dimension: usize,
    output_dimension: usize,
    state: DerivativeState,
}

impl LinearCombinationGradient {
    /// `Σ cᵢ ∇fᵢ`.
    ///
    /// Parameters
    /// ----------
    /// - `gradients`: `Vec<GradientHandle>`
    ///   One per term, all of the same shape.
    /// - `coefficients`: `Vec<f64>`
    ///   One weight per gradient.
    /// - `small_coefficient`: `f64`
    ///   Relative pruning threshold; pass `0.0` when the terms were already
    ///   pruned upstream.
    ///
    /// Errors
    /// ------
    /// - Same as [`LinearCombinationEvaluation::new`].
    pub fn new(
        gradients: Vec<GradientHandle>, coefficients: Vec<f64>, small_coefficient: f64,
    ) -> FunctionResult<Self> {
        let dims: Vec<_> = gradients.iter().map(|g| (g.input_dimension(), g.output_dimension())).collect();
        let (input_dimension, output_dimension) =
            check_collection("LinearCombinationGradient", &dims, coefficients.len())?;
        let magnitudes: Vec<f64> = coefficients.iter().map(|c| c.abs()).collect();
        let kept = prune_terms(&magnitudes, small_coefficient, "LinearCombinationGradient")?;
        Ok(LinearCombinationGradient {
            gradients: keep(&gradients, &kept),
            coefficients: keep(&coefficients, &kept),
            input_dimension,
            output_dimension,
            state: DerivativeState::default(),
        })
    }
}

impl Gradient for LinearCombinationGradient {
    fn name(&self) -> &'static str {
        "LinearCombinationGradient"
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
        let shape = (self.input_dimension, self.output_dimension);
        self.gradients
            .par_iter()
            .zip(self.coefficients.par_iter())
            .map(|(g, &c)| g.gradient(x).map(|d| d * c))
            .try_reduce(|| Matrix::zeros(shape), |a, b| Ok(a + b))
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

/// LinearCombinationHessian — `Σ cᵢ D²fᵢ`.
#[derive(Debug)]
pub struct LinearCombinationHessian {
    hessians: Vec<HessianHandle>,
    coefficients: Vec<f64>,
    input_dimension: usize,
    output_dimension: usize,
    state: DerivativeState,
}

impl LinearCombinationHessian {
    /// `Σ cᵢ D²fᵢ`; arguments and errors as for
    /// [`LinearCombinationGradient::new`].
    pub fn new(
        hessians: Vec<HessianHandle>, coefficients: Vec<f64>, small_coefficient: f64,
    ) -> FunctionResult<Self> {
        let dims: Vec<_> = hessians.iter().map(|h| (h.input_dimension(), h.output_dimension())).collect();
        let (input_dimension, output_dimension) =
            check_collection("LinearCombinationHessian", &dims, coefficients.len())?;
        let magnitudes: Vec<f64> = coefficients.iter().map(|c| c.abs()).collect();
        let kept = prune_terms(&magnitudes, small_coefficient, "LinearCombinationHessian")?;
        Ok(LinearCombinationHessian {
            hessians: keep(&hessians, &kept),
            coefficients: keep(&coefficients, &kept),
            input_dimension,
            output_dimension,
            state: DerivativeState::default(),
        })
    }
}

impl Hessian for LinearCombinationHessian {
    fn name(&self) -> &'static str {
        "LinearCombinationHessian"
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
        let (n, m) = (self.input_dimension, self.output_dimension);
        self.hessians
            .par_iter()
            .zip(self.coefficients.par_iter())
            .map(|(h, &c)| h.hessian(x).map(|d| d.scaled(c)))
            .try_reduce(
                || SymmetricTensor::zeros(n, m),
                |mut a, b| {
                    a.scaled_add(1.0, &b);
                    Ok(a)
                },
            )
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
    use crate::function::analytic::{ClosureEvaluation, ClosureHessian, ConstantGradient};
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Linearity of point and sample evaluation.
    // - Pruning policy and the all-zero rejection.
    // - Collection validation.
    // - Linear gradients and marginals.
    // - Weighted sums of Hessians.
    // -------------------------------------------------------------------------

    fn square() -> EvaluationHandle {
        Arc::new(ClosureEvaluation::new(1, 2, |x| Ok(array![x[0] * x[0], 1.0])))
    }

    fn shift() -> EvaluationHandle {
        Arc::new(ClosureEvaluation::new(1, 2, |x| Ok(array![x[0] + 1.0, -x[0]])))
    }

    #[test]
    // Purpose
    // -------
    // Verify `(a f + b g)(x) = a f(x) + b g(x)` on points and samples.
    //
    // Given
    // -----
    // - f(x) = [x², 1], g(x) = [x + 1, −x], a = 2, b = −3.
    //
    // Expect
    // ------
    // - At x = 2: [2·4 − 3·3, 2·1 + 3·2] = [−1, 8], identical on the sample path.
    fn evaluation_is_linear_in_coefficients() {
        // Arrange
        let h = LinearCombinationEvaluation::new(vec![square(), shift()], vec![2.0, -3.0], 0.0).unwrap();
        let xs = Sample::new(array![[2.0], [0.0]]);

        // Act
        let y = h.evaluate(&array![2.0]).unwrap();
        let ys = h.evaluate_sample(&xs).unwrap();

        // Assert
        assert_eq!(y, array![-1.0, 8.0]);
        assert_eq!(ys.data(), array![[-1.0, 8.0], [-3.0, 2.0]]);
    }

    #[test]
    // Purpose
    // -------
    // Check the pruning policy and the all-zero rejection.
    //
    // Given
    // -----
    // - Magnitudes [1, 1e-12, 0.5] with threshold 1e-10, then all zeros.
    //
    // Expect
    // ------
    // - Positions [0, 2] survive; the all-zero set is `AllCoefficientsZero`.
    // - With threshold 0 only exact zeros are dropped.
    fn prune_terms_drops_small_and_rejects_all_zero() {
        // Act
        let kept = prune_terms(&[1.0, 1e-12, 0.5], 1e-10, "test").unwrap();
        let exact = prune_terms(&[1.0, 0.0, 1e-300], 0.0, "test").unwrap();
        let zero = prune_terms(&[0.0, 0.0], 0.5, "test");

        // Assert
        assert_eq!(kept, vec![0, 2]);
        assert_eq!(exact, vec![0, 2]);
        assert_eq!(zero, Err(FunctionError::AllCoefficientsZero));
    }

    #[test]
    // Purpose
    // -------
    // Ensure malformed collections are rejected.
    //
    // Given
    // -----
    // - No functions; two functions with one coefficient; functions with
    //   different output dimensions.
    //
    // Expect
    // ------
    // - EmptyCollection, CollectionSizeMismatch, InconsistentOutputDimension.
    fn malformed_collections_are_rejected() {
        // Arrange
        let scalar: EvaluationHandle = Arc::new(ClosureEvaluation::new(1, 1, |x| Ok(x.clone())));

        // Act
        let empty = LinearCombinationEvaluation::new(vec![], vec![], 0.0).expect_err("empty");
        let sizes = LinearCombinationEvaluation::new(vec![square(), shift()], vec![1.0], 0.0).expect_err("sizes");
        let outputs = LinearCombinationEvaluation::new(vec![square(), scalar], vec![1.0, 1.0], 0.0).expect_err("outputs");

        // Assert
        assert_eq!(empty, FunctionError::EmptyCollection { what: "LinearCombinationEvaluation" });
        assert_eq!(sizes, FunctionError::CollectionSizeMismatch { functions: 2, coefficients: 1 });
        assert_eq!(outputs, FunctionError::InconsistentOutputDimension { index: 1, expected: 2, found: 1 });
    }

    #[test]
    // Purpose
    // -------
    // Verify the gradient is the coefficient-weighted sum.
    //
    // Given
    // -----
    // - Constant gradients [[1, 2]] and [[3, 4]] with coefficients 2 and −1.
    //
    // Expect
    // ------
    // - [[2 − 3, 4 − 4]] = [[−1, 0]].
    fn gradient_is_weighted_sum() {
        // Arrange
        let a: GradientHandle = Arc::new(ConstantGradient::new(array![[1.0, 2.0]]));
        let b: GradientHandle = Arc::new(ConstantGradient::new(array![[3.0, 4.0]]));
        let g = LinearCombinationGradient::new(vec![a, b], vec![2.0, -1.0], 0.0).unwrap();

        // Act
        let d = g.gradient(&array![0.0]).unwrap();

        // Assert
        assert_eq!(d, array![[-1.0, 0.0]]);
    }

    #[test]
    // Purpose
    // -------
    // Check the specialised marginal keeps the combination structure.
    //
    // Given
    // -----
    // - h = 2 f + g with f = [x², 1], g = [x + 1, −x]; marginal on output 1.
    //
    // Expect
    // ------
    // - The marginal is scalar and equals 2 − x; at x = 3 that is −1.
    fn marginal_combines_sub_marginals() {
        // Arrange
        let h = LinearCombinationEvaluation::new(vec![square(), shift()], vec![2.0, 1.0], 0.0).unwrap();

        // Act
        let marginal = h.specialized_marginal(&[1]).expect("specialised").unwrap();
        let y = marginal.evaluate(&array![3.0]).unwrap();

        // Assert
        assert_eq!(marginal.output_dimension(), 1);
        assert_eq!(marginal.name(), "LinearCombinationEvaluation");
        assert_eq!(y, array![-1.0]);
    }

    #[test]
    // Purpose
    // -------
    // Verify the Hessian of a combination is `Σ cᵢ D²fᵢ` for point-dependent
    // sub-Hessians.
    //
    // Given
    // -----
    // - f₁ = x0² x1 with D²f₁ = [[2 x1, 2 x0], [2 x0, 0]].
    // - f₂ = x0 x1² with D²f₂ = [[0, 2 x1], [2 x1, 2 x0]].
    // - Coefficients 2 and −1, x = [1, 2].
    //
    // Expect
    // ------
    // - 2 [[4, 2], [2, 0]] − [[0, 4], [4, 2]] = [[8, 0], [0, −2]].
    fn hessian_is_weighted_sum_of_sub_hessians() {
        // Arrange
        let f1: HessianHandle = Arc::new(ClosureHessian::new(2, 1, |x| {
            SymmetricTensor::from_sheets(2, &[array![[2.0 * x[1], 2.0 * x[0]], [2.0 * x[0], 0.0]]])
        }));
        let f2: HessianHandle = Arc::new(ClosureHessian::new(2, 1, |x| {
            SymmetricTensor::from_sheets(2, &[array![[0.0, 2.0 * x[1]], [2.0 * x[1], 2.0 * x[0]]]])
        }));
        let h = LinearCombinationHessian::new(vec![f1, f2], vec![2.0, -1.0], 0.0).unwrap();

        // Act
        let d = h.hessian(&array![1.0, 2.0]).unwrap();

        // Assert
        assert_eq!(d.dim(), (2, 1));
        assert_eq!(d.sheet(0), array![[8.0, 0.0], [0.0, -2.0]].view());
    }
}
