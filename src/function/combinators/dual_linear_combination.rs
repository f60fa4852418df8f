//! combinators::dual_linear_combination — `h(x) = Σ fᵢ(x) vᵢ`.
//!
//! Scalar-valued functions weighted by vector coefficients `vᵢ ∈ ℝᵐ`, so
//! the output dimension is the common coefficient length. Validation and
//! pruning follow [`linear_combination`](super::linear_combination), with
//! the sup-norm `‖vᵢ‖∞` as the magnitude of a coefficient.
//!
//! - `Dh = Σ ∇fᵢ vᵢᵀ` (`n × m`)
//! - `D²h_k = Σ vᵢ[k] D²fᵢ`
//!
//! A marginal on a single output is an ordinary linear combination with the
//! scalar coefficients `vᵢ[k]`.
use crate::function::{
    combinators::linear_combination::{keep, prune_terms, LinearCombinationEvaluation},
    core::{
        description::Description,
        linalg::{outer, stack_rows},
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
};
use ndarray::{Array2, Axis};
use rayon::prelude::*;
use std::sync::Arc;

/// Validate a dual combination; returns `(input_dim, output_dim, kept)`.
fn check_dual(
    what: &'static str, dimensions: &[(usize, usize)], coefficients: &[Point], small_coefficient: f64,
) -> FunctionResult<(usize, usize, Vec<usize>)> {
    let &(n, _) = dimensions.first().ok_or(FunctionError::EmptyCollection { what })?;
    if dimensions.len() != coefficients.len() {
        return Err(FunctionError::CollectionSizeMismatch {
            functions: dimensions.len(),
            coefficients: coefficients.len(),
        });
    }
    for (index, &(input, output)) in dimensions.iter().enumerate() {
        if output != 1 {
            return Err(FunctionError::NotScalarOutput { combinator: what, found: output });
        }
        if input != n {
            return Err(FunctionError::InconsistentInputDimension { index, expected: n, found: input });
        }
    }
    let m = coefficients[0].len();
    for (index, v) in coefficients.iter().enumerate().skip(1) {
        if v.len() != m {
            return Err(FunctionError::CoefficientDimMismatch { index, expected: m, found: v.len() });
        }
    }
    let magnitudes: Vec<f64> =
        coefficients.iter().map(|v| v.iter().fold(0.0_f64, |acc, c| acc.max(c.abs()))).collect();
    let kept = prune_terms(&magnitudes, small_coefficient, what)?;
    Ok((n, m, kept))
}

/// DualLinearCombinationEvaluation — `Σ fᵢ(x) vᵢ`.
#[derive(Debug)]
pub struct DualLinearCombinationEvaluation {
    functions: Vec<EvaluationHandle>,
    coefficients: Vec<Point>,
    input_dimension: usize,
    output_dimension: usize,
    state: EvaluationState,
}

impl DualLinearCombinationEvaluation {
    /// Errors
    /// ------
    /// - `EmptyCollection`, `CollectionSizeMismatch`, `NotScalarOutput`,
    ///   `InconsistentInputDimension`, `CoefficientDimMismatch`
    ///   for malformed inputs.
    /// - `AllCoefficientsZero` when every coefficient vector is zero.
    pub fn new(
        functions: Vec<EvaluationHandle>, coefficients: Vec<Point>, small_coefficient: f64,
    ) -> FunctionResult<Self> {
        let dims: Vec<_> = functions.iter().map(|f| (f.input_dimension(), f.output_dimension())).collect();
        let (input_dimension, output_dimension, kept) =
            check_dual("DualLinearCombinationEvaluation", &dims, &coefficients, small_coefficient)?;
        Ok(DualLinearCombinationEvaluation {
            functions: keep(&functions, &kept),
            coefficients: keep(&coefficients, &kept),
            input_dimension,
            output_dimension,
            state: EvaluationState::default(),
        })
    }

    pub fn coefficients(&self) -> &[Point] {
        &self.coefficients
    }
}

impl Evaluation for DualLinearCombinationEvaluation {
    fn name(&self) -> &'static str {
        "DualLinearCombinationEvaluation"
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
            .map(|(f, v)| f.evaluate(x).map(|y| v * y[0]))
            .try_reduce(|| Point::zeros(m), |a, b| Ok(a + b))
    }

    fn compute_sample(&self, xs: &Sample) -> FunctionResult<Sample> {
        let shape = (xs.size(), self.output_dimension);
        let data = self
            .functions
            .par_iter()
            .zip(self.coefficients.par_iter())
            .map(|(f, v)| f.evaluate_sample(xs).map(|ys| ys.data().dot(&v.view().insert_axis(Axis(0)))))
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

    /// Block `i` is `∂fᵢ/∂θᵢ · vᵢᵀ`.
    fn parameter_gradient(&self, x: &Point) -> FunctionResult<Matrix> {
        let blocks = self
            .functions
            .iter()
            .zip(&self.coefficients)
            .map(|(f, v)| f.parameter_gradient(x).map(|g| outer(g.column(0), v.view())))
            .collect::<FunctionResult<Vec<_>>>()?;
        stack_rows(&blocks, self.output_dimension)
    }

    /// A single index degenerates to a [`LinearCombinationEvaluation`];
    /// several indices keep the dual form on the selected sub-vectors.
    /// When a term's selected coefficients are all zero the generic path is
    /// used instead, so every term (and its parameters) stays in place.
    fn specialized_marginal(&self, indices: &[usize]) -> Option<FunctionResult<EvaluationHandle>> {
        let selected: Vec<Point> = self.coefficients.iter().map(|v| v.select(Axis(0), indices)).collect();
        if selected.iter().any(|v| v.iter().all(|c| *c == 0.0)) {
            return None;
        }
        if indices.len() == 1 {
            let scalars: Vec<f64> = selected.iter().map(|v| v[0]).collect();
            return Some(
                LinearCombinationEvaluation::new(self.functions.clone(), scalars, 0.0)
                    .map(|lc| Arc::new(lc) as EvaluationHandle),
            );
        }
        Some(
            DualLinearCombinationEvaluation::new(self.functions.clone(), selected, 0.0)
                .map(|dlc| Arc::new(dlc) as EvaluationHandle),
        )
    }
}

/// DualLinearCombinationGradient — `Σ ∇fᵢ vᵢᵀ`.
#[derive(Debug)]
pub struct DualLinearCombinationGradient {
    gradients: Vec<GradientHandle>,
    coefficients: Vec<Point>,
    input_dimension: usize,
    output_dimension: usize,
    state: DerivativeState,
}

impl DualLinearCombinationGradient {
    /// `Σ ∇fᵢ ⊗ vᵢ` for scalar terms `fᵢ`.
    ///
    /// Errors
    /// ------
    /// - Same as [`DualLinearCombinationEvaluation::new`].
    pub fn new(
        gradients: Vec<GradientHandle>, coefficients: Vec<Point>, small_coefficient: f64,
    ) -> FunctionResult<Self> {
        let dims: Vec<_> = gradients.iter().map(|g| (g.input_dimension(), g.output_dimension())).collect();
        let (input_dimension, output_dimension, kept) =
            check_dual("DualLinearCombinationGradient", &dims, &coefficients, small_coefficient)?;
        Ok(DualLinearCombinationGradient {
            gradients: keep(&gradients, &kept),
            coefficients: keep(&coefficients, &kept),
            input_dimension,
            output_dimension,
            state: DerivativeState::default(),
        })
    }
}

impl Gradient for DualLinearCombinationGradient {
    fn name(&self) -> &'static str {
        "DualLinearCombinationGradient"
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
            .map(|(g, v)| g.gradient(x).map(|d| outer(d.column(0), v.view())))
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

/// DualLinearCombinationHessian — sheet `k` is `Σ vᵢ[k] D²fᵢ`.
#[derive(Debug)]
pub struct DualLinearCombinationHessian {
    hessians: Vec<HessianHandle>,
    coefficients: Vec<Point>,
    input_dimension: usize,
    output_dimension: usize,
    state: DerivativeState,
}

impl DualLinearCombinationHessian {
    pub fn new(
        hessians: Vec<HessianHandle>, coefficients: Vec<Point>, small_coefficient: f64,
    ) -> FunctionResult<Self> {
        let dims: Vec<_> = hessians.iter().map(|h| (h.input_dimension(), h.output_dimension())).collect();
        let (input_dimension, output_dimension, kept) =
            check_dual("DualLinearCombinationHessian", &dims, &coefficients, small_coefficient)?;
        Ok(DualLinearCombinationHessian {
            hessians: keep(&hessians, &kept),
            coefficients: keep(&coefficients, &kept),
            input_dimension,
            output_dimension,
            state: DerivativeState::default(),
        })
    }
}

impl Hessian for DualLinearCombinationHessian {
    fn name(&self) -> &'static str {
        "DualLinearCombinationHessian"
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
            .map(|(h, v)| {
                let d = h.hessian(x)?;
                let sheet = d.sheet(0);
                let mut term = SymmetricTensor::zeros(n, m);
                for (k, &weight) in v.iter().enumerate() {
                    term.set_sheet(k, &(&sheet * weight));
                }
                Ok(term)
            })
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
    use crate::function::analytic::{ClosureEvaluation, ClosureHessian};
    use crate::function::marginal::evaluation_marginal;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Point and sample evaluation of Σ fᵢ(x) vᵢ.
    // - Coefficient-length validation and sup-norm pruning.
    // - Hessian sheets weighted by coefficient components.
    // - Single-index marginals degenerating to linear combinations, and the
    //   generic path when a term would vanish.
    // -------------------------------------------------------------------------

    fn x0() -> EvaluationHandle {
        Arc::new(ClosureEvaluation::new(2, 1, |x| Ok(array![x[0]])))
    }

    fn x1_squared() -> EvaluationHandle {
        Arc::new(ClosureEvaluation::new(2, 1, |x| Ok(array![x[1] * x[1]])))
    }

    #[test]
    // Purpose
    // -------
    // Verify evaluation on a point and a sample.
    //
    // Given
    // -----
    // - h = x0 · [1, 2] + x1² · [0, −1] at x = [3, 2] and x = [1, 1].
    //
    // Expect
    // ------
    // - [3, 6 − 4] = [3, 2] and [1, 2 − 1] = [1, 1].
    fn evaluation_sums_weighted_vectors() {
        // Arrange
        let h = DualLinearCombinationEvaluation::new(
            vec![x0(), x1_squared()],
            vec![array![1.0, 2.0], array![0.0, -1.0]],
            0.0,
        )
        .unwrap();
        let xs = Sample::new(array![[3.0, 2.0], [1.0, 1.0]]);

        // Act
        let y = h.evaluate(&array![3.0, 2.0]).unwrap();
        let ys = h.evaluate_sample(&xs).unwrap();

        // Assert
        assert_eq!(y, array![3.0, 2.0]);
        assert_eq!(ys.data(), array![[3.0, 2.0], [1.0, 1.0]]);
    }

    #[test]
    // Purpose
    // -------
    // Ensure coefficient lengths are checked and zero vectors are pruned.
    //
    // Given
    // -----
    // - Coefficients of lengths 2 and 3; then a zero vector next to [1, 0].
    //
    // Expect
    // ------
    // - `CoefficientDimMismatch { index: 1, .. }`; one surviving term.
    fn coefficients_are_validated_and_pruned() {
        // Act
        let err = DualLinearCombinationEvaluation::new(
            vec![x0(), x1_squared()],
            vec![array![1.0, 2.0], array![1.0, 2.0, 3.0]],
            0.0,
        )
        .expect_err("lengths differ");
        let pruned = DualLinearCombinationEvaluation::new(
            vec![x0(), x1_squared()],
            vec![array![1.0, 0.0], array![0.0, 0.0]],
            0.0,
        )
        .unwrap();

        // Assert
        assert_eq!(err, FunctionError::CoefficientDimMismatch { index: 1, expected: 2, found: 3 });
        assert_eq!(pruned.coefficients().len(), 1);
    }

    #[test]
    // Purpose
    // -------
    // Check Hessian sheets are weighted by coefficient components.
    //
    // Given
    // -----
    // - D²(x1²) = [[0, 0], [0, 2]] with v = [3, −1].
    //
    // Expect
    // ------
    // - Sheet 0 = [[0, 0], [0, 6]], sheet 1 = [[0, 0], [0, −2]].
    fn hessian_weights_sheets() {
        // Arrange
        let d2: HessianHandle = Arc::new(ClosureHessian::new(2, 1, |_| {
            SymmetricTensor::from_sheets(2, &[array![[0.0, 0.0], [0.0, 2.0]]])
        }));
        let h = DualLinearCombinationHessian::new(vec![d2], vec![array![3.0, -1.0]], 0.0).unwrap();

        // Act
        let t = h.hessian(&array![0.0, 0.0]).unwrap();

        // Assert
        assert_eq!(t.sheet(0), array![[0.0, 0.0], [0.0, 6.0]]);
        assert_eq!(t.sheet(1), array![[0.0, 0.0], [0.0, -2.0]]);
    }

    #[test]
    // Purpose
    // -------
    // Verify a single-index marginal is a plain linear combination.
    //
    // Given
    // -----
    // - h = x0 · [1, 2] + x1² · [0, −1]; marginal on output 1.
    //
    // Expect
    // ------
    // - A `LinearCombinationEvaluation` equal to 2 x0 − x1².
    fn single_index_marginal_is_linear_combination() {
        // Arrange
        let h = DualLinearCombinationEvaluation::new(
            vec![x0(), x1_squared()],
            vec![array![1.0, 2.0], array![0.0, -1.0]],
            0.0,
        )
        .unwrap();

        // Act
        let second = h.specialized_marginal(&[1]).expect("specialised").unwrap();

        // Assert
        assert_eq!(second.name(), "LinearCombinationEvaluation");
        assert_eq!(second.evaluate(&array![3.0, 2.0]).unwrap(), array![2.0]);
    }

    #[test]
    // Purpose
    // -------
    // Ensure a marginal that would zero out a term keeps every term and
    // its parameters.
    //
    // Given
    // -----
    // - h = (a x0) · [1, 2] + (b x1²) · [0, −1] with a = 2, b = 3; marginal
    //   on output 0, where the second term's coefficient is 0.
    //
    // Expect
    // ------
    // - No specialised marginal; the generic marginal evaluates to a x0 = 6
    //   at [3, 2] and still carries [a, b].
    fn marginal_with_vanishing_term_keeps_parameters() {
        // Arrange
        let a: EvaluationHandle =
            Arc::new(ClosureEvaluation::parametric(2, 1, array![2.0], |x, p| Ok(array![p[0] * x[0]])));
        let b: EvaluationHandle =
            Arc::new(ClosureEvaluation::parametric(2, 1, array![3.0], |x, p| Ok(array![p[0] * x[1] * x[1]])));
        let h: EvaluationHandle = Arc::new(
            DualLinearCombinationEvaluation::new(vec![a, b], vec![array![1.0, 2.0], array![0.0, -1.0]], 0.0)
                .unwrap(),
        );

        // Act
        let specialised = h.specialized_marginal(&[0]);
        let first = evaluation_marginal(&h, &[0]).unwrap();

        // Assert
        assert!(specialised.is_none());
        assert_eq!(first.evaluate(&array![3.0, 2.0]).unwrap(), array![6.0]);
        assert_eq!(first.parameter(), array![2.0, 3.0]);
    }
}
