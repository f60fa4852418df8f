//! function::evaluation — the value-computing half of a function.
//!
//! Purpose
//! -------
//! Define the [`Evaluation`] trait: a map ℝⁿ → ℝᵐ with call counting,
//! an optional exact-match cache, an optional call history, a parameter
//! vector, and variable descriptions.
//!
//! Key behaviors
//! -------------
//! - Implementors supply the dimensions, a [`EvaluationState`] and at least
//!   one of [`Evaluation::compute`] / [`Evaluation::compute_sample`]. The
//!   public entry points [`Evaluation::evaluate`] and
//!   [`Evaluation::evaluate_sample`] wrap them with dimension checks and
//!   bookkeeping.
//! - Cache hits return the stored output and bump only the hit counter.
//! - [`Evaluation::parameter_gradient`] defaults to a forward difference in
//!   the parameter vector; combinators override it analytically.
//! - [`Evaluation::specialized_marginal`] lets an implementor offer a cheaper
//!   marginal than the generic projection composition of
//!   [`evaluation_marginal`](crate::function::marginal::evaluation_marginal).
//!
//! Invariants & assumptions
//! ------------------------
//! - `compute` receives points of length `input_dimension()`; the public
//!   wrappers enforce this before delegating.
//! - Every computed output has length `output_dimension()`; violations are
//!   reported as `OutputDimMismatch` (an internal error).
//! - Evaluations are shared as [`EvaluationHandle`] (`Arc<dyn Evaluation>`).
//!   Mutating shared state (parameters, cache toggles) through one handle is
//!   visible through every other handle to the same evaluation.
//!
//! Downstream usage
//! ----------------
//! - Combinators store handles to their sub-evaluations and override
//!   `compute`/`compute_sample` plus the parameter accessors.
//! - [`Function`](crate::function::Function) delegates its value calls here.
use crate::function::{
    core::{
        description::{Description, INPUT_PREFIX, OUTPUT_PREFIX},
        sample::Sample,
        state::EvaluationState,
        types::{Matrix, Point},
        validation::{validate_input_dim, validate_output_dim, validate_sample_dim},
    },
    errors::{FunctionError, FunctionResult},
};
use ndarray::Array2;
use std::{fmt::Debug, sync::Arc};

/// Shared handle to an evaluation.
pub type EvaluationHandle = Arc<dyn Evaluation>;

/// Value-computing half of a numerical function ℝⁿ → ℝᵐ.
///
/// Required:
/// - `name`, `input_dimension`, `output_dimension`, `state`.
/// - `compute` or `compute_sample` (each defaults in terms of the other only
///   in one direction: the sample path falls back to `compute` row by row).
///
/// Optional:
/// - parameter accessors when the parameter is not stored in `state`
///   (combinators concatenate their children's parameters);
/// - `parameter_gradient` when an analytical form is known;
/// - `specialized_marginal` for cheaper marginals;
/// - `default_input_description` / `default_output_description` when names
///   should be inherited from a wrapped evaluation.
pub trait Evaluation: Send + Sync + Debug {
    // Required methods
    fn name(&self) -> &'static str;
    fn input_dimension(&self) -> usize;
    fn output_dimension(&self) -> usize;
    fn state(&self) -> &EvaluationState;

    // ---- Raw computation ----

    /// Raw point computation without bookkeeping.
    fn compute(&self, _x: &Point) -> FunctionResult<Point> {
        Err(FunctionError::NotImplemented { method: "compute", implementor: self.name() })
    }

    /// Raw sample computation without bookkeeping; row by row by default.
    fn compute_sample(&self, xs: &Sample) -> FunctionResult<Sample> {
        let m = self.output_dimension();
        let mut out = Array2::zeros((xs.size(), m));
        for (i, row) in xs.rows().enumerate() {
            let y = self.compute(&row.to_owned())?;
            validate_output_dim(self.name(), y.len(), m)?;
            out.row_mut(i).assign(&y);
        }
        Ok(Sample::new(out))
    }

    // ---- Public calls ----

    /// Evaluate at `x` with dimension check, cache, and bookkeeping.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::InputDimMismatch`
    ///   Returned when `x.len() != input_dimension()`.
    /// - Anything `compute` returns, and `OutputDimMismatch` when the
    ///   implementor returns the wrong number of outputs.
    fn evaluate(&self, x: &Point) -> FunctionResult<Point> {
        validate_input_dim(x.len(), self.input_dimension())?;
        let state = self.state();
        if let Some(y) = state.cache_lookup(x.view()) {
            log::debug!("{}: cache hit", self.name());
            return Ok(y);
        }
        let y = self.compute(x)?;
        validate_output_dim(self.name(), y.len(), self.output_dimension())?;
        state.record(x.view(), &y);
        Ok(y)
    }

    /// Evaluate every row of `xs`.
    ///
    /// Cached rows are served from the cache; the remaining rows go through
    /// [`Evaluation::compute_sample`] as one sub-sample. The output sample
    /// carries the output description.
    fn evaluate_sample(&self, xs: &Sample) -> FunctionResult<Sample> {
        validate_sample_dim(xs.dimension(), self.input_dimension())?;
        let m = self.output_dimension();
        let state = self.state();
        let mut out = Array2::zeros((xs.size(), m));
        let mut missing = Vec::with_capacity(xs.size());
        if state.is_cache_enabled() {
            for (i, row) in xs.rows().enumerate() {
                match state.cache_lookup(row) {
                    Some(y) => out.row_mut(i).assign(&y),
                    None => missing.push(i),
                }
            }
        } else {
            missing.extend(0..xs.size());
        }
        if !missing.is_empty() {
            let sub = if missing.len() == xs.size() { xs.clone() } else { xs.select_rows(&missing) };
            let ys = self.compute_sample(&sub)?;
            validate_output_dim(self.name(), ys.dimension(), m)?;
            validate_output_dim(self.name(), ys.size() * m, sub.size() * m)?;
            state.record_sample(&sub, &ys);
            for (k, &i) in missing.iter().enumerate() {
                out.row_mut(i).assign(&ys.row(k));
            }
        }
        Sample::new(out).with_description(self.output_description())
    }

    // ---- Parameters ----

    fn parameter(&self) -> Point {
        self.state().parameter()
    }

    /// Replace the parameter vector; clears the cache.
    fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        self.state().set_parameter(parameter)
    }

    fn parameter_dimension(&self) -> usize {
        self.parameter().len()
    }

    fn parameter_description(&self) -> Description {
        self.state().parameter_description()
    }

    fn set_parameter_description(&self, description: Description) -> FunctionResult<()> {
        self.state().set_parameter_description(description)
    }

    /// Jacobian-transpose of the output with respect to the parameter,
    /// shape `parameter_dimension() × output_dimension()`.
    ///
    /// Notes
    /// -----
    /// - The default is a forward difference with step
    ///   `state().parameter_epsilon()`. It temporarily moves the parameter
    ///   through [`Evaluation::set_parameter`] and restores it afterwards,
    ///   which clears the cache.
    fn parameter_gradient(&self, x: &Point) -> FunctionResult<Matrix> {
        validate_input_dim(x.len(), self.input_dimension())?;
        let parameter = self.parameter();
        let epsilon = self.state().parameter_epsilon();
        let m = self.output_dimension();
        let mut gradient = Matrix::zeros((parameter.len(), m));
        if parameter.is_empty() {
            return Ok(gradient);
        }
        let base = self.compute(x)?;
        validate_output_dim(self.name(), base.len(), m)?;
        let mut outcome = Ok(());
        for i in 0..parameter.len() {
            let mut shifted = parameter.clone();
            shifted[i] += epsilon;
            let step = self.set_parameter(&shifted).and_then(|_| self.compute(x));
            match step {
                Ok(y) if y.len() == m => {
                    gradient.row_mut(i).assign(&((y - &base) / epsilon));
                }
                Ok(y) => {
                    outcome = validate_output_dim(self.name(), y.len(), m);
                    break;
                }
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }
        self.set_parameter(&parameter)?;
        outcome.map(|_| gradient)
    }

    // ---- Marginals ----

    /// Cheaper marginal offered by the implementor, if any.
    ///
    /// Indices are validated by the caller.
    fn specialized_marginal(&self, _indices: &[usize]) -> Option<FunctionResult<EvaluationHandle>> {
        None
    }

    // ---- Descriptions ----

    fn default_input_description(&self) -> Description {
        Description::build_default(self.input_dimension(), INPUT_PREFIX)
    }

    fn default_output_description(&self) -> Description {
        Description::build_default(self.output_dimension(), OUTPUT_PREFIX)
    }

    fn input_description(&self) -> Description {
        self.state().input_description().unwrap_or_else(|| self.default_input_description())
    }

    fn output_description(&self) -> Description {
        self.state().output_description().unwrap_or_else(|| self.default_output_description())
    }

    /// Input names followed by output names.
    fn description(&self) -> Description {
        self.input_description().concat(&self.output_description())
    }

    fn set_input_description(&self, description: Description) -> FunctionResult<()> {
        if description.len() != self.input_dimension() {
            return Err(FunctionError::DescriptionSizeMismatch {
                expected: self.input_dimension(),
                found: description.len(),
            });
        }
        self.state().store_input_description(description);
        Ok(())
    }

    fn set_output_description(&self, description: Description) -> FunctionResult<()> {
        if description.len() != self.output_dimension() {
            return Err(FunctionError::DescriptionSizeMismatch {
                expected: self.output_dimension(),
                found: description.len(),
            });
        }
        self.state().store_output_description(description);
        Ok(())
    }

    /// Set input and output names at once; the size must be `n + m`.
    fn set_description(&self, description: Description) -> FunctionResult<()> {
        let n = self.input_dimension();
        let expected = n + self.output_dimension();
        if description.len() != expected {
            return Err(FunctionError::DescriptionSizeMismatch {
                expected,
                found: description.len(),
            });
        }
        let (input, output) = description.split_at(n);
        self.state().store_input_description(input);
        self.state().store_output_description(output);
        Ok(())
    }

    // ---- Bookkeeping ----

    fn calls(&self) -> usize {
        self.state().calls()
    }

    fn enable_cache(&self) {
        self.state().enable_cache()
    }

    fn disable_cache(&self) {
        self.state().disable_cache()
    }

    fn is_cache_enabled(&self) -> bool {
        self.state().is_cache_enabled()
    }

    fn cache_hits(&self) -> usize {
        self.state().cache_hits()
    }

    fn cache_size(&self) -> usize {
        self.state().cache_size()
    }

    fn clear_cache(&self) {
        self.state().clear_cache()
    }

    fn enable_history(&self) {
        self.state().enable_history()
    }

    fn disable_history(&self) {
        self.state().disable_history()
    }

    fn is_history_enabled(&self) -> bool {
        self.state().is_history_enabled()
    }

    fn clear_history(&self) {
        self.state().clear_history()
    }

    /// Logged inputs, named with the input description.
    fn history_input(&self) -> FunctionResult<Sample> {
        self.state()
            .history_input(self.input_dimension())?
            .with_description(self.input_description())
    }

    /// Logged outputs, named with the output description.
    fn history_output(&self) -> FunctionResult<Sample> {
        self.state()
            .history_output(self.output_dimension())?
            .with_description(self.output_description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests exercise the provided trait methods through two minimal
    // implementors: one overriding nothing but the required methods, one
    // overriding `compute` with a parametric map.
    // -------------------------------------------------------------------------

    #[derive(Debug, Default)]
    struct Bare {
        state: EvaluationState,
    }

    impl Evaluation for Bare {
        fn name(&self) -> &'static str {
            "Bare"
        }
        fn input_dimension(&self) -> usize {
            1
        }
        fn output_dimension(&self) -> usize {
            1
        }
        fn state(&self) -> &EvaluationState {
            &self.state
        }
    }

    /// `y = [θ0 · x0, θ1 + x1]`
    #[derive(Debug)]
    struct Affine {
        state: EvaluationState,
    }

    impl Evaluation for Affine {
        fn name(&self) -> &'static str {
            "Affine"
        }
        fn input_dimension(&self) -> usize {
            2
        }
        fn output_dimension(&self) -> usize {
            2
        }
        fn state(&self) -> &EvaluationState {
            &self.state
        }
        fn compute(&self, x: &Point) -> FunctionResult<Point> {
            let p = self.parameter();
            Ok(array![p[0] * x[0], p[1] + x[1]])
        }
    }

    fn affine() -> Affine {
        Affine { state: EvaluationState::new(array![2.0, 1.0]) }
    }

    #[test]
    // Purpose
    // -------
    // Ensure a missing `compute` override is reported as NotImplemented.
    //
    // Given
    // -----
    // - `Bare`, which overrides only the required methods.
    //
    // Expect
    // ------
    // - `evaluate` fails with `NotImplemented { method: "compute", .. }`.
    fn evaluate_without_override_is_not_implemented() {
        // Arrange
        let bare = Bare::default();

        // Act
        let err = bare.evaluate(&array![1.0]).expect_err("no compute override");

        // Assert
        assert_eq!(err, FunctionError::NotImplemented { method: "compute", implementor: "Bare" });
    }

    #[test]
    // Purpose
    // -------
    // Verify input dimension checks on point and sample calls.
    //
    // Given
    // -----
    // - `Affine` (n = 2) called with a 3-D point and a 1-column sample.
    //
    // Expect
    // ------
    // - InputDimMismatch and SampleDimMismatch; no call is counted.
    fn evaluate_rejects_wrong_dimensions() {
        // Arrange
        let f = affine();

        // Act
        let point = f.evaluate(&array![1.0, 2.0, 3.0]);
        let sample = f.evaluate_sample(&Sample::zeros(2, 1));

        // Assert
        assert_eq!(point, Err(FunctionError::InputDimMismatch { expected: 2, found: 3 }));
        assert_eq!(sample, Err(FunctionError::SampleDimMismatch { expected: 2, found: 1 }));
        assert_eq!(f.calls(), 0);
    }

    #[test]
    // Purpose
    // -------
    // Check that sample evaluation serves cached rows and computes the rest.
    //
    // Given
    // -----
    // - Cache enabled, one point evaluated, then a two-row sample holding
    //   that point and a new one.
    //
    // Expect
    // ------
    // - Two computed calls in total, one hit, rows in input order, and the
    //   output sample named `y0, y1`.
    fn evaluate_sample_mixes_cached_and_computed_rows() {
        // Arrange
        let f = affine();
        f.enable_cache();
        f.evaluate(&array![1.0, 1.0]).unwrap();
        let xs = Sample::from_points(2, &[array![3.0, 0.0], array![1.0, 1.0]]).unwrap();

        // Act
        let ys = f.evaluate_sample(&xs).unwrap();

        // Assert
        assert_eq!(ys.data(), array![[6.0, 1.0], [2.0, 2.0]]);
        assert_eq!(f.calls(), 2);
        assert_eq!(f.cache_hits(), 1);
        assert_eq!(ys.description().unwrap().as_slice(), &["y0", "y1"]);
    }

    #[test]
    // Purpose
    // -------
    // Verify the default forward-difference parameter gradient and that the
    // parameter is restored afterwards.
    //
    // Given
    // -----
    // - `Affine` with θ = [2, 1] at x = [3, 5].
    //
    // Expect
    // ------
    // - ∂y/∂θ ≈ [[3, 0], [0, 1]] and θ unchanged.
    fn default_parameter_gradient_is_forward_difference() {
        // Arrange
        let f = affine();

        // Act
        let pg = f.parameter_gradient(&array![3.0, 5.0]).unwrap();

        // Assert
        approx::assert_abs_diff_eq!(pg, array![[3.0, 0.0], [0.0, 1.0]], epsilon = 1e-6);
        assert_eq!(f.parameter(), array![2.0, 1.0]);
    }

    #[test]
    // Purpose
    // -------
    // Ensure description setters enforce their sizes and defaults are
    // synthesized.
    //
    // Given
    // -----
    // - `Affine` (n = 2, m = 2).
    //
    // Expect
    // ------
    // - Default description is `x0, x1, y0, y1`; a 3-name description is
    //   rejected; a 4-name description is split into inputs and outputs.
    fn descriptions_default_and_enforce_size() {
        // Arrange
        let f = affine();

        // Act
        let default = f.description();
        let bad = f.set_description(Description::from(&["a", "b", "c"][..]));
        f.set_description(Description::from(&["a", "b", "c", "d"][..])).unwrap();

        // Assert
        assert_eq!(default.as_slice(), &["x0", "x1", "y0", "y1"]);
        assert_eq!(bad, Err(FunctionError::DescriptionSizeMismatch { expected: 4, found: 3 }));
        assert_eq!(f.input_description().as_slice(), &["a", "b"]);
        assert_eq!(f.output_description().as_slice(), &["c", "d"]);
        assert!(f.set_output_description(Description::from(&["z"][..])).is_err());
    }
}
