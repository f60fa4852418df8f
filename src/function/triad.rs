//! function::triad — the [`Function`] bundle of evaluation, gradient, Hessian.
//!
//! Purpose
//! -------
//! Present one evaluation together with its first and second derivatives as
//! a single callable unit, and build new units from existing ones through
//! the combinators.
//!
//! Key behaviors
//! -------------
//! - Construction paths:
//!   - evaluation only ([`Function::from_evaluation`]): both derivatives are
//!     centered finite differences and both `use_default_*` flags are set;
//!   - explicit pieces ([`Function::from_parts`]): flags cleared;
//!   - combinators ([`Function::compose`], [`Function::product`], …): the
//!     analytical derivative combinator is tried first. When it reports an
//!     invalid-argument error the piece is replaced by a finite difference
//!     on the combined evaluation, a warning is logged, and the flag is set.
//!     Flags of the operands are inherited.
//! - Runtime derivative calls ([`Function::gradient`], [`Function::hessian`]):
//!   - a warning is logged on every call made through a default stand-in;
//!   - when the held piece fails, a fresh finite difference on the current
//!     evaluation is tried;
//!   - when that also fails the call returns `DerivativeFailure` carrying
//!     the point and both messages.
//! - Marginals are taken piece by piece; all three keep the parameter
//!   vector of the original function.
//!
//! Invariants & assumptions
//! ------------------------
//! - The three pieces share input and output dimensions.
//! - Derivative pieces either carry the evaluation's parameter dimension or
//!   none at all; [`Function::set_parameter`] updates every piece whose
//!   dimension fits.
//! - Cloning a `Function` shares the handles, hence parameters, caches, and
//!   history. There is no deep copy.
//!
//! Conventions
//! -----------
//! - `NotImplemented` errors are never absorbed: a missing override is a
//!   programming error and reaches the caller unchanged.
//! - Dimension errors on the call point are reported before any fallback
//!   is attempted.
//!
//! Downstream usage
//! ----------------
//! - `optimization::adapter` wraps a scalar `Function` for argmin solvers.
//! - The arithmetic operators in [`ops`](crate::function::ops) build linear
//!   combinations and products from `&Function` operands.
use crate::function::{
    analytic::{ConstantGradient, ConstantHessian, LinearEvaluation},
    combinators::{
        aggregated::{AggregatedEvaluation, AggregatedGradient, AggregatedHessian},
        composition::{ComposedEvaluation, ComposedGradient, ComposedHessian},
        dual_linear_combination::{
            DualLinearCombinationEvaluation, DualLinearCombinationGradient, DualLinearCombinationHessian,
        },
        indicator::{ComparisonOperator, IndicatorEvaluation},
        linear_combination::{
            prune_terms, LinearCombinationEvaluation, LinearCombinationGradient, LinearCombinationHessian,
        },
        parametric::{ParametricEvaluation, ParametricGradient, ParametricHessian},
        product::{ProductEvaluation, ProductGradient, ProductHessian},
    },
    core::{
        description::Description,
        options::FunctionOptions,
        sample::Sample,
        tensor::SymmetricTensor,
        types::{Matrix, Point},
        validation::validate_input_dim,
    },
    errors::{ErrorKind, FunctionError, FunctionResult},
    evaluation::{Evaluation, EvaluationHandle},
    finite_diff::{CenteredFiniteDifferenceGradient, CenteredFiniteDifferenceHessian},
    formula::FormulaEngine,
    gradient::{Gradient, GradientHandle},
    hessian::{Hessian, HessianHandle},
    marginal::{evaluation_marginal, gradient_marginal, hessian_marginal, projected_evaluation},
};
use std::sync::Arc;

/// Function — evaluation, gradient, and Hessian presented as one unit.
///
/// Fields
/// ------
/// - `evaluation`, `gradient`, `hessian`: shared handles to the pieces.
/// - `use_default_gradient`, `use_default_hessian`: `true` while the
///   corresponding piece is a finite-difference stand-in (or was built from
///   one).
/// - `options`: steps and thresholds used for fallbacks and combinators.
#[derive(Debug, Clone)]
pub struct Function {
    evaluation: EvaluationHandle,
    gradient: GradientHandle,
    hessian: HessianHandle,
    use_default_gradient: bool,
    use_default_hessian: bool,
    options: FunctionOptions,
}

impl Function {
    // ---- Construction ----

    /// Wrap an evaluation with finite-difference derivatives and default
    /// options.
    ///
    /// Parameters
    /// ----------
    /// - `evaluation`: `EvaluationHandle`
    ///   The evaluation to wrap. It is shared, not copied.
    ///
    /// Returns
    /// -------
    /// `FunctionResult<Function>`
    ///   A function whose gradient and Hessian are centered finite
    ///   differences of `evaluation`, with both `use_default_*` flags set.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::InvalidEpsilon`
    ///   Returned for a non-positive step; the default steps are valid.
    pub fn from_evaluation(evaluation: EvaluationHandle) -> FunctionResult<Self> {
        Self::from_evaluation_with_options(evaluation, FunctionOptions::default())
    }

    /// Wrap an evaluation with finite-difference derivatives using the steps
    /// in `options`.
    ///
    /// Parameters
    /// ----------
    /// - `evaluation`: `EvaluationHandle`
    ///   The evaluation to wrap.
    /// - `options`: `FunctionOptions`
    ///   `gradient_epsilon` and `hessian_epsilon` become the steps of the two
    ///   stand-ins; the same options drive later runtime fallbacks.
    ///
    /// Returns
    /// -------
    /// `FunctionResult<Function>`
    ///   As [`Function::from_evaluation`], with both flags set.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::InvalidEpsilon`
    ///   Returned when a step is not strictly positive. Options built through
    ///   `FunctionOptions::new` never hit this.
    ///
    /// Notes
    /// -----
    /// - The evaluation adopts the cache capacity and parameter step of
    ///   `options`. Every other `Function` sharing the handle sees the change.
    pub fn from_evaluation_with_options(
        evaluation: EvaluationHandle, options: FunctionOptions,
    ) -> FunctionResult<Self> {
        evaluation.state().apply_options(&options);
        let gradient = CenteredFiniteDifferenceGradient::with_step(evaluation.clone(), options.gradient_epsilon)?;
        let hessian = CenteredFiniteDifferenceHessian::with_step(evaluation.clone(), options.hessian_epsilon)?;
        Ok(Function {
            evaluation,
            gradient: Arc::new(gradient),
            hessian: Arc::new(hessian),
            use_default_gradient: true,
            use_default_hessian: true,
            options,
        })
    }

    /// Bundle three explicit pieces.
    ///
    /// Parameters
    /// ----------
    /// - `evaluation`, `gradient`, `hessian`: shared handles. The derivative
    ///   pieces may carry no parameters at all, in which case
    ///   [`Function::set_parameter`] leaves them alone.
    ///
    /// Returns
    /// -------
    /// `FunctionResult<Function>`
    ///   A function with default options and both `use_default_*` flags
    ///   cleared.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::IncompatiblePieces`
    ///   Returned when the pieces disagree on input or output dimension, or
    ///   when a derivative carries a parameter vector of a different length
    ///   than the evaluation's.
    pub fn from_parts(
        evaluation: EvaluationHandle, gradient: GradientHandle, hessian: HessianHandle,
    ) -> FunctionResult<Self> {
        let shape = (evaluation.input_dimension(), evaluation.output_dimension());
        check_piece("gradient", shape, (gradient.input_dimension(), gradient.output_dimension()))?;
        check_piece("Hessian", shape, (hessian.input_dimension(), hessian.output_dimension()))?;
        let p = evaluation.parameter_dimension();
        for (piece, found) in [("gradient", gradient.parameter_dimension()), ("Hessian", hessian.parameter_dimension())] {
            if found != 0 && found != p {
                return Err(FunctionError::IncompatiblePieces {
                    combinator: "Function",
                    reason: format!("{piece} has {found} parameters, evaluation has {p}"),
                });
            }
        }
        Ok(Function {
            evaluation,
            gradient,
            hessian,
            use_default_gradient: false,
            use_default_hessian: false,
            options: FunctionOptions::default(),
        })
    }

    /// Affine function `y = c + Lᵀ (x − x₀)` with exact derivatives.
    ///
    /// Parameters
    /// ----------
    /// - `center`: `Point`
    ///   `x₀`, length `n`.
    /// - `constant`: `Point`
    ///   `c`, length `m`.
    /// - `linear`: `Matrix`
    ///   `L`, shape `n × m`. It doubles as the constant gradient.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::IncompatiblePieces`
    ///   Returned when `linear` is not `center.len() × constant.len()`.
    pub fn linear(center: Point, constant: Point, linear: Matrix) -> FunctionResult<Self> {
        let (n, m) = linear.dim();
        let evaluation = LinearEvaluation::new(center, constant, linear.clone())?;
        Self::from_parts(
            Arc::new(evaluation),
            Arc::new(ConstantGradient::new(linear)),
            Arc::new(ConstantHessian::zeros(n, m)),
        )
    }

    /// Build a function from text formulas through an expression engine.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::ExpressionParserUnavailable`
    ///   Returned when `engine` is `None`.
    /// - Anything the engine's `compile` returns.
    ///
    /// Notes
    /// -----
    /// - Derivatives the engine cannot compile fall back to finite
    ///   differences.
    pub fn from_formulas(
        engine: Option<&dyn FormulaEngine>, input_variables: &[String], formulas: &[String],
    ) -> FunctionResult<Self> {
        let engine =
            engine.ok_or_else(|| FunctionError::ExpressionParserUnavailable { formulas: formulas.to_vec() })?;
        let evaluation = engine.compile(input_variables, formulas)?;
        evaluation.set_input_description(Description::new(input_variables.to_vec()))?;
        let gradient = engine.compile_gradient(input_variables, formulas);
        let hessian = engine.compile_hessian(input_variables, formulas);
        assemble(evaluation, gradient, hessian, FunctionOptions::default(), (false, false))
    }

    // ---- Combinators ----

    /// `left ∘ right`, i.e. `x ↦ left(right(x))`.
    ///
    /// Parameters
    /// ----------
    /// - `left`: `&Function`
    ///   Outer function, `k → m`.
    /// - `right`: `&Function`
    ///   Inner function, `n → k`.
    ///
    /// Returns
    /// -------
    /// `FunctionResult<Function>`
    ///   An `n → m` function whose parameter vector is `[right, left]`.
    ///   The options of `left` are used.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::CompositionDimMismatch`
    ///   Returned when `left.input_dimension() != right.output_dimension()`.
    ///
    /// Notes
    /// -----
    /// - The gradient is the chain rule and the Hessian the second-order
    ///   chain rule, which also reads the operands' gradients. The composed
    ///   Hessian is flagged as default when either operand has a default
    ///   gradient or Hessian.
    pub fn compose(left: &Function, right: &Function) -> FunctionResult<Self> {
        let evaluation = ComposedEvaluation::new(left.evaluation.clone(), right.evaluation.clone())?
            .with_left_gradient(left.gradient.clone());
        let gradient = ComposedGradient::new(left.gradient.clone(), right.evaluation.clone(), right.gradient.clone())
            .map(|g| Arc::new(g) as GradientHandle);
        let hessian = ComposedHessian::new(
            left.gradient.clone(),
            left.hessian.clone(),
            right.evaluation.clone(),
            right.gradient.clone(),
            right.hessian.clone(),
        )
        .map(|h| Arc::new(h) as HessianHandle);
        assemble(Arc::new(evaluation), gradient, hessian, left.options, second_order_flags(&[left, right]))
    }

    /// `x ↦ left(x) · right(x)` for scalar functions.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::NotScalarOutput`
    ///   Returned when either operand has more than one output.
    /// - `FunctionError::InconsistentInputDimension`
    ///   Returned when the operands take inputs of different lengths.
    pub fn product(left: &Function, right: &Function) -> FunctionResult<Self> {
        let evaluation = ProductEvaluation::new(left.evaluation.clone(), right.evaluation.clone())?;
        let gradient = ProductGradient::new(
            left.evaluation.clone(),
            left.gradient.clone(),
            right.evaluation.clone(),
            right.gradient.clone(),
        )
        .map(|g| Arc::new(g) as GradientHandle);
        let hessian = ProductHessian::new(
            left.evaluation.clone(),
            left.gradient.clone(),
            left.hessian.clone(),
            right.evaluation.clone(),
            right.gradient.clone(),
            right.hessian.clone(),
        )
        .map(|h| Arc::new(h) as HessianHandle);
        assemble(Arc::new(evaluation), gradient, hessian, left.options, second_order_flags(&[left, right]))
    }

    /// `Σ cᵢ fᵢ`.
    ///
    /// Parameters
    /// ----------
    /// - `functions`: `&[Function]`
    ///   Terms sharing input and output dimensions. The options of the
    ///   first term are used.
    /// - `coefficients`: `&[f64]`
    ///   One weight per term.
    ///
    /// Returns
    /// -------
    /// `FunctionResult<Function>`
    ///   The combination over the kept terms; its parameter vector is the
    ///   concatenation of the kept terms' parameters.
    ///
    /// Errors
    /// ------
    /// - `EmptyCollection`, `CollectionSizeMismatch`, dimension mismatches.
    /// - `AllCoefficientsZero` when every coefficient is zero.
    ///
    /// Notes
    /// -----
    /// - Terms with `|cᵢ| <= small_coefficient · max|c|` are dropped once,
    ///   with a warning, before the three pieces are built.
    pub fn linear_combination(functions: &[Function], coefficients: &[f64]) -> FunctionResult<Self> {
        let options = check_terms("Function::linear_combination", functions, coefficients.len())?;
        let magnitudes: Vec<f64> = coefficients.iter().map(|c| c.abs()).collect();
        let kept = prune_terms(&magnitudes, options.small_coefficient, "LinearCombinationEvaluation")?;
        let functions: Vec<&Function> = kept.iter().map(|&i| &functions[i]).collect();
        let coefficients: Vec<f64> = kept.iter().map(|&i| coefficients[i]).collect();
        let evaluation = LinearCombinationEvaluation::new(
            functions.iter().map(|f| f.evaluation.clone()).collect(),
            coefficients.clone(),
            0.0,
        )?;
        let gradient = LinearCombinationGradient::new(
            functions.iter().map(|f| f.gradient.clone()).collect(),
            coefficients.clone(),
            0.0,
        )
        .map(|g| Arc::new(g) as GradientHandle);
        let hessian =
            LinearCombinationHessian::new(functions.iter().map(|f| f.hessian.clone()).collect(), coefficients, 0.0)
                .map(|h| Arc::new(h) as HessianHandle);
        assemble(Arc::new(evaluation), gradient, hessian, options, first_order_flags(&functions))
    }

    /// `Σ fᵢ vᵢ` for scalar `fᵢ` and coefficient vectors `vᵢ`.
    pub fn dual_linear_combination(functions: &[Function], coefficients: &[Point]) -> FunctionResult<Self> {
        let options = check_terms("Function::dual_linear_combination", functions, coefficients.len())?;
        let magnitudes: Vec<f64> =
            coefficients.iter().map(|v| v.iter().fold(0.0_f64, |acc, c| acc.max(c.abs()))).collect();
        let kept = prune_terms(&magnitudes, options.small_coefficient, "DualLinearCombinationEvaluation")?;
        let functions: Vec<&Function> = kept.iter().map(|&i| &functions[i]).collect();
        let coefficients: Vec<Point> = kept.iter().map(|&i| coefficients[i].clone()).collect();
        let evaluation = DualLinearCombinationEvaluation::new(
            functions.iter().map(|f| f.evaluation.clone()).collect(),
            coefficients.clone(),
            0.0,
        )?;
        let gradient = DualLinearCombinationGradient::new(
            functions.iter().map(|f| f.gradient.clone()).collect(),
            coefficients.clone(),
            0.0,
        )
        .map(|g| Arc::new(g) as GradientHandle);
        let hessian = DualLinearCombinationHessian::new(
            functions.iter().map(|f| f.hessian.clone()).collect(),
            coefficients,
            0.0,
        )
        .map(|h| Arc::new(h) as HessianHandle);
        assemble(Arc::new(evaluation), gradient, hessian, options, first_order_flags(&functions))
    }

    /// Concatenate the outputs of `functions`.
    ///
    /// Returns
    /// -------
    /// `FunctionResult<Function>`
    ///   A function with `Σ mᵢ` outputs. Gradients are stacked column-wise,
    ///   Hessian sheets in order, parameters concatenated.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::EmptyCollection`
    ///   Returned for an empty slice.
    /// - `FunctionError::InconsistentInputDimension`
    ///   Returned when the functions take inputs of different lengths.
    pub fn aggregate(functions: &[Function]) -> FunctionResult<Self> {
        let options = check_terms("Function::aggregate", functions, functions.len())?;
        let evaluation = AggregatedEvaluation::new(functions.iter().map(|f| f.evaluation.clone()).collect())?;
        let gradient = AggregatedGradient::new(functions.iter().map(|f| f.gradient.clone()).collect())
            .map(|g| Arc::new(g) as GradientHandle);
        let hessian = AggregatedHessian::new(functions.iter().map(|f| f.hessian.clone()).collect())
            .map(|h| Arc::new(h) as HessianHandle);
        let operands: Vec<&Function> = functions.iter().collect();
        assemble(Arc::new(evaluation), gradient, hessian, options, first_order_flags(&operands))
    }

    /// `x ↦ 1{f(x) op threshold}`; derivatives are finite differences.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::NotScalarOutput`
    ///   Returned when `function` has more than one output.
    ///
    /// Notes
    /// -----
    /// - Both `use_default_*` flags are set. The derivatives are zero almost
    ///   everywhere and blow up across the threshold.
    pub fn indicator(function: &Function, operator: ComparisonOperator, threshold: f64) -> FunctionResult<Self> {
        let evaluation = IndicatorEvaluation::new(function.evaluation.clone(), operator, threshold)?;
        let missing = FunctionError::NoAnalyticalDerivative { combinator: "IndicatorEvaluation" };
        assemble(Arc::new(evaluation), Err(missing.clone()), Err(missing), function.options, (true, true))
    }

    /// Freeze `parameter_positions` of `function` at `parameter_values`.
    ///
    /// Parameters
    /// ----------
    /// - `function`: `&Function`
    ///   The full function, `n → m`.
    /// - `parameter_positions`: `&[usize]`
    ///   Input positions turned into parameters.
    /// - `parameter_values`: `Point`
    ///   One value per position; becomes the new function's parameter.
    ///
    /// Returns
    /// -------
    /// `FunctionResult<Function>`
    ///   A function of the remaining `n − p` inputs, in their original
    ///   order. Default-derivative flags are inherited from `function`.
    ///
    /// Errors
    /// ------
    /// - `EmptyIndices`, `IndexOutOfRange`, `DuplicateIndex` for invalid
    ///   positions.
    /// - `ParameterDimMismatch` when the values and positions differ in
    ///   length.
    pub fn parametric(function: &Function, parameter_positions: &[usize], parameter_values: Point) -> FunctionResult<Self> {
        let evaluation = ParametricEvaluation::new(function.evaluation.clone(), parameter_positions, parameter_values)?;
        Self::from_parametric(function, evaluation)
    }

    /// Keep `input_positions` free and freeze the rest at `reference_point`.
    ///
    /// Errors
    /// ------
    /// - `EmptyIndices`, `IndexOutOfRange`, `DuplicateIndex` for invalid
    ///   positions.
    /// - `InputDimMismatch` when `reference_point` has the wrong length.
    pub fn parametric_on_inputs(
        function: &Function, input_positions: &[usize], reference_point: &Point,
    ) -> FunctionResult<Self> {
        let evaluation = ParametricEvaluation::on_inputs(function.evaluation.clone(), input_positions, reference_point)?;
        Self::from_parametric(function, evaluation)
    }

    fn from_parametric(function: &Function, evaluation: ParametricEvaluation) -> FunctionResult<Self> {
        let evaluation = Arc::new(evaluation.with_gradient(function.gradient.clone()));
        let gradient = ParametricGradient::new(evaluation.clone(), function.gradient.clone())
            .map(|g| Arc::new(g) as GradientHandle);
        let hessian = ParametricHessian::new(evaluation.clone(), function.hessian.clone())
            .map(|h| Arc::new(h) as HessianHandle);
        let flags = (function.use_default_gradient, function.use_default_hessian);
        assemble(evaluation, gradient, hessian, function.options, flags)
    }

    /// `c · self`, as a one-term linear combination.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::AllCoefficientsZero`
    ///   Returned when `coefficient == 0`.
    pub fn scaled(&self, coefficient: f64) -> FunctionResult<Self> {
        Self::linear_combination(std::slice::from_ref(self), &[coefficient])
    }

    // ---- Evaluation ----

    /// Value at `x`.
    ///
    /// Errors
    /// ------
    /// - `InputDimMismatch` for a point of the wrong length.
    /// - Anything the evaluation's `compute` returns, and
    ///   `OutputDimMismatch` when it returns the wrong number of outputs.
    ///
    /// Notes
    /// -----
    /// - Goes through the evaluation's cache and history when enabled.
    pub fn evaluate(&self, x: &Point) -> FunctionResult<Point> {
        self.evaluation.evaluate(x)
    }

    /// Row-wise evaluation of `xs`; one output row per input row.
    ///
    /// Errors
    /// ------
    /// - `SampleDimMismatch` when the sample width differs from
    ///   `input_dimension()`.
    pub fn evaluate_sample(&self, xs: &Sample) -> FunctionResult<Sample> {
        self.evaluation.evaluate_sample(xs)
    }

    /// Gradient at `x`.
    ///
    /// Parameters
    /// ----------
    /// - `x`: `&Point`
    ///   Call point of length `input_dimension()`.
    ///
    /// Returns
    /// -------
    /// `FunctionResult<Matrix>`
    ///   The `input_dimension × output_dimension` matrix; column `k` is the
    ///   gradient of output `k`.
    ///
    /// Errors
    /// ------
    /// - `InputDimMismatch` for a point of the wrong length.
    /// - `NotImplemented` from the held piece, unchanged.
    /// - `DerivativeFailure` when both the held piece and a fresh finite
    ///   difference fail.
    ///
    /// Notes
    /// -----
    /// - A warning is logged on every call while `use_default_gradient` is
    ///   set, and again when the fallback kicks in.
    /// - The fallback step is `options().gradient_epsilon`.
    pub fn gradient(&self, x: &Point) -> FunctionResult<Matrix> {
        validate_input_dim(x.len(), self.input_dimension())?;
        if self.use_default_gradient {
            log::warn!(
                "{}: you are using a default implementation for the gradient. \
                 Be careful, the gradient can be severely wrong.",
                self.evaluation.name()
            );
        }
        match self.gradient.gradient(x) {
            Ok(gradient) => Ok(gradient),
            Err(err) if err.kind() == ErrorKind::NotImplemented => Err(err),
            Err(err) => {
                log::warn!(
                    "{}: switching to finite difference after analytical gradient failure: {err}",
                    self.evaluation.name()
                );
                CenteredFiniteDifferenceGradient::with_step(self.evaluation.clone(), self.options.gradient_epsilon)
                    .and_then(|fd| fd.gradient(x))
                    .map_err(|fallback| FunctionError::DerivativeFailure {
                        derivative: "gradient",
                        point: x.to_vec(),
                        analytical: err.to_string(),
                        fallback: fallback.to_string(),
                    })
            }
        }
    }

    /// Hessian at `x`; same warning and fallback policy as
    /// [`Function::gradient`].
    ///
    /// Returns
    /// -------
    /// `FunctionResult<SymmetricTensor>`
    ///   `input_dimension × input_dimension × output_dimension`, one
    ///   symmetric sheet per output.
    ///
    /// Errors
    /// ------
    /// - `InputDimMismatch` for a point of the wrong length.
    /// - `NotImplemented` from the held piece, unchanged.
    /// - `DerivativeFailure` with `derivative == "Hessian"` when both the
    ///   held piece and a finite difference with `options().hessian_epsilon`
    ///   fail.
    pub fn hessian(&self, x: &Point) -> FunctionResult<SymmetricTensor> {
        validate_input_dim(x.len(), self.input_dimension())?;
        if self.use_default_hessian {
            log::warn!(
                "{}: you are using a default implementation for the Hessian. \
                 Be careful, the Hessian can be severely wrong.",
                self.evaluation.name()
            );
        }
        match self.hessian.hessian(x) {
            Ok(hessian) => Ok(hessian),
            Err(err) if err.kind() == ErrorKind::NotImplemented => Err(err),
            Err(err) => {
                log::warn!(
                    "{}: switching to finite difference after analytical Hessian failure: {err}",
                    self.evaluation.name()
                );
                CenteredFiniteDifferenceHessian::with_step(self.evaluation.clone(), self.options.hessian_epsilon)
                    .and_then(|fd| fd.hessian(x))
                    .map_err(|fallback| FunctionError::DerivativeFailure {
                        derivative: "Hessian",
                        point: x.to_vec(),
                        analytical: err.to_string(),
                        fallback: fallback.to_string(),
                    })
            }
        }
    }

    /// Derivative of the output with respect to the parameter at `x`,
    /// `parameter_dimension × output_dimension`.
    ///
    /// Evaluations without an analytical override use a forward difference
    /// with the evaluation's parameter step.
    pub fn parameter_gradient(&self, x: &Point) -> FunctionResult<Matrix> {
        self.evaluation.parameter_gradient(x)
    }

    // ---- Marginals ----

    /// Restrict every piece to the outputs `indices`, in that order.
    ///
    /// Parameters
    /// ----------
    /// - `indices`: `&[usize]`
    ///   Non-empty, duplicate-free output positions below
    ///   `output_dimension()`.
    ///
    /// Returns
    /// -------
    /// `FunctionResult<Function>`
    ///   A function with `indices.len()` outputs and the same input and
    ///   parameter dimensions as `self`. Default-derivative flags are
    ///   inherited.
    ///
    /// Errors
    /// ------
    /// - `EmptyIndices`, `IndexOutOfRange`, `DuplicateIndex` for invalid
    ///   `indices`.
    ///
    /// Notes
    /// -----
    /// - A specialised evaluation marginal is kept only when it carries the
    ///   full parameter vector. Otherwise (e.g. an aggregation whose
    ///   unselected blocks hold parameters) the evaluation goes through the
    ///   projection composition, so `set_parameter` keeps reaching the
    ///   gradient and Hessian.
    pub fn marginal(&self, indices: &[usize]) -> FunctionResult<Self> {
        let mut evaluation = evaluation_marginal(&self.evaluation, indices)?;
        if evaluation.parameter_dimension() != self.parameter_dimension() {
            log::debug!(
                "{}: specialised marginal has {} parameters instead of {}, using projection",
                self.evaluation.name(),
                evaluation.parameter_dimension(),
                self.parameter_dimension()
            );
            evaluation = projected_evaluation(&self.evaluation, indices)?;
        }
        Ok(Function {
            evaluation,
            gradient: gradient_marginal(&self.gradient, indices)?,
            hessian: hessian_marginal(&self.hessian, indices)?,
            use_default_gradient: self.use_default_gradient,
            use_default_hessian: self.use_default_hessian,
            options: self.options,
        })
    }

    pub fn marginal_component(&self, index: usize) -> FunctionResult<Self> {
        self.marginal(&[index])
    }

    // ---- Dimensions and descriptions ----

    pub fn input_dimension(&self) -> usize {
        self.evaluation.input_dimension()
    }

    pub fn output_dimension(&self) -> usize {
        self.evaluation.output_dimension()
    }

    pub fn input_description(&self) -> Description {
        self.evaluation.input_description()
    }

    pub fn output_description(&self) -> Description {
        self.evaluation.output_description()
    }

    pub fn description(&self) -> Description {
        self.evaluation.description()
    }

    pub fn set_input_description(&self, description: Description) -> FunctionResult<()> {
        self.evaluation.set_input_description(description)
    }

    pub fn set_output_description(&self, description: Description) -> FunctionResult<()> {
        self.evaluation.set_output_description(description)
    }

    pub fn set_description(&self, description: Description) -> FunctionResult<()> {
        self.evaluation.set_description(description)
    }

    // ---- Parameters ----

    pub fn parameter(&self) -> Point {
        self.evaluation.parameter()
    }

    pub fn parameter_dimension(&self) -> usize {
        self.evaluation.parameter_dimension()
    }

    pub fn parameter_description(&self) -> Description {
        self.evaluation.parameter_description()
    }

    /// Set the parameter on the evaluation, then on each derivative piece
    /// whose parameter dimension matches.
    ///
    /// Errors
    /// ------
    /// - `FunctionError::ParameterDimMismatch`
    ///   Returned when `parameter.len() != parameter_dimension()`; nothing
    ///   is changed in that case.
    ///
    /// Notes
    /// -----
    /// - Pieces are shared, so every `Function` holding the same handles
    ///   sees the new parameter.
    pub fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        self.evaluation.set_parameter(parameter)?;
        if self.gradient.parameter_dimension() == parameter.len() {
            self.gradient.set_parameter(parameter)?;
        }
        if self.hessian.parameter_dimension() == parameter.len() {
            self.hessian.set_parameter(parameter)?;
        }
        Ok(())
    }

    // ---- Bookkeeping ----

    pub fn evaluation_calls(&self) -> usize {
        self.evaluation.calls()
    }

    pub fn gradient_calls(&self) -> usize {
        self.gradient.calls()
    }

    pub fn hessian_calls(&self) -> usize {
        self.hessian.calls()
    }

    pub fn enable_cache(&self) {
        self.evaluation.enable_cache()
    }

    pub fn disable_cache(&self) {
        self.evaluation.disable_cache()
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.evaluation.is_cache_enabled()
    }

    pub fn cache_hits(&self) -> usize {
        self.evaluation.cache_hits()
    }

    pub fn cache_size(&self) -> usize {
        self.evaluation.cache_size()
    }

    pub fn clear_cache(&self) {
        self.evaluation.clear_cache()
    }

    pub fn enable_history(&self) {
        self.evaluation.enable_history()
    }

    pub fn disable_history(&self) {
        self.evaluation.disable_history()
    }

    pub fn is_history_enabled(&self) -> bool {
        self.evaluation.is_history_enabled()
    }

    pub fn clear_history(&self) {
        self.evaluation.clear_history()
    }

    pub fn history_input(&self) -> FunctionResult<Sample> {
        self.evaluation.history_input()
    }

    pub fn history_output(&self) -> FunctionResult<Sample> {
        self.evaluation.history_output()
    }

    // ---- Pieces ----

    pub fn use_default_gradient_implementation(&self) -> bool {
        self.use_default_gradient
    }

    pub fn use_default_hessian_implementation(&self) -> bool {
        self.use_default_hessian
    }

    /// Replace the gradient with an explicit one; clears the default flag.
    pub fn set_gradient(&mut self, gradient: GradientHandle) -> FunctionResult<()> {
        check_piece(
            "gradient",
            (self.input_dimension(), self.output_dimension()),
            (gradient.input_dimension(), gradient.output_dimension()),
        )?;
        self.gradient = gradient;
        self.use_default_gradient = false;
        Ok(())
    }

    /// Replace the Hessian with an explicit one; clears the default flag.
    pub fn set_hessian(&mut self, hessian: HessianHandle) -> FunctionResult<()> {
        check_piece(
            "Hessian",
            (self.input_dimension(), self.output_dimension()),
            (hessian.input_dimension(), hessian.output_dimension()),
        )?;
        self.hessian = hessian;
        self.use_default_hessian = false;
        Ok(())
    }

    pub fn evaluation(&self) -> &EvaluationHandle {
        &self.evaluation
    }

    pub fn gradient_handle(&self) -> &GradientHandle {
        &self.gradient
    }

    pub fn hessian_handle(&self) -> &HessianHandle {
        &self.hessian
    }

    pub fn options(&self) -> &FunctionOptions {
        &self.options
    }
}

// ---- Helper methods ----

/// Bundle a combined evaluation with derivative construction results,
/// substituting finite differences for pieces that reported an
/// invalid-argument error.
fn assemble(
    evaluation: EvaluationHandle, gradient: FunctionResult<GradientHandle>, hessian: FunctionResult<HessianHandle>,
    options: FunctionOptions, (default_gradient, default_hessian): (bool, bool),
) -> FunctionResult<Function> {
    evaluation.state().apply_options(&options);
    let (gradient, use_default_gradient) = match gradient {
        Ok(gradient) => (gradient, default_gradient),
        Err(err) if err.is_invalid_argument() => {
            log::warn!(
                "{}: no analytical gradient ({err}), using finite differences",
                evaluation.name()
            );
            let fd = CenteredFiniteDifferenceGradient::with_step(evaluation.clone(), options.gradient_epsilon)?;
            (Arc::new(fd) as GradientHandle, true)
        }
        Err(err) => return Err(err),
    };
    let (hessian, use_default_hessian) = match hessian {
        Ok(hessian) => (hessian, default_hessian),
        Err(err) if err.is_invalid_argument() => {
            log::warn!(
                "{}: no analytical Hessian ({err}), using finite differences",
                evaluation.name()
            );
            let fd = CenteredFiniteDifferenceHessian::with_step(evaluation.clone(), options.hessian_epsilon)?;
            (Arc::new(fd) as HessianHandle, true)
        }
        Err(err) => return Err(err),
    };
    Ok(Function { evaluation, gradient, hessian, use_default_gradient, use_default_hessian, options })
}

/// Flags for combinators whose Hessian only uses the operands' Hessians.
fn first_order_flags(operands: &[&Function]) -> (bool, bool) {
    (
        operands.iter().any(|f| f.use_default_gradient),
        operands.iter().any(|f| f.use_default_hessian),
    )
}

/// Flags for combinators whose Hessian also uses the operands' gradients.
fn second_order_flags(operands: &[&Function]) -> (bool, bool) {
    let (gradient, hessian) = first_order_flags(operands);
    (gradient, gradient || hessian)
}

/// Non-empty and sized like the coefficients; returns the first operand's
/// options.
fn check_terms(what: &'static str, functions: &[Function], coefficients: usize) -> FunctionResult<FunctionOptions> {
    let first = functions.first().ok_or(FunctionError::EmptyCollection { what })?;
    if functions.len() != coefficients {
        return Err(FunctionError::CollectionSizeMismatch { functions: functions.len(), coefficients });
    }
    Ok(first.options)
}

fn check_piece(piece: &str, expected: (usize, usize), found: (usize, usize)) -> FunctionResult<()> {
    if expected != found {
        return Err(FunctionError::IncompatiblePieces {
            combinator: "Function",
            reason: format!(
                "{piece} is {}→{}, evaluation is {}→{}",
                found.0, found.1, expected.0, expected.1
            ),
        });
    }
    Ok(())
}
