//! combinators::indicator — `1{f(x) op t}` for a scalar `f`.
//!
//! The indicator is piecewise constant, so there is no analytical gradient
//! or Hessian to offer; a triad built on it falls back to finite
//! differences. Parameters are those of `f`.
use crate::function::{
    core::{description::Description, sample::Sample, state::EvaluationState, types::Point},
    errors::{FunctionError, FunctionResult},
    evaluation::{Evaluation, EvaluationHandle},
};
use std::str::FromStr;

/// Comparison used by [`IndicatorEvaluation`].
///
/// Parsing:
/// This enum implements `FromStr` and accepts `"<"`, `"<="`, `">"`, `">="`
/// and `"=="`. Any other string returns `FunctionError::UnknownOption`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
}

impl ComparisonOperator {
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::Less => value < threshold,
            ComparisonOperator::LessOrEqual => value <= threshold,
            ComparisonOperator::Greater => value > threshold,
            ComparisonOperator::GreaterOrEqual => value >= threshold,
            ComparisonOperator::Equal => value == threshold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::Less => "<",
            ComparisonOperator::LessOrEqual => "<=",
            ComparisonOperator::Greater => ">",
            ComparisonOperator::GreaterOrEqual => ">=",
            ComparisonOperator::Equal => "==",
        }
    }
}

impl FromStr for ComparisonOperator {
    type Err = FunctionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "<" => Ok(ComparisonOperator::Less),
            "<=" => Ok(ComparisonOperator::LessOrEqual),
            ">" => Ok(ComparisonOperator::Greater),
            ">=" => Ok(ComparisonOperator::GreaterOrEqual),
            "==" => Ok(ComparisonOperator::Equal),
            other => Err(FunctionError::UnknownOption { key: other.to_string() }),
        }
    }
}

/// IndicatorEvaluation — `1.0` when `f(x) op threshold` holds, else `0.0`.
#[derive(Debug)]
pub struct IndicatorEvaluation {
    function: EvaluationHandle,
    operator: ComparisonOperator,
    threshold: f64,
    state: EvaluationState,
}

impl IndicatorEvaluation {
    /// Errors
    /// ------
    /// - `FunctionError::NotScalarOutput`
    ///   Returned when `function` has more than one output.
    pub fn new(function: EvaluationHandle, operator: ComparisonOperator, threshold: f64) -> FunctionResult<Self> {
        if function.output_dimension() != 1 {
            return Err(FunctionError::NotScalarOutput {
                combinator: "IndicatorEvaluation",
                found: function.output_dimension(),
            });
        }
        Ok(IndicatorEvaluation { function, operator, threshold, state: EvaluationState::default() })
    }

    pub fn operator(&self) -> ComparisonOperator {
        self.operator
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn indicator(&self, value: f64) -> f64 {
        if self.operator.compare(value, self.threshold) {
            1.0
        } else {
            0.0
        }
    }
}

impl Evaluation for IndicatorEvaluation {
    fn name(&self) -> &'static str {
        "IndicatorEvaluation"
    }

    fn input_dimension(&self) -> usize {
        self.function.input_dimension()
    }

    fn output_dimension(&self) -> usize {
        1
    }

    fn state(&self) -> &EvaluationState {
        &self.state
    }

    fn compute(&self, x: &Point) -> FunctionResult<Point> {
        let y = self.function.evaluate(x)?;
        Ok(Point::from_elem(1, self.indicator(y[0])))
    }

    fn compute_sample(&self, xs: &Sample) -> FunctionResult<Sample> {
        let ys = self.function.evaluate_sample(xs)?;
        Ok(Sample::new(ys.data().mapv(|v| self.indicator(v))))
    }

    fn parameter(&self) -> Point {
        self.function.parameter()
    }

    fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        self.function.set_parameter(parameter)?;
        self.state.clear_cache();
        Ok(())
    }

    fn parameter_description(&self) -> Description {
        self.function.parameter_description()
    }

    fn default_input_description(&self) -> Description {
        self.function.input_description()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::analytic::ClosureEvaluation;
    use ndarray::array;
    use std::sync::Arc;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Operator parsing and comparison at the threshold.
    // - Point and sample evaluation.
    // - Rejection of vector-valued functions.
    // -------------------------------------------------------------------------

    fn sum() -> EvaluationHandle {
        Arc::new(ClosureEvaluation::new(2, 1, |x| Ok(array![x[0] + x[1]])))
    }

    #[test]
    // Purpose
    // -------
    // Verify parsing and behaviour at the threshold itself.
    //
    // Given
    // -----
    // - Each operator compared with value == threshold == 1.
    //
    // Expect
    // ------
    // - Strict operators fail, the others hold; unknown text is rejected.
    fn operators_parse_and_compare() {
        // Act
        let ops: Vec<ComparisonOperator> =
            ["<", "<=", ">", ">=", "=="].iter().map(|s| s.parse().unwrap()).collect();
        let err = "!=".parse::<ComparisonOperator>().expect_err("unsupported");

        // Assert
        let held: Vec<bool> = ops.iter().map(|op| op.compare(1.0, 1.0)).collect();
        assert_eq!(held, vec![false, true, false, true, true]);
        assert_eq!(err, FunctionError::UnknownOption { key: "!=".to_string() });
    }

    #[test]
    // Purpose
    // -------
    // Check point and sample evaluation agree.
    //
    // Given
    // -----
    // - 1{x0 + x1 > 1} on [1, 1], [0, 0.5], [0.5, 0.5].
    //
    // Expect
    // ------
    // - [1, 0, 0].
    fn evaluates_points_and_samples() {
        // Arrange
        let ind = IndicatorEvaluation::new(sum(), ComparisonOperator::Greater, 1.0).unwrap();
        let xs = Sample::new(array![[1.0, 1.0], [0.0, 0.5], [0.5, 0.5]]);

        // Act
        let y = ind.evaluate(&array![1.0, 1.0]).unwrap();
        let ys = ind.evaluate_sample(&xs).unwrap();

        // Assert
        assert_eq!(y, array![1.0]);
        assert_eq!(ys.data(), array![[1.0], [0.0], [0.0]]);
    }

    #[test]
    // Purpose
    // -------
    // Ensure vector-valued functions are rejected.
    //
    // Given
    // -----
    // - A 2-output function.
    //
    // Expect
    // ------
    // - `NotScalarOutput { found: 2, .. }`.
    fn rejects_vector_output() {
        // Arrange
        let f: EvaluationHandle = Arc::new(ClosureEvaluation::new(1, 2, |x| Ok(array![x[0], x[0]])));

        // Act
        let err = IndicatorEvaluation::new(f, ComparisonOperator::Less, 0.0).expect_err("vector output");

        // Assert
        assert_eq!(err, FunctionError::NotScalarOutput { combinator: "IndicatorEvaluation", found: 2 });
    }
}
