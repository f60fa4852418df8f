//! function::errors — unified error surface for the numerical-function core.
//!
//! Purpose
//! -------
//! Define [`FunctionError`], the single error type returned by evaluations,
//! gradients, Hessians, combinators, and the [`Function`](crate::function::Function)
//! triad, together with the result alias [`FunctionResult`]. Every variant is
//! classified into one of four [`ErrorKind`]s so callers (and the triad's own
//! fallback logic) can decide how to react without string matching.
//!
//! Key behaviors
//! -------------
//! - Enumerate dimension, collection, index, option, and derivative failures
//!   as structured variants carrying the offending values.
//! - Classify variants via [`FunctionError::kind`]:
//!   - `NotImplemented`: a required override is missing; always fatal.
//!   - `InvalidArgument`: caller-side mistakes; propagated, never retried,
//!     except when a combinator cannot build an analytical derivative, in
//!     which case the triad constructor switches to finite differences.
//!   - `Internal`: contract violations and exhausted fallbacks.
//!   - `NotYetImplemented`: features that need an absent collaborator.
//! - Map `argmin` backend errors into `FunctionError` so optimizer runs
//!   report through the same surface.
//!
//! Conventions
//! -----------
//! - Variants are grouped by concern with `// ---- Section ----` markers and
//!   mirrored one-to-one in the `Display` implementation.
//! - Points carried inside errors are stored as `Vec<f64>` so the enum stays
//!   `Clone + PartialEq` and independent of `ndarray`.
use argmin::core::{ArgminError, Error};

/// Crate-wide result alias for function operations.
pub type FunctionResult<T> = Result<T, FunctionError>;

/// Coarse classification of [`FunctionError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required override is missing.
    NotImplemented,
    /// Caller supplied inconsistent dimensions, indices, or collections.
    InvalidArgument,
    /// Contract violation or exhausted fallback chain.
    Internal,
    /// Feature requires an optional collaborator that is not available.
    NotYetImplemented,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionError {
    // ---- Not implemented ----
    /// A base method was called on an implementor that does not override it.
    NotImplemented {
        method: &'static str,
        implementor: &'static str,
    },

    // ---- Dimensions ----
    /// Input point length differs from the declared input dimension.
    InputDimMismatch {
        expected: usize,
        found: usize,
    },
    /// Sample column count differs from the declared input dimension.
    SampleDimMismatch {
        expected: usize,
        found: usize,
    },
    /// A row supplied to a sample constructor has the wrong length.
    RaggedSample {
        row: usize,
        expected: usize,
        found: usize,
    },
    /// Parameter vector length differs from the current parameter dimension.
    ParameterDimMismatch {
        expected: usize,
        found: usize,
    },
    /// Description length does not match the number of variables it names.
    DescriptionSizeMismatch {
        expected: usize,
        found: usize,
    },
    /// Per-dimension finite-difference steps do not match the input dimension.
    EpsilonDimMismatch {
        expected: usize,
        found: usize,
    },
    /// Vector coefficient of a dual linear combination has the wrong length.
    CoefficientDimMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },
    /// Inner output dimension differs from outer input dimension.
    CompositionDimMismatch {
        inner_output: usize,
        outer_input: usize,
    },
    /// A combinator requiring scalar outputs received a vector-valued one.
    NotScalarOutput {
        combinator: &'static str,
        found: usize,
    },
    /// Functions of a collection do not share the same input dimension.
    InconsistentInputDimension {
        index: usize,
        expected: usize,
        found: usize,
    },
    /// Functions of a collection do not share the same output dimension.
    InconsistentOutputDimension {
        index: usize,
        expected: usize,
        found: usize,
    },
    /// Sub-pieces handed to a combinator do not fit together.
    IncompatiblePieces {
        combinator: &'static str,
        reason: String,
    },
    /// Tensor storage is not `(n, n, m)`.
    TensorShapeMismatch {
        shape: Vec<usize>,
    },

    // ---- Collections ----
    /// A combinator received no functions.
    EmptyCollection {
        what: &'static str,
    },
    /// Number of functions and number of coefficients differ.
    CollectionSizeMismatch {
        functions: usize,
        coefficients: usize,
    },
    /// Every coefficient of a combination is (numerically) zero.
    AllCoefficientsZero,

    // ---- Indices ----
    /// Index does not address an existing component.
    IndexOutOfRange {
        index: usize,
        bound: usize,
    },
    /// Index appears more than once where uniqueness is required.
    DuplicateIndex {
        index: usize,
    },
    /// An empty index set was supplied where at least one index is needed.
    EmptyIndices,

    // ---- Options ----
    /// Option value is outside its admissible range.
    InvalidOption {
        key: String,
        value: f64,
        reason: &'static str,
    },
    /// Option key is not recognized.
    UnknownOption {
        key: String,
    },
    /// Finite-difference step must be finite and strictly positive.
    InvalidEpsilon {
        index: usize,
        value: f64,
    },

    // ---- Values ----
    /// A scalar objective evaluated to NaN or infinity.
    NonFiniteValue {
        value: f64,
    },

    // ---- Derivatives ----
    /// A combinator has no analytical derivative for its inputs.
    NoAnalyticalDerivative {
        combinator: &'static str,
    },
    /// Implementor returned an output point of the wrong length.
    OutputDimMismatch {
        implementor: &'static str,
        expected: usize,
        found: usize,
    },
    /// Implementor returned a gradient of the wrong shape.
    GradientShapeMismatch {
        implementor: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
    /// Implementor returned a Hessian of the wrong shape.
    HessianShapeMismatch {
        implementor: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
    /// Analytical derivative and its finite-difference fallback both failed.
    DerivativeFailure {
        derivative: &'static str,
        point: Vec<f64>,
        analytical: String,
        fallback: String,
    },

    // ---- Expression parser ----
    /// Formula-based construction requested without an expression engine.
    ExpressionParserUnavailable {
        formulas: Vec<String>,
    },

    // ---- Solver backend ----
    /// Wrapper for argmin::InvalidParameter
    InvalidSolverParameter {
        text: String,
    },
    /// Wrapper for argmin::ConditionViolated
    SolverConditionViolated {
        text: String,
    },
    /// Wrapper for other argmin::Error types
    BackendError {
        text: String,
    },

    // ---- Fallback ----
    UnknownError,
}

impl FunctionError {
    /// Classify this error into the four-way taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FunctionError::NotImplemented { .. } => ErrorKind::NotImplemented,
            FunctionError::ExpressionParserUnavailable { .. } => ErrorKind::NotYetImplemented,
            FunctionError::OutputDimMismatch { .. }
            | FunctionError::GradientShapeMismatch { .. }
            | FunctionError::HessianShapeMismatch { .. }
            | FunctionError::DerivativeFailure { .. }
            | FunctionError::NonFiniteValue { .. }
            | FunctionError::SolverConditionViolated { .. }
            | FunctionError::BackendError { .. }
            | FunctionError::UnknownError => ErrorKind::Internal,
            _ => ErrorKind::InvalidArgument,
        }
    }

    /// `true` when the error belongs to [`ErrorKind::InvalidArgument`].
    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }
}

impl std::error::Error for FunctionError {}

impl std::fmt::Display for FunctionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Not implemented ----
            FunctionError::NotImplemented { method, implementor } => {
                write!(f, "{method} is not implemented for {implementor}")
            }

            // ---- Dimensions ----
            FunctionError::InputDimMismatch { expected, found } => {
                write!(f, "Input dimension mismatch: expected {expected}, found {found}")
            }
            FunctionError::SampleDimMismatch { expected, found } => {
                write!(f, "Sample dimension mismatch: expected {expected} columns, found {found}")
            }
            FunctionError::RaggedSample { row, expected, found } => {
                write!(f, "Sample row {row} has length {found}, expected {expected}")
            }
            FunctionError::ParameterDimMismatch { expected, found } => {
                write!(f, "Parameter dimension mismatch: expected {expected}, found {found}")
            }
            FunctionError::DescriptionSizeMismatch { expected, found } => {
                write!(f, "Description size mismatch: expected {expected} names, found {found}")
            }
            FunctionError::EpsilonDimMismatch { expected, found } => {
                write!(f, "Finite-difference step dimension mismatch: expected {expected}, found {found}")
            }
            FunctionError::CoefficientDimMismatch { index, expected, found } => {
                write!(
                    f,
                    "Coefficient {index} has dimension {found}, expected {expected} like the first coefficient"
                )
            }
            FunctionError::CompositionDimMismatch { inner_output, outer_input } => {
                write!(
                    f,
                    "Cannot compose: inner output dimension {inner_output} differs from outer input dimension {outer_input}"
                )
            }
            FunctionError::NotScalarOutput { combinator, found } => {
                write!(f, "{combinator} requires scalar outputs, found output dimension {found}")
            }
            FunctionError::InconsistentInputDimension { index, expected, found } => {
                write!(f, "Function {index} has input dimension {found}, expected {expected}")
            }
            FunctionError::InconsistentOutputDimension { index, expected, found } => {
                write!(f, "Function {index} has output dimension {found}, expected {expected}")
            }
            FunctionError::IncompatiblePieces { combinator, reason } => {
                write!(f, "Incompatible pieces for {combinator}: {reason}")
            }
            FunctionError::TensorShapeMismatch { shape } => {
                write!(f, "Symmetric tensor storage must have shape (n, n, m), found {shape:?}")
            }

            // ---- Collections ----
            FunctionError::EmptyCollection { what } => {
                write!(f, "Cannot build {what} from an empty collection")
            }
            FunctionError::CollectionSizeMismatch { functions, coefficients } => {
                write!(f, "Got {functions} functions but {coefficients} coefficients")
            }
            FunctionError::AllCoefficientsZero => {
                write!(f, "All coefficients are zero")
            }

            // ---- Indices ----
            FunctionError::IndexOutOfRange { index, bound } => {
                write!(f, "Index {index} out of range, must be < {bound}")
            }
            FunctionError::DuplicateIndex { index } => {
                write!(f, "Index {index} appears more than once")
            }
            FunctionError::EmptyIndices => {
                write!(f, "Index set must not be empty")
            }

            // ---- Options ----
            FunctionError::InvalidOption { key, value, reason } => {
                write!(f, "Invalid value {value} for option '{key}': {reason}")
            }
            FunctionError::UnknownOption { key } => {
                write!(f, "Unknown option '{key}'")
            }
            FunctionError::InvalidEpsilon { index, value } => {
                write!(
                    f,
                    "Invalid finite-difference step at index {index}: {value}, must be finite and > 0"
                )
            }

            // ---- Values ----
            FunctionError::NonFiniteValue { value } => {
                write!(f, "Non-finite function value: {value}")
            }

            // ---- Derivatives ----
            FunctionError::NoAnalyticalDerivative { combinator } => {
                write!(f, "No analytical derivative available for {combinator}")
            }
            FunctionError::OutputDimMismatch { implementor, expected, found } => {
                write!(f, "{implementor} returned {found} outputs, expected {expected}")
            }
            FunctionError::GradientShapeMismatch { implementor, expected, found } => {
                write!(f, "{implementor} returned a gradient of shape {found:?}, expected {expected:?}")
            }
            FunctionError::HessianShapeMismatch { implementor, expected, found } => {
                write!(
                    f,
                    "{implementor} returned a Hessian of shape {found:?} (n, m), expected {expected:?}"
                )
            }
            FunctionError::DerivativeFailure { derivative, point, analytical, fallback } => {
                write!(
                    f,
                    "Cannot compute {derivative} at {point:?}: analytical failure ({analytical}), finite-difference failure ({fallback})"
                )
            }

            // ---- Expression parser ----
            FunctionError::ExpressionParserUnavailable { formulas } => {
                write!(f, "Building a function from formulas {formulas:?} requires expression-parser support")
            }

            // ---- Solver backend ----
            FunctionError::InvalidSolverParameter { text } => {
                write!(f, "Invalid solver parameter: {text}")
            }
            FunctionError::SolverConditionViolated { text } => {
                write!(f, "Solver condition violated: {text}")
            }
            FunctionError::BackendError { text } => {
                write!(f, "Backend error: {text}")
            }

            // ---- Fallback ----
            FunctionError::UnknownError => {
                write!(f, "Unknown error")
            }
        }
    }
}

impl From<Error> for FunctionError {
    fn from(original_err: Error) -> Self {
        let original_err = match original_err.downcast::<FunctionError>() {
            Ok(function_err) => return function_err,
            Err(err) => err,
        };
        match original_err.downcast::<ArgminError>() {
            Ok(argmin_err) => match argmin_err {
                ArgminError::InvalidParameter { text } => {
                    FunctionError::InvalidSolverParameter { text }
                }
                ArgminError::ConditionViolated { text } => {
                    FunctionError::SolverConditionViolated { text }
                }
                other => FunctionError::BackendError { text: other.to_string() },
            },
            Err(err) => FunctionError::BackendError { text: err.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Classification of representative variants into `ErrorKind`.
    // - Round-tripping a `FunctionError` through `argmin::core::Error`.
    // - Mapping of native argmin errors.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify that the taxonomy puts each family of variants in the right kind.
    //
    // Given
    // -----
    // - One variant per taxonomy branch.
    //
    // Expect
    // ------
    // - `kind()` returns the documented `ErrorKind`, and only the
    //   InvalidArgument variant reports `is_invalid_argument()`.
    fn kind_classifies_variants_by_taxonomy() {
        // Arrange
        let not_impl = FunctionError::NotImplemented { method: "compute", implementor: "Stub" };
        let invalid = FunctionError::InputDimMismatch { expected: 2, found: 3 };
        let internal = FunctionError::DerivativeFailure {
            derivative: "gradient",
            point: vec![1.0],
            analytical: "a".to_string(),
            fallback: "b".to_string(),
        };
        let nyi = FunctionError::ExpressionParserUnavailable { formulas: vec!["x".to_string()] };

        // Act / Assert
        assert_eq!(not_impl.kind(), ErrorKind::NotImplemented);
        assert_eq!(invalid.kind(), ErrorKind::InvalidArgument);
        assert_eq!(internal.kind(), ErrorKind::Internal);
        assert_eq!(nyi.kind(), ErrorKind::NotYetImplemented);
        assert!(invalid.is_invalid_argument());
        assert!(!internal.is_invalid_argument());
        assert!(FunctionError::NoAnalyticalDerivative { combinator: "X" }.is_invalid_argument());
    }

    #[test]
    // Purpose
    // -------
    // Ensure a `FunctionError` that travelled through argmin comes back intact.
    //
    // Given
    // -----
    // - A `FunctionError` converted into `argmin::core::Error`.
    //
    // Expect
    // ------
    // - Converting back yields the identical variant.
    fn from_argmin_error_recovers_function_error() {
        // Arrange
        let original = FunctionError::NonFiniteValue { value: f64::INFINITY };
        let wrapped: Error = original.clone().into();

        // Act
        let recovered = FunctionError::from(wrapped);

        // Assert
        assert_eq!(recovered, original);
    }

    #[test]
    // Purpose
    // -------
    // Check the mapping of native argmin errors.
    //
    // Given
    // -----
    // - An `ArgminError::InvalidParameter` wrapped in `argmin::core::Error`.
    //
    // Expect
    // ------
    // - The result is `FunctionError::InvalidSolverParameter` with the same text.
    fn from_argmin_error_maps_invalid_parameter() {
        // Arrange
        let wrapped: Error = ArgminError::InvalidParameter { text: "tol".to_string() }.into();

        // Act
        let mapped = FunctionError::from(wrapped);

        // Assert
        assert_eq!(mapped, FunctionError::InvalidSolverParameter { text: "tol".to_string() });
    }
}
