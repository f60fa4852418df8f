//! Combinators building new evaluations (and their derivatives) from
//! existing handles.
//!
//! Every combinator comes as an evaluation / gradient / Hessian trio so a
//! [`Function`](crate::function::Function) can assemble all three levels
//! from the pieces of its operands. Parameters of a combinator are the
//! concatenation of its operands' parameters in operand order (inner first
//! for compositions).
pub mod aggregated;
pub mod composition;
pub mod dual_linear_combination;
pub mod indicator;
pub mod linear_combination;
pub mod parametric;
pub mod product;

pub use self::aggregated::{AggregatedEvaluation, AggregatedGradient, AggregatedHessian};
pub use self::composition::{ComposedEvaluation, ComposedGradient, ComposedHessian};
pub use self::dual_linear_combination::{
    DualLinearCombinationEvaluation, DualLinearCombinationGradient, DualLinearCombinationHessian,
};
pub use self::indicator::{ComparisonOperator, IndicatorEvaluation};
pub use self::linear_combination::{
    LinearCombinationEvaluation, LinearCombinationGradient, LinearCombinationHessian,
};
pub use self::parametric::{ParametricEvaluation, ParametricGradient, ParametricHessian};
pub use self::product::{ProductEvaluation, ProductGradient, ProductHessian};
