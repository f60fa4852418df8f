//! function — evaluation / gradient / Hessian triad, combinators, and
//! finite-difference fallbacks.
//!
//! Purpose
//! -------
//! Let callers build, combine, and differentiate vector functions
//! `f : ℝⁿ → ℝᵐ` while every piece keeps its own call counter, optional
//! cache, optional history, and parameter vector.
//!
//! Key behaviors
//! -------------
//! - [`evaluation`], [`gradient`], [`hessian`]: object-safe traits with
//!   required raw computations and provided public calls that check
//!   dimensions and keep the bookkeeping.
//! - [`analytic`]: closure-backed pieces and exact affine / constant pieces.
//! - [`combinators`]: composition, product, linear and dual linear
//!   combinations, aggregation, indicator, and parametric specialisation,
//!   each propagating first and second derivatives.
//! - [`finite_diff`]: centered finite-difference stand-ins.
//! - [`marginal`]: output selection for every piece.
//! - [`triad`]: [`Function`], which bundles the three pieces and owns the
//!   fallback policy; [`ops`] adds `+`, `-`, `*` on `&Function`.
//! - [`formula`]: the seam for an external expression engine.
//!
//! Invariants & assumptions
//! ------------------------
//! - Points passed to any piece have the piece's input dimension; anything
//!   else is an `InvalidArgument` error, never a panic.
//! - Gradients use the Jacobian-transposed layout (`input × output`);
//!   Hessians are `input × input × output`, symmetric in the first two axes.
//! - Handles are `Arc`s. Combinators only reference existing handles, so
//!   the resulting graph is acyclic. Parameters, caches, and histories are
//!   shared by every holder of a handle.
//!
//! Conventions
//! -----------
//! - All fallible operations return [`FunctionResult`].
//! - Warnings about default derivatives, fallbacks, and pruned terms go
//!   through the `log` facade; the crate never installs a logger.
//!
//! Downstream usage
//! ----------------
//! - Most callers import `function::prelude::*`, build pieces from closures,
//!   and work with [`Function`] values.
//!
//! Testing notes
//! -------------
//! - Every submodule carries unit tests against closed forms; the
//!   integration test in `tests/` runs end-to-end scenarios including an
//!   argmin minimisation.
pub mod analytic;
pub mod combinators;
pub mod core;
pub mod errors;
pub mod evaluation;
pub mod finite_diff;
pub mod formula;
pub mod gradient;
pub mod hessian;
pub mod marginal;
pub mod ops;
pub mod triad;

pub use self::core::description::Description;
pub use self::core::options::{FunctionOptions, OptionKey};
pub use self::core::sample::Sample;
pub use self::core::tensor::SymmetricTensor;
pub use self::core::types::{Matrix, Point};
pub use self::errors::{ErrorKind, FunctionError, FunctionResult};
pub use self::evaluation::{Evaluation, EvaluationHandle};
pub use self::gradient::{Gradient, GradientHandle};
pub use self::hessian::{Hessian, HessianHandle};
pub use self::triad::Function;

pub mod prelude {
    pub use super::analytic::{
        ClosureEvaluation, ClosureGradient, ClosureHessian, ConstantGradient, ConstantHessian, LinearEvaluation,
    };
    pub use super::combinators::ComparisonOperator;
    pub use super::core::{
        description::Description,
        options::FunctionOptions,
        sample::Sample,
        tensor::SymmetricTensor,
        types::{Matrix, Point},
    };
    pub use super::errors::{ErrorKind, FunctionError, FunctionResult};
    pub use super::evaluation::{Evaluation, EvaluationHandle};
    pub use super::finite_diff::{CenteredFiniteDifferenceGradient, CenteredFiniteDifferenceHessian};
    pub use super::formula::FormulaEngine;
    pub use super::gradient::{Gradient, GradientHandle};
    pub use super::hessian::{Hessian, HessianHandle};
    pub use super::triad::Function;
}
