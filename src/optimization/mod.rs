//! optimization — argmin boundary for scalar functions.
//!
//! Purpose
//! -------
//! Let optimizer consumers use a scalar [`Function`](crate::function::Function)
//! as an argmin problem, and offer a one-call L-BFGS minimiser on top.
//!
//! Key behaviors
//! -------------
//! - [`adapter::ArgMinAdapter`] implements argmin's `CostFunction`,
//!   `Gradient` and `Hessian` by delegating to the triad, so the
//!   finite-difference fallback and call counters keep working during a run.
//! - [`run::minimize`] builds L-BFGS with a More–Thuente line search from
//!   [`run::SolverOptions`] and returns a [`run::MinimizeOutcome`].
//!
//! Conventions
//! -----------
//! - Errors are [`FunctionError`](crate::function::FunctionError) values;
//!   argmin errors are converted through `From<argmin::core::Error>`, and
//!   errors raised inside the adapter come back unchanged.
pub mod adapter;
pub mod run;
pub mod types;

pub mod prelude {
    pub use super::adapter::ArgMinAdapter;
    pub use super::run::{minimize, MinimizeOutcome, SolverOptions};
    pub use super::types::DEFAULT_LBFGS_MEM;
}
