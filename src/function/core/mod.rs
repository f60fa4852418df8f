//! Core data carriers and bookkeeping for the function layer.
//!
//! - [`types`]: `Point` / `Matrix` aliases over `ndarray`.
//! - [`description`]: variable names with synthesized defaults.
//! - [`sample`]: row-major point collections.
//! - [`tensor`]: Hessian storage symmetric in its first two axes.
//! - [`options`]: validated numerical configuration.
//! - [`state`]: call counters, cache, history, parameters.
//! - [`validation`] and [`linalg`]: shared checks and dense helpers.
pub mod description;
pub mod linalg;
pub mod options;
pub mod sample;
pub mod state;
pub mod tensor;
pub mod types;
pub mod validation;
