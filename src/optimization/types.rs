//! Shared aliases for the argmin-backed optimizer.
//!
//! The solver works directly on the crate's [`Point`] and [`Matrix`] types so
//! that a scalar [`Function`](crate::function::Function) can be handed to
//! argmin without copying into another representation.
use crate::function::{Matrix, Point};
use argmin::solver::{linesearch::MoreThuenteLineSearch, quasinewton::LBFGS};
use std::collections::HashMap;

/// Scalar objective value.
pub type Cost = f64;

/// Objective gradient as a flat vector (column 0 of the `n × 1` gradient).
pub type Grad = Point;

/// Objective Hessian as a dense `n × n` matrix (sheet 0 of the tensor).
pub type HessianMatrix = Matrix;

/// Function-evaluation counters reported by argmin, keyed by counter name.
pub type FnEvalMap = HashMap<String, u64>;

/// Default L-BFGS history length.
pub const DEFAULT_LBFGS_MEM: usize = 7;

pub type MoreThuenteLS = MoreThuenteLineSearch<Point, Grad, Cost>;

pub type LbfgsMoreThuente = LBFGS<MoreThuenteLS, Point, Grad, Cost>;
