//! Arithmetic sugar on `&Function`.
//!
//! `&f + &g` and `&f - &g` are two-term linear combinations with
//! coefficients `[1, 1]` and `[1, -1]`; `&f * &g` is a product of scalar
//! functions. Construction can fail, so every operator yields a
//! [`FunctionResult`].
use crate::function::{errors::FunctionResult, triad::Function};
use std::ops::{Add, Mul, Sub};

impl Add for &Function {
    type Output = FunctionResult<Function>;

    fn add(self, rhs: &Function) -> Self::Output {
        Function::linear_combination(&[self.clone(), rhs.clone()], &[1.0, 1.0])
    }
}

impl Sub for &Function {
    type Output = FunctionResult<Function>;

    fn sub(self, rhs: &Function) -> Self::Output {
        Function::linear_combination(&[self.clone(), rhs.clone()], &[1.0, -1.0])
    }
}

impl Mul for &Function {
    type Output = FunctionResult<Function>;

    fn mul(self, rhs: &Function) -> Self::Output {
        Function::product(self, rhs)
    }
}
