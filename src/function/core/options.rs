//! Function options — numerical settings shared by the function core.
//!
//! Purpose
//! -------
//! Collect the handful of numerical knobs the function core needs in one
//! explicit, validated configuration object instead of a global resource
//! store: finite-difference steps for fallback gradients and Hessians, the
//! forward-difference step for parameter gradients, the relative threshold
//! under which combination coefficients are pruned, and the evaluation cache
//! capacity.
//!
//! Key behaviors
//! -------------
//! - [`FunctionOptions::new`] validates every field; [`Default`] provides the
//!   documented defaults.
//! - [`OptionKey`] parses the resource-map style keys (e.g.
//!   `"CenteredFiniteDifferenceGradient-DefaultEpsilon"`), so a plain
//!   key/value map can be applied via [`FunctionOptions::with_overrides`].
//!
//! Invariants & assumptions
//! ------------------------
//! - Steps are finite and strictly positive.
//! - `small_coefficient` is finite and in `[0, 1)`.
//! - `cache_max_size > 0`.
//!
//! Conventions
//! -----------
//! - Options are plain `Copy` data. Each [`Function`](crate::function::Function)
//!   carries its own copy and hands it to the pieces it builds.
//!
//! Testing notes
//! -------------
//! - Unit tests cover defaults, key parsing (including the
//!   linear-combination alias), and rejection of out-of-range values and
//!   unknown keys.
use crate::function::errors::{FunctionError, FunctionResult};
use std::str::FromStr;

/// Default step for centered finite-difference gradients.
pub const DEFAULT_GRADIENT_EPSILON: f64 = 1e-5;
/// Default step for centered finite-difference Hessians.
pub const DEFAULT_HESSIAN_EPSILON: f64 = 1e-4;
/// Default forward-difference step for parameter gradients.
pub const DEFAULT_PARAMETER_EPSILON: f64 = 1e-7;
/// Default relative pruning threshold for combination coefficients.
pub const DEFAULT_SMALL_COEFFICIENT: f64 = 0.0;
/// Default capacity of an evaluation cache.
pub const DEFAULT_CACHE_MAX_SIZE: usize = 1024;

/// Recognized configuration keys.
///
/// Parsing:
/// This enum implements `FromStr` and accepts the resource-map key names
/// exactly as written below. Unknown names return
/// `FunctionError::UnknownOption`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKey {
    /// `CenteredFiniteDifferenceGradient-DefaultEpsilon`
    GradientEpsilon,
    /// `CenteredFiniteDifferenceHessian-DefaultEpsilon`
    HessianEpsilon,
    /// `NumericalMathEvaluation-ParameterEpsilon`
    ParameterEpsilon,
    /// `DualLinearCombinationEvaluation-SmallCoefficient` or
    /// `LinearCombinationEvaluation-SmallCoefficient`
    SmallCoefficient,
    /// `cache-MaxSize`
    CacheMaxSize,
}

impl OptionKey {
    /// Canonical key name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionKey::GradientEpsilon => "CenteredFiniteDifferenceGradient-DefaultEpsilon",
            OptionKey::HessianEpsilon => "CenteredFiniteDifferenceHessian-DefaultEpsilon",
            OptionKey::ParameterEpsilon => "NumericalMathEvaluation-ParameterEpsilon",
            OptionKey::SmallCoefficient => "DualLinearCombinationEvaluation-SmallCoefficient",
            OptionKey::CacheMaxSize => "cache-MaxSize",
        }
    }
}

impl FromStr for OptionKey {
    type Err = FunctionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CenteredFiniteDifferenceGradient-DefaultEpsilon" => Ok(OptionKey::GradientEpsilon),
            "CenteredFiniteDifferenceHessian-DefaultEpsilon" => Ok(OptionKey::HessianEpsilon),
            "NumericalMathEvaluation-ParameterEpsilon" => Ok(OptionKey::ParameterEpsilon),
            "DualLinearCombinationEvaluation-SmallCoefficient"
            | "LinearCombinationEvaluation-SmallCoefficient" => Ok(OptionKey::SmallCoefficient),
            "cache-MaxSize" => Ok(OptionKey::CacheMaxSize),
            _ => Err(FunctionError::UnknownOption { key: s.to_string() }),
        }
    }
}

/// FunctionOptions — numerical configuration of the function core.
///
/// Fields
/// ------
/// - `gradient_epsilon`: `f64`
///   Step of the centered finite-difference gradient used as fallback.
/// - `hessian_epsilon`: `f64`
///   Step of the centered finite-difference Hessian used as fallback.
/// - `parameter_epsilon`: `f64`
///   Forward-difference step of the default parameter gradient.
/// - `small_coefficient`: `f64`
///   Relative threshold: a combination term with
///   `|c_i| <= small_coefficient · max|c|` is dropped.
/// - `cache_max_size`: `usize`
///   Maximum number of cached input/output pairs per evaluation.
///
/// Default
/// -------
/// - `gradient_epsilon = 1e-5`, `hessian_epsilon = 1e-4`,
///   `parameter_epsilon = 1e-7`, `small_coefficient = 0.0`,
///   `cache_max_size = 1024`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FunctionOptions {
    pub gradient_epsilon: f64,
    pub hessian_epsilon: f64,
    pub parameter_epsilon: f64,
    pub small_coefficient: f64,
    pub cache_max_size: usize,
}

impl FunctionOptions {
    /// Construct validated options.
    ///
    /// # Errors
    /// - [`FunctionError::InvalidOption`] when a step is non-finite or ≤ 0,
    ///   when `small_coefficient` is outside `[0, 1)`, or when
    ///   `cache_max_size == 0`.
    pub fn new(
        gradient_epsilon: f64, hessian_epsilon: f64, parameter_epsilon: f64,
        small_coefficient: f64, cache_max_size: usize,
    ) -> FunctionResult<Self> {
        verify_step(OptionKey::GradientEpsilon, gradient_epsilon)?;
        verify_step(OptionKey::HessianEpsilon, hessian_epsilon)?;
        verify_step(OptionKey::ParameterEpsilon, parameter_epsilon)?;
        verify_small_coefficient(small_coefficient)?;
        verify_cache_max_size(cache_max_size as f64)?;
        Ok(Self {
            gradient_epsilon,
            hessian_epsilon,
            parameter_epsilon,
            small_coefficient,
            cache_max_size,
        })
    }

    /// Set one option from its key and a numeric value.
    ///
    /// `cache-MaxSize` must be a positive whole number.
    pub fn set(&mut self, key: OptionKey, value: f64) -> FunctionResult<()> {
        match key {
            OptionKey::GradientEpsilon => {
                verify_step(key, value)?;
                self.gradient_epsilon = value;
            }
            OptionKey::HessianEpsilon => {
                verify_step(key, value)?;
                self.hessian_epsilon = value;
            }
            OptionKey::ParameterEpsilon => {
                verify_step(key, value)?;
                self.parameter_epsilon = value;
            }
            OptionKey::SmallCoefficient => {
                verify_small_coefficient(value)?;
                self.small_coefficient = value;
            }
            OptionKey::CacheMaxSize => {
                verify_cache_max_size(value)?;
                self.cache_max_size = value as usize;
            }
        }
        Ok(())
    }

    /// Apply a sequence of `(key, value)` overrides on top of `self`.
    ///
    /// # Errors
    /// - [`FunctionError::UnknownOption`] for unrecognized keys.
    /// - [`FunctionError::InvalidOption`] for out-of-range values.
    pub fn with_overrides<'a, I>(mut self, overrides: I) -> FunctionResult<Self>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        for (key, value) in overrides {
            self.set(key.parse()?, value)?;
        }
        Ok(self)
    }
}

impl Default for FunctionOptions {
    fn default() -> Self {
        Self {
            gradient_epsilon: DEFAULT_GRADIENT_EPSILON,
            hessian_epsilon: DEFAULT_HESSIAN_EPSILON,
            parameter_epsilon: DEFAULT_PARAMETER_EPSILON,
            small_coefficient: DEFAULT_SMALL_COEFFICIENT,
            cache_max_size: DEFAULT_CACHE_MAX_SIZE,
        }
    }
}

// ---- Helper methods ----

fn verify_step(key: OptionKey, value: f64) -> FunctionResult<()> {
    if !value.is_finite() {
        return Err(FunctionError::InvalidOption {
            key: key.as_str().to_string(),
            value,
            reason: "Step must be finite.",
        });
    }
    if value <= 0.0 {
        return Err(FunctionError::InvalidOption {
            key: key.as_str().to_string(),
            value,
            reason: "Step must be positive.",
        });
    }
    Ok(())
}

fn verify_small_coefficient(value: f64) -> FunctionResult<()> {
    if !value.is_finite() || !(0.0..1.0).contains(&value) {
        return Err(FunctionError::InvalidOption {
            key: OptionKey::SmallCoefficient.as_str().to_string(),
            value,
            reason: "Relative threshold must lie in [0, 1).",
        });
    }
    Ok(())
}

fn verify_cache_max_size(value: f64) -> FunctionResult<()> {
    if !value.is_finite() || value < 1.0 || value.fract() != 0.0 {
        return Err(FunctionError::InvalidOption {
            key: OptionKey::CacheMaxSize.as_str().to_string(),
            value,
            reason: "Cache size must be a positive whole number.",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Documented defaults.
    // - Key parsing and overrides through resource-map names.
    // - Rejection of invalid values and unknown keys.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify the documented default values.
    //
    // Given
    // -----
    // - `FunctionOptions::default()`.
    //
    // Expect
    // ------
    // - Each field equals its `DEFAULT_*` constant and passes validation.
    fn default_matches_documented_values() {
        // Arrange / Act
        let opts = FunctionOptions::default();

        // Assert
        assert_eq!(opts.gradient_epsilon, 1e-5);
        assert_eq!(opts.hessian_epsilon, 1e-4);
        assert_eq!(opts.parameter_epsilon, 1e-7);
        assert_eq!(opts.small_coefficient, 0.0);
        assert_eq!(opts.cache_max_size, 1024);
        assert!(FunctionOptions::new(1e-5, 1e-4, 1e-7, 0.0, 1024).is_ok());
    }

    #[test]
    // Purpose
    // -------
    // Ensure resource-map keys, including the linear-combination alias, apply.
    //
    // Given
    // -----
    // - Overrides for the gradient step, the aliased small-coefficient key,
    //   and the cache size.
    //
    // Expect
    // ------
    // - The three fields change; the others keep their defaults.
    fn with_overrides_applies_resource_map_keys() {
        // Arrange
        let overrides = [
            ("CenteredFiniteDifferenceGradient-DefaultEpsilon", 1e-6),
            ("LinearCombinationEvaluation-SmallCoefficient", 1e-12),
            ("cache-MaxSize", 8.0),
        ];

        // Act
        let opts = FunctionOptions::default().with_overrides(overrides).expect("valid overrides");

        // Assert
        assert_eq!(opts.gradient_epsilon, 1e-6);
        assert_eq!(opts.small_coefficient, 1e-12);
        assert_eq!(opts.cache_max_size, 8);
        assert_eq!(opts.hessian_epsilon, DEFAULT_HESSIAN_EPSILON);
    }

    #[test]
    // Purpose
    // -------
    // Confirm invalid values and unknown keys are rejected.
    //
    // Given
    // -----
    // - A negative Hessian step, a threshold of 1.0, a fractional cache size,
    //   and an unknown key.
    //
    // Expect
    // ------
    // - `InvalidOption` for the three values, `UnknownOption` for the key.
    fn invalid_values_and_unknown_keys_are_rejected() {
        // Arrange
        let base = FunctionOptions::default();

        // Act
        let neg = base.with_overrides([("CenteredFiniteDifferenceHessian-DefaultEpsilon", -1.0)]);
        let big = base.with_overrides([("DualLinearCombinationEvaluation-SmallCoefficient", 1.0)]);
        let frac = base.with_overrides([("cache-MaxSize", 2.5)]);
        let unknown = base.with_overrides([("Foo-Bar", 1.0)]);

        // Assert
        assert!(matches!(neg, Err(FunctionError::InvalidOption { .. })));
        assert!(matches!(big, Err(FunctionError::InvalidOption { .. })));
        assert!(matches!(frac, Err(FunctionError::InvalidOption { .. })));
        assert_eq!(unknown, Err(FunctionError::UnknownOption { key: "Foo-Bar".to_string() }));
    }
}
