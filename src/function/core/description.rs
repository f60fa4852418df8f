//! function::core::description — variable-name descriptions.
//!
//! A [`Description`] is an ordered list of variable names attached to the
//! inputs, outputs, or parameters of an evaluation. When nothing was ever set,
//! names are synthesized from a prefix and the component index (`x0, x1, …`).
use std::ops::Index;

/// Default prefix for synthesized input names.
pub const INPUT_PREFIX: &str = "x";
/// Default prefix for synthesized output names.
pub const OUTPUT_PREFIX: &str = "y";
/// Default prefix for synthesized parameter names.
pub const PARAMETER_PREFIX: &str = "p";

/// Ordered list of variable names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Description(Vec<String>);

impl Description {
    /// Wrap an explicit list of names.
    pub fn new(names: Vec<String>) -> Self {
        Description(names)
    }

    /// Build `"{prefix}0", "{prefix}1", …` for `dim` components.
    pub fn build_default(dim: usize, prefix: &str) -> Self {
        Description((0..dim).map(|i| format!("{prefix}{i}")).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    /// Names at the given positions, in the order given.
    ///
    /// Callers validate `indices` beforehand; out-of-range positions panic.
    pub fn select(&self, indices: &[usize]) -> Description {
        Description(indices.iter().map(|&i| self.0[i].clone()).collect())
    }

    /// Append the names of `other` after the names of `self`.
    pub fn concat(&self, other: &Description) -> Description {
        let mut names = self.0.clone();
        names.extend(other.0.iter().cloned());
        Description(names)
    }

    /// Split into a head of length `at` and the remaining tail.
    pub fn split_at(&self, at: usize) -> (Description, Description) {
        let (head, tail) = self.0.split_at(at.min(self.0.len()));
        (Description(head.to_vec()), Description(tail.to_vec()))
    }
}

impl Index<usize> for Description {
    type Output = String;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl From<Vec<String>> for Description {
    fn from(names: Vec<String>) -> Self {
        Description(names)
    }
}

impl From<&[&str]> for Description {
    fn from(names: &[&str]) -> Self {
        Description(names.iter().map(|s| s.to_string()).collect())
    }
}

impl FromIterator<String> for Description {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Description(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // Verify synthesized default names and basic slicing helpers.
    //
    // Given
    // -----
    // - A default description of three inputs.
    //
    // Expect
    // ------
    // - Names `x0, x1, x2`; `select` and `split_at` preserve order.
    fn build_default_select_and_split_preserve_order() {
        // Arrange
        let d = Description::build_default(3, INPUT_PREFIX);

        // Act
        let picked = d.select(&[2, 0]);
        let (head, tail) = d.split_at(1);

        // Assert
        assert_eq!(d.as_slice(), &["x0", "x1", "x2"]);
        assert_eq!(picked.as_slice(), &["x2", "x0"]);
        assert_eq!(head.as_slice(), &["x0"]);
        assert_eq!(tail.as_slice(), &["x1", "x2"]);
        assert_eq!(head.concat(&tail), d);
    }
}
