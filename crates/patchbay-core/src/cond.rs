//! Field conditions for message matching
//!
//! A [`Cond`] is the per-field predicate used by every pattern type:
//! - [`Cond::Any`] matches any value
//! - [`Cond::Eq`] matches one exact value
//! - [`Cond::OneOf`] matches membership in a set of values

use std::fmt;

/// Condition on a single message field
#[derive(Debug, Clone, PartialEq)]
pub enum Cond<T> {
    /// Don't care
    Any,
    /// Field must equal the value
    Eq(T),
    /// Field must be one of the values
    OneOf(Vec<T>),
}

impl<T> Default for Cond<T> {
    fn default() -> Self {
        Cond::Any
    }
}

impl<T: PartialEq> Cond<T> {
    /// Membership condition from any collection of values
    pub fn one_of(values: impl IntoIterator<Item = T>) -> Self {
        Cond::OneOf(values.into_iter().collect())
    }

    /// Check a field value against the condition
    pub fn test(&self, value: &T) -> bool {
        match self {
            Cond::Any => true,
            Cond::Eq(expected) => expected == value,
            Cond::OneOf(values) => values.contains(value),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Cond::Any)
    }
}

impl<T: fmt::Debug> Cond<T> {
    /// Render as `name=value` for pattern descriptions, `None` for `Any`
    pub(crate) fn describe(&self, name: &str) -> Option<String> {
        match self {
            Cond::Any => None,
            Cond::Eq(v) => Some(format!("{}={:?}", name, v)),
            Cond::OneOf(vs) => Some(format!("{} in {:?}", name, vs)),
        }
    }
}

/// Join field descriptions, `*` when every field is `Any`
pub(crate) fn describe_fields(fields: impl IntoIterator<Item = Option<String>>) -> String {
    let parts: Vec<String> = fields.into_iter().flatten().collect();
    if parts.is_empty() {
        "*".to_string()
    } else {
        parts.join(", ")
    }
}
