//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts via `#[from]`.
//! The types here cover the failures the domain itself can detect:
//! malformed durations and times of day, and names that do not resolve to
//! a known Thing.

/// A duration string such as `"10s"` or `"-2250s"` could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseDurationError {
    /// The input was empty (or only whitespace).
    #[error("duration is empty")]
    Empty,
    /// The numeric part is not an integer.
    #[error("`{0}` is not a valid duration")]
    NotANumber(String),
    /// The single-letter suffix is not one of `S`, `M`, `H`, `D`.
    #[error("unknown duration unit `{0}` (expected S, M, H or D)")]
    UnknownUnit(char),
    /// The duration was negative where only periods are allowed.
    #[error("duration `{0}` must not be negative")]
    Negative(String),
    /// The duration was zero where a strictly positive period is required.
    #[error("duration `{0}` must be greater than zero")]
    Zero(String),
    /// The scaled value does not fit into 64 bits.
    #[error("duration `{0}` is too large")]
    Overflow(String),
}

/// A time of day such as `"22:00:00"` could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{input}` is not a time of day in the HH:MM:SS form")]
pub struct ParseTimeError {
    /// The rejected input.
    pub input: String,
    /// The underlying chrono parse failure.
    #[source]
    pub source: chrono::ParseError,
}

/// A name did not resolve to any Thing known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{name}` cannot be found among the known things")]
pub struct LookupError {
    /// The name that was looked up.
    pub name: String,
}

impl LookupError {
    /// Build a lookup error for the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
