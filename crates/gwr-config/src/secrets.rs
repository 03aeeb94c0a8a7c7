//! Runtime secret resolution.
//!
//! Configuration stores only environment variable NAMES. Values are read
//! once, at the edge, through [`resolve_env`] (or an injected lookup in
//! tests) and never appear in errors or `Debug` output.

use std::fmt;

/// Reads a named environment variable. `None` if unset or blank.
pub fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// A resolved secret value. Prints as `<REDACTED>`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<REDACTED>")
    }
}
