//! Configuration management utilities
//!
//! Typed lookups over environment variables. Every helper takes the key lookup
//! as a function so callers can substitute a map in tests instead of mutating
//! the process environment.

use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

/// Error raised when a configuration value is present but unusable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The value could not be parsed into the expected type
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Parse a value obtained from an arbitrary key lookup into `T`
///
/// Returns `Ok(None)` when the key is absent or blank. Pass
/// `|k| std::env::var(k).ok()` to read the process environment.
pub fn lookup_parse<T, F>(key: &str, lookup: F) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
}
