//! Instrument identifiers
//!
//! A `Symbol` is the normalized key of the book cache. Client input is
//! sanitized the same way everywhere: anything outside `[A-Za-z0-9-]` is
//! stripped and the rest is upper-cased, so `"btcusdt"` and `"BTCUSDT"` name
//! the same instrument.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::StreamError;

/// Normalized, validated trading pair symbol (e.g. `BTCUSDT`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Shortest accepted symbol after normalization.
    pub const MIN_LEN: usize = 4;
    /// Longest accepted symbol after normalization.
    pub const MAX_LEN: usize = 32;

    /// Normalize and validate raw client or upstream input.
    pub fn parse(raw: &str) -> Result<Self, StreamError> {
        let normalized = Self::normalize(raw);

        if normalized.is_empty() {
            return Err(StreamError::invalid_symbol(raw, "symbol is empty"));
        }
        if normalized.len() < Self::MIN_LEN {
            return Err(StreamError::invalid_symbol(
                raw,
                format!("symbol must be at least {} characters", Self::MIN_LEN),
            ));
        }
        if normalized.len() > Self::MAX_LEN {
            return Err(StreamError::invalid_symbol(
                raw,
                format!("symbol must be at most {} characters", Self::MAX_LEN),
            ));
        }

        Ok(Self(normalized))
    }

    /// Strip characters outside `[A-Za-z0-9-]` and upper-case the rest.
    pub fn normalize(raw: &str) -> String {
        raw.chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    /// Get the symbol string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = StreamError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
