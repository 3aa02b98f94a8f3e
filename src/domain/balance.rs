use crate::error::{Result, WithdrawError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Sub;

/// A balance as stored in the remote store.
///
/// Balances are plain signed integers on the wire. The engine never lets a
/// withdrawal drive one below zero, but `init` may store any integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(pub i64);

/// A strictly positive withdrawal amount.
///
/// Constructing one is the only way into the strategies, so a non-positive
/// amount is rejected before any store access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub fn new(value: i64) -> Result<Self> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(WithdrawError::InvalidAmount(value))
        }
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Amount {
    type Error = WithdrawError;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(0);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Parses a raw stored value, reporting the key on failure.
    ///
    /// Conditional writes compare the stored text, so only the canonical
    /// form (no sign prefix, padding or leading zeros) is accepted.
    pub fn parse(key: &str, raw: &str) -> Result<Self> {
        parse_canonical(raw)
            .map(Self)
            .ok_or_else(|| WithdrawError::CorruptValue {
                key: key.to_string(),
                value: raw.to_string(),
            })
    }

    pub fn covers(&self, amount: Amount) -> bool {
        self.0 >= amount.0
    }
}

/// Reads `raw` as an `i64` only if formatting the result gives back `raw`.
pub fn parse_canonical(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|n| n.to_string() == raw)
}

impl Sub<Amount> for Balance {
    type Output = Self;
    fn sub(self, rhs: Amount) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
