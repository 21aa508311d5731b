/// Ledger Kernel — Arithmetic Primitives
///
/// All money and quantity values: i64 fixed-point (SCALE = 10_000).
/// No float. No f64. No f32.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fixed-point scale factor. All "real" values are stored as `real * SCALE`.
pub const SCALE: i64 = 10_000;

/// Number of fractional digits represented by `SCALE`.
const SCALE_DIGITS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArithmeticError {
    #[error("Overflow: {lhs} {op} {rhs} overflows i64")]
    Overflow { lhs: i64, op: char, rhs: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseAmountError {
    #[error("empty decimal string")]
    Empty,
    #[error("invalid decimal {0:?}: expected digits with at most one '.'")]
    Malformed(String),
    #[error("decimal {0:?} has more than 4 fractional digits")]
    TooPrecise(String),
    #[error("decimal {0:?} does not fit in fixed-point i64")]
    OutOfRange(String),
}

/// Checked integer addition.
pub fn checked_add(a: i64, b: i64) -> Result<i64, ArithmeticError> {
    a.checked_add(b).ok_or(ArithmeticError::Overflow { lhs: a, op: '+', rhs: b })
}

/// Checked integer subtraction.
pub fn checked_sub(a: i64, b: i64) -> Result<i64, ArithmeticError> {
    a.checked_sub(b).ok_or(ArithmeticError::Overflow { lhs: a, op: '-', rhs: b })
}

/// Checked integer multiplication.
pub fn checked_mul(a: i64, b: i64) -> Result<i64, ArithmeticError> {
    a.checked_mul(b).ok_or(ArithmeticError::Overflow { lhs: a, op: '*', rhs: b })
}

fn parse_scaled(input: &str) -> Result<i64, ParseAmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseAmountError::Empty);
    }

    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));

    let well_formed = !whole.is_empty()
        && whole.chars().all(|c| c.is_ascii_digit())
        && frac.chars().all(|c| c.is_ascii_digit());
    if !well_formed {
        return Err(ParseAmountError::Malformed(input.to_string()));
    }
    if frac.len() > SCALE_DIGITS {
        return Err(ParseAmountError::TooPrecise(input.to_string()));
    }

    let out_of_range = || ParseAmountError::OutOfRange(input.to_string());
    let whole: i64 = whole.parse().map_err(|_| out_of_range())?;
    let frac_scaled: i64 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<width$}", width = SCALE_DIGITS);
        padded.parse().map_err(|_| out_of_range())?
    };

    let magnitude = checked_mul(whole, SCALE)
        .and_then(|w| checked_add(w, frac_scaled))
        .map_err(|_| out_of_range())?;
    Ok(if negative { -magnitude } else { magnitude })
}

fn format_scaled(value: i64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    let scale = SCALE as u64;
    let whole = abs / scale;
    let frac = abs % scale;
    if frac == 0 {
        return write!(f, "{sign}{whole}");
    }
    let frac = format!("{frac:0>width$}", width = SCALE_DIGITS);
    write!(f, "{sign}{whole}.{}", frac.trim_end_matches('0'))
}

macro_rules! fixed_point {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub const ZERO: Self = Self(0);

            /// Wraps an already-scaled integer.
            pub const fn from_scaled(scaled: i64) -> Self {
                Self(scaled)
            }

            /// Whole units, e.g. `from_units(300)` is 300.0000.
            pub fn from_units(units: i64) -> Result<Self, ArithmeticError> {
                checked_mul(units, SCALE).map(Self)
            }

            pub const fn scaled(self) -> i64 {
                self.0
            }

            pub fn checked_add(self, rhs: Self) -> Result<Self, ArithmeticError> {
                checked_add(self.0, rhs.0).map(Self)
            }

            pub fn checked_sub(self, rhs: Self) -> Result<Self, ArithmeticError> {
                checked_sub(self.0, rhs.0).map(Self)
            }

            pub fn is_positive(self) -> bool {
                self.0 > 0
            }

            pub fn is_negative(self) -> bool {
                self.0 < 0
            }

            /// Absolute difference, saturating at `i64::MAX`.
            pub fn abs_diff(self, other: Self) -> Self {
                let diff = self.0.abs_diff(other.0);
                Self(i64::try_from(diff).unwrap_or(i64::MAX))
            }
        }

        impl FromStr for $name {
            type Err = ParseAmountError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_scaled(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                format_scaled(self.0, f)
            }
        }
    };
}

fixed_point!(Amount);
fixed_point!(Quantity);

impl Quantity {
    /// Subtraction clamped at zero. Stock never goes negative.
    pub fn saturating_sub_floor_zero(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0).max(0))
    }
}
