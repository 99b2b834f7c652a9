//! Fixed-precision money type for the trading core.
//!
//! All monetary values carry a fixed scale of 8 (common crypto-exchange
//! precision) and round half-even, so repeated operations accumulate no
//! systematic bias. Immutable and closed under its own arithmetic: every
//! operation yields another normalized `Money`.
//!
//! `f64` conversion exists only at two boundaries: ingesting LMSR results
//! (which are inherently floating point) and observability output. No
//! decision logic ever runs on floats.

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::{EngineError, Result};

/// Fixed scale for all monetary values (8 decimal places).
pub const SCALE: u32 = 8;

/// Immutable fixed-precision monetary value.
///
/// Equality and ordering are value-based: `1.5` and `1.50000000` compare
/// equal. The canonical textual form always carries exactly 8 fractional
/// digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(Decimal);

impl Money {
    /// Parse from a plain decimal string (safest for user input).
    pub fn of(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(EngineError::InvalidAmount(
                "amount string cannot be empty".to_string(),
            ));
        }
        let value = Decimal::from_str(trimmed).map_err(|_| {
            EngineError::InvalidAmount(format!("invalid amount format: {trimmed}"))
        })?;
        Ok(Self::from_decimal(value))
    }

    /// Build from a whole integer amount.
    pub fn from_int(value: i64) -> Self {
        Self::from_decimal(Decimal::from(value))
    }

    /// Build from a raw decimal, normalizing to scale 8.
    pub fn from_decimal(value: Decimal) -> Self {
        Self(normalize(value))
    }

    /// Ingest a floating-point value (LMSR results only).
    ///
    /// Fails with `InvalidAmount` on NaN or infinity.
    pub fn from_f64(value: f64) -> Result<Self> {
        let decimal = Decimal::from_f64(value).ok_or_else(|| {
            EngineError::InvalidAmount(format!("non-finite amount: {value}"))
        })?;
        Ok(Self::from_decimal(decimal))
    }

    pub fn zero() -> Self {
        Self::from_int(0)
    }

    /// Smallest representable increment at scale 8.
    pub fn ulp() -> Self {
        Self(Decimal::new(1, SCALE))
    }

    pub fn add(&self, other: Money) -> Result<Money> {
        self.0
            .checked_add(other.0)
            .map(Self::from_decimal)
            .ok_or_else(|| EngineError::Arithmetic("addition overflow".to_string()))
    }

    pub fn subtract(&self, other: Money) -> Result<Money> {
        self.0
            .checked_sub(other.0)
            .map(Self::from_decimal)
            .ok_or_else(|| EngineError::Arithmetic("subtraction overflow".to_string()))
    }

    /// Multiply by an integer scalar (shares, quantity).
    pub fn multiply(&self, scalar: i64) -> Result<Money> {
        self.multiply_decimal(Decimal::from(scalar))
    }

    /// Multiply by a decimal scalar (rates, prices).
    pub fn multiply_decimal(&self, scalar: Decimal) -> Result<Money> {
        self.0
            .checked_mul(scalar)
            .map(Self::from_decimal)
            .ok_or_else(|| EngineError::Arithmetic("multiplication overflow".to_string()))
    }

    /// Divide by an integer scalar. Fails on zero.
    pub fn divide(&self, scalar: i64) -> Result<Money> {
        self.divide_decimal(Decimal::from(scalar))
    }

    /// Divide by a decimal scalar. Fails on zero.
    pub fn divide_decimal(&self, scalar: Decimal) -> Result<Money> {
        if scalar.is_zero() {
            return Err(EngineError::Arithmetic(
                "cannot divide by zero".to_string(),
            ));
        }
        self.0
            .checked_div(scalar)
            .map(Self::from_decimal)
            .ok_or_else(|| EngineError::Arithmetic("division overflow".to_string()))
    }

    pub fn negate(&self) -> Money {
        Self::from_decimal(-self.0)
    }

    pub fn abs(&self) -> Money {
        Self::from_decimal(self.0.abs())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Underlying decimal (for persistence and further math only).
    pub fn to_decimal(&self) -> Decimal {
        self.0
    }

    /// Convert to `f64` for display and metrics. Never for decisions.
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or_default()
    }
}

/// Round half-even at scale 8, then pad the scale so the canonical
/// representation always shows 8 fractional digits.
fn normalize(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointNearestEven);
    rounded.rescale(SCALE);
    rounded
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Money::of(&raw).map_err(D::Error::custom)
    }
}
