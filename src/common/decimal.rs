//! Fixed-point probabilities
//!
//! Every rank and vote is a decimal with exactly [`SCALE`] fractional digits.
//! Division and multiplication truncate toward zero, so `1/N` only becomes
//! zero once `N` exceeds `10^SCALE`.

use crate::common::{Error, Result};
use bigdecimal::num_bigint::BigInt;
use bigdecimal::num_traits::Zero;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

/// Number of fractional digits kept for every probability
pub const SCALE: i64 = 30;

/// A non-negative probability at fixed scale
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Probability(BigDecimal);

impl Probability {
    pub fn zero() -> Self {
        Self(BigDecimal::zero().with_scale(SCALE))
    }

    pub fn one() -> Self {
        Self(BigDecimal::from(1).with_scale(SCALE))
    }

    /// Wrap an arbitrary decimal, truncating it to [`SCALE`].
    pub fn from_decimal(value: BigDecimal) -> Self {
        Self(value.with_scale(SCALE))
    }

    /// `1 / cardinality`, truncated. Zero for an empty graph.
    pub fn uniform(cardinality: usize) -> Self {
        if cardinality == 0 {
            return Self::zero();
        }
        Self::one().div_truncate(cardinality as u64)
    }

    /// Divide by a positive integer, truncating toward zero.
    pub fn div_truncate(&self, divisor: u64) -> Self {
        debug_assert!(divisor > 0);
        let (digits, scale) = self.0.with_scale(SCALE).into_bigint_and_exponent();
        Self(BigDecimal::new(digits / BigInt::from(divisor), scale))
    }

    /// Multiply by an arbitrary decimal, truncating the product to [`SCALE`].
    pub fn mul_truncate(&self, factor: &BigDecimal) -> Self {
        Self((&self.0 * factor).with_scale(SCALE))
    }

    /// Smallest representable step, `10^-SCALE`.
    pub fn ulp() -> Self {
        Self(BigDecimal::new(BigInt::from(1), SCALE))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_decimal(&self) -> &BigDecimal {
        &self.0
    }

    pub fn into_decimal(self) -> BigDecimal {
        self.0
    }
}

impl Default for Probability {
    fn default() -> Self {
        Self::zero()
    }
}

impl Add for Probability {
    type Output = Probability;

    fn add(self, rhs: Probability) -> Probability {
        Probability((self.0 + rhs.0).with_scale(SCALE))
    }
}

impl<'a> Add<&'a Probability> for Probability {
    type Output = Probability;

    fn add(self, rhs: &'a Probability) -> Probability {
        Probability((self.0 + &rhs.0).with_scale(SCALE))
    }
}

impl Sum for Probability {
    fn sum<I: Iterator<Item = Probability>>(iter: I) -> Self {
        iter.fold(Probability::zero(), |acc, p| acc + p)
    }
}

impl<'a> Sum<&'a Probability> for Probability {
    fn sum<I: Iterator<Item = &'a Probability>>(iter: I) -> Self {
        iter.fold(Probability::zero(), |acc, p| acc + p)
    }
}

impl FromStr for Probability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value = BigDecimal::from_str(s.trim())
            .map_err(|e| Error::Corrupted(format!("invalid probability '{}': {}", s, e)))?;
        Ok(Self::from_decimal(value))
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Random-surfer continuation probability, strictly between 0 and 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DampingFactor(BigDecimal);

impl DampingFactor {
    pub fn new(value: BigDecimal) -> Result<Self> {
        if value <= BigDecimal::zero() || value >= BigDecimal::from(1) {
            return Err(Error::InvalidConfig(format!(
                "damping factor must be in (0, 1), got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    /// Convert a configured float through its shortest decimal representation,
    /// so that `0.85` means exactly `0.85`.
    pub fn from_f64(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "damping factor must be finite, got {}",
                value
            )));
        }
        let decimal = BigDecimal::from_str(&value.to_string())
            .map_err(|e| Error::InvalidConfig(format!("invalid damping factor: {}", e)))?;
        Self::new(decimal)
    }

    pub fn as_decimal(&self) -> &BigDecimal {
        &self.0
    }

    /// `(1 - d) / cardinality`, the share every vertex receives regardless of votes.
    pub fn sink_probability(&self, cardinality: usize) -> Probability {
        if cardinality == 0 {
            return Probability::zero();
        }
        let remainder = Probability::from_decimal(BigDecimal::from(1) - &self.0);
        remainder.div_truncate(cardinality as u64)
    }

    /// `d * inbound + sink`, the reduced rank of one vertex.
    pub fn apply(&self, inbound: &Probability, sink_probability: &Probability) -> Probability {
        inbound.mul_truncate(&self.0) + sink_probability
    }
}

impl fmt::Display for DampingFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
