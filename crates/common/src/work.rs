//! Difficulty and chain work model
//!
//! Converts a compact difficulty target into a comparable work value and
//! accumulates it along a path. Work is kept as an arbitrary precision
//! unsigned integer so that summing many blocks never overflows.

use crate::error::ValidationError;
use crate::types::Hash;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

const MANTISSA_MASK: u32 = 0x007f_ffff;
const SIGN_BIT: u32 = 0x0080_0000;

/// Compact ("nBits") encoding of a 256-bit difficulty target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompactTarget(pub u32);

impl CompactTarget {
    /// Expands the compact form into the full target.
    pub fn to_target(self) -> Result<BigUint, ValidationError> {
        let bits = self.0;
        let exponent = bits >> 24;
        let mantissa = bits & MANTISSA_MASK;

        if bits & SIGN_BIT != 0 && mantissa != 0 {
            return Err(ValidationError::InvalidTarget(format!("negative target {:#010x}", bits)));
        }

        let target = if exponent <= 3 {
            BigUint::from(mantissa >> (8 * (3 - exponent)))
        } else {
            BigUint::from(mantissa) << (8 * (exponent - 3) as usize)
        };

        if target.is_zero() {
            return Err(ValidationError::InvalidTarget(format!("zero target {:#010x}", bits)));
        }
        if target.bits() > 256 {
            return Err(ValidationError::InvalidTarget(format!("target overflow {:#010x}", bits)));
        }
        Ok(target)
    }

    /// True when `hash`, read as a big-endian integer, does not exceed the target.
    pub fn is_met_by(self, hash: &Hash) -> Result<bool, ValidationError> {
        let target = self.to_target()?;
        Ok(BigUint::from_bytes_be(&hash.0) <= target)
    }
}

impl From<u32> for CompactTarget {
    fn from(bits: u32) -> Self {
        CompactTarget(bits)
    }
}

/// Cumulative proof of work.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ChainWork(BigUint);

impl ChainWork {
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    /// Work = 2^256 / (target + 1)
    pub fn from_target(target: &BigUint) -> Self {
        let numerator = BigUint::one() << 256usize;
        Self(numerator / (target + BigUint::one()))
    }

    /// Work contributed by a single block with the given compact target.
    pub fn from_bits(bits: u32) -> Result<Self, ValidationError> {
        let target = CompactTarget(bits).to_target()?;
        Ok(Self::from_target(&target))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<u64> for ChainWork {
    fn from(v: u64) -> Self {
        Self(BigUint::from(v))
    }
}

impl Add for ChainWork {
    type Output = ChainWork;

    fn add(self, other: Self) -> Self {
        ChainWork(self.0 + other.0)
    }
}

impl<'a> Add<&'a ChainWork> for &'a ChainWork {
    type Output = ChainWork;

    fn add(self, other: &'a ChainWork) -> ChainWork {
        ChainWork(&self.0 + &other.0)
    }
}

impl fmt::Display for ChainWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
