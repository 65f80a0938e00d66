//! Compact target encoding and the work each target represents.
//!
//! Bits use the usual 32-bit floating encoding: the high byte is the size in
//! bytes of the target, the low 23 bits the mantissa, bit 23 a sign that must
//! be clear.

use btmd_consensus::Hash256;
use primitive_types::U256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactError {
    Negative,
    Overflow,
}

impl std::fmt::Display for CompactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactError::Negative => write!(f, "compact target has the sign bit set"),
            CompactError::Overflow => write!(f, "compact target does not fit 256 bits"),
        }
    }
}

impl std::error::Error for CompactError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowError {
    Compact(CompactError),
    ZeroTarget,
    HashAboveTarget,
}

impl std::fmt::Display for PowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowError::Compact(err) => write!(f, "{err}"),
            PowError::ZeroTarget => write!(f, "difficulty target is zero"),
            PowError::HashAboveTarget => write!(f, "block hash does not meet target"),
        }
    }
}

impl std::error::Error for PowError {}

impl From<CompactError> for PowError {
    fn from(err: CompactError) -> Self {
        PowError::Compact(err)
    }
}

pub fn compact_to_u256(bits: u32) -> Result<U256, CompactError> {
    if bits & 0x0080_0000 != 0 {
        return Err(CompactError::Negative);
    }
    let size = bits >> 24;
    let mantissa = bits & 0x007f_ffff;
    if size <= 3 {
        return Ok(U256::from(mantissa >> (8 * (3 - size))));
    }
    if mantissa != 0 {
        let too_wide = size > 34
            || (mantissa > 0xff && size > 33)
            || (mantissa > 0xffff && size > 32);
        if too_wide {
            return Err(CompactError::Overflow);
        }
    }
    Ok(U256::from(mantissa) << (8 * (size - 3)))
}

pub fn u256_to_compact(value: U256) -> u32 {
    if value.is_zero() {
        return 0;
    }
    let mut size = value.bits().div_ceil(8) as u32;
    let mut mantissa = if size <= 3 {
        value.low_u32() << (8 * (3 - size))
    } else {
        (value >> (8 * (size - 3))).low_u32()
    };
    // Keep the sign bit clear by widening.
    if mantissa & 0x0080_0000 != 0 {
        mantissa >>= 8;
        size += 1;
    }
    (size << 24) | (mantissa & 0x007f_ffff)
}

/// Target as a little-endian 256-bit integer.
pub fn compact_to_target(bits: u32) -> Result<Hash256, CompactError> {
    Ok(compact_to_u256(bits)?.to_little_endian())
}

pub fn hash_meets_target(hash: &Hash256, target: &Hash256) -> bool {
    U256::from_little_endian(hash) <= U256::from_little_endian(target)
}

/// Expected number of hashes needed to hit the target: `2^256 / (target + 1)`.
pub fn block_proof(bits: u32) -> Result<U256, CompactError> {
    let target = compact_to_u256(bits)?;
    if target.is_zero() {
        return Ok(U256::zero());
    }
    // 2^256 does not fit, so compute (2^256 - target - 1) / (target + 1) + 1.
    Ok((!target / (target + U256::one())) + U256::one())
}

pub fn check_proof_of_work(hash: &Hash256, bits: u32) -> Result<(), PowError> {
    let target = compact_to_u256(bits)?;
    if target.is_zero() {
        return Err(PowError::ZeroTarget);
    }
    if U256::from_little_endian(hash) > target {
        return Err(PowError::HashAboveTarget);
    }
    Ok(())
}
