//! Conversions between integers and LSB-first bit vectors
use bitvec::prelude::*;

/// The low `len` bits of `value`, LSB first.  `len` may exceed 64, in which case the upper bits
/// are zero.
pub fn from_u64(value: u64, len: usize) -> BitVec<u8, Lsb0> {
    let mut bits = BitVec::with_capacity(len);
    for i in 0..len {
        bits.push(i < 64 && (value >> i) & 1 == 1);
    }
    bits
}

/// Pack up to the first 64 bits of `bits` into an integer, first bit in the LSB
pub fn to_u64(bits: &BitSlice<u8, Lsb0>) -> u64 {
    bits.iter()
        .by_vals()
        .take(64)
        .enumerate()
        .fold(0, |acc, (i, bit)| acc | (bit as u64) << i)
}

/// A mask of the low `len` bits
pub fn mask(len: usize) -> u64 {
    if len >= 64 {
        u64::MAX
    } else {
        (1 << len) - 1
    }
}
