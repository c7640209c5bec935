// crates/fanout-core/src/hash.rs
//
// 32-bit FNV-1a, used for both ring positions and key placement.

/// FNV-1a 32-bit offset basis.
pub const FNV_OFFSET_BASIS_32: u32 = 2_166_136_261;

/// FNV-1a 32-bit prime. Multiplying by it equals
/// `h + (h << 1) + (h << 4) + (h << 7) + (h << 8) + (h << 24)` modulo 2^32.
pub const FNV_PRIME_32: u32 = 16_777_619;

/// Hash a string with 32-bit FNV-1a over its UTF-8 bytes.
///
/// Non-cryptographic. The result is stable across platforms and processes,
/// which is what makes ring placement reproducible.
pub fn fnv1a_32(input: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS_32;
    for &byte in input.as_bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME_32);
    }
    hash
}
