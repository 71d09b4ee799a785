//! The 32-byte generic hash used for capability chains and key derivation.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

/// Hash the concatenation of `parts` into 32 bytes (BLAKE2b-256).
pub fn hash32(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
