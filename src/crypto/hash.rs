//! Hashing utilities
//!
//! SHA-256 based helpers used for address derivation, call selectors and
//! checksums.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Length of a call selector in bytes
pub const SELECTOR_LEN: usize = 4;

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes double SHA-256 hash (SHA-256 of SHA-256)
pub fn double_sha256(data: &[u8]) -> Vec<u8> {
    sha256(&sha256(data))
}

/// RIPEMD160(SHA256(data)), 20 bytes
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let mut ripemd = Ripemd160::new();
    ripemd.update(sha256(data));
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripemd.finalize());
    out
}

/// First four bytes of SHA-256 over a canonical function signature
///
/// `selector("confirmTransaction(uint256)")` identifies the call in a payload.
pub fn selector(signature: &str) -> [u8; SELECTOR_LEN] {
    let hash = sha256(signature.as_bytes());
    let mut out = [0u8; SELECTOR_LEN];
    out.copy_from_slice(&hash[..SELECTOR_LEN]);
    out
}
