//! Cryptographic utilities
//!
//! This module provides:
//! - SHA-256 hashing
//! - HASH160 for address derivation
//! - Call selectors

pub mod hash;

pub use hash::{double_sha256, hash160, selector, sha256};
