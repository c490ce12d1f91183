//! Identities
//!
//! Every participant (external account, wallet, registry, token, endpoint) is
//! addressed by an [`Address`]. Accounts and deployed components use
//! `0x`-prefixed hex; wallets use P2SH-style Base58Check so they are easy to
//! tell apart.

use crate::crypto::{double_sha256, hash160};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version byte for wallet addresses (Base58Check strings starting with '3')
const WALLET_VERSION: u8 = 0x05;

/// A participant identity
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wrap an existing identity string
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The null identity; never a valid member, destination or owner
    pub fn zero() -> Self {
        Self(format!("0x{}", "0".repeat(40)))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty() || *self == Self::zero()
    }

    /// Fresh random account identity
    pub fn random() -> Self {
        let mut bytes = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(format!("0x{}", hex::encode(bytes)))
    }

    /// `0x`-prefixed hex address of HASH160 over `preimage`
    pub fn from_preimage(preimage: &[u8]) -> Self {
        Self(format!("0x{}", hex::encode(hash160(preimage))))
    }

    /// Base58Check wallet address of HASH160 over `preimage`
    ///
    /// Address = Base58Check(0x05 || RIPEMD160(SHA256(preimage)))
    pub fn wallet_from_preimage(preimage: &[u8]) -> Self {
        let mut bytes = vec![WALLET_VERSION];
        bytes.extend_from_slice(&hash160(preimage));
        let checksum = double_sha256(&bytes);
        bytes.extend_from_slice(&checksum[..4]);
        Self(bs58::encode(bytes).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bytes fed into derivation preimages
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Address {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().to_string()))
    }
}
