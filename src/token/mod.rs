//! Fungible token endpoint
//!
//! A mintable token owned by a wallet. Wallets reach it through ordinary
//! transactions carrying a `transfer(address,uint256)` or
//! `mint(address,uint256)` payload.
//!
//! # Example
//!
//! ```ignore
//! use multisig_registry::core::call::TokenCall;
//!
//! let token = runtime.deploy_token(&deployer, "My Token", "MTK", 18, &wallet, 1_000)?;
//! let payload = TokenCall::Transfer { to: recipient, amount: 10 }.encode();
//! let id = runtime.submit(&alice, &wallet, Proposal::new("Pay", "", token, 0, payload))?;
//! ```

pub mod token;

pub use token::{Token, TokenError, TokenMetadata};
