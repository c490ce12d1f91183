//! Multisig Registry: multi-signature wallets with a wallet registry
//!
//! This crate provides:
//! - M-of-N wallets with submit / confirm / revoke / execute
//! - Self-administered membership (add, remove, replace, change requirement)
//! - A registry that creates wallets and indexes them by member
//! - A cross-wallet guard: wallets may only update the registry about themselves
//! - A single-threaded runtime with atomic calls and reentrancy protection
//! - An owner-gated fungible token usable as a call target
//! - JSON persistence, a CLI and a REST/WebSocket API
//!
//! # Example
//!
//! ```rust
//! use multisig_registry::core::Address;
//! use multisig_registry::multisig::{CreateWallet, Proposal};
//! use multisig_registry::runtime::Runtime;
//!
//! let mut runtime = Runtime::new();
//! let (alice, bob) = (Address::new("0xalice"), Address::new("0xbob"));
//!
//! let registry = runtime.deploy_registry(&alice);
//! let wallet = runtime
//!     .create_wallet(&alice, &registry, CreateWallet {
//!         name: "Treasury".to_string(),
//!         description: String::new(),
//!         members: vec![alice.clone(), bob.clone()],
//!         required: 2,
//!         seed: None,
//!     })
//!     .unwrap();
//! runtime.fund(&wallet, 100);
//!
//! let payee = Address::new("0xpayee");
//! let receipt = runtime
//!     .submit(&alice, &wallet, Proposal::new("Pay", "", payee.clone(), 30, vec![]))
//!     .unwrap();
//! assert!(!receipt.executed());
//!
//! let receipt = runtime.confirm(&bob, &wallet, receipt.id).unwrap();
//! assert!(receipt.executed());
//! assert_eq!(runtime.balance_of(&payee), 30);
//! ```

pub mod api;
pub mod cli;
pub mod core;
pub mod crypto;
pub mod multisig;
pub mod runtime;
pub mod storage;
pub mod token;

// Re-export commonly used types
pub use crate::core::{Address, AdminAction, Event, EventRecord, TxId};
pub use crate::multisig::{
    CreateWallet, MultiSigWallet, MultisigError, Proposal, Registry, Transaction, TxFilter,
    TxQuery, TxStatus,
};
pub use crate::runtime::{Endpoint, EndpointContext, Receipt, Runtime, RuntimeError};
pub use crate::storage::{Storage, StorageConfig};
pub use crate::token::{Token, TokenError};
