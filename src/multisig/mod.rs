//! Multi-signature wallets and the registry that creates them
//!
//! A wallet holds an ordered member set and an approval threshold. Members
//! submit transactions, confirm them, and once enough confirmations exist the
//! transaction is executed against its destination. The registry creates
//! wallets and keeps a member -> wallets index that wallets update through
//! callbacks about themselves only.
//!
//! # Example
//!
//! ```ignore
//! use multisig_registry::multisig::{CreateWallet, Proposal, Registry};
//!
//! let mut registry = Registry::new(registry_address, admin.clone());
//! let mut wallet = registry.create(&admin, CreateWallet {
//!     name: "Treasury".into(),
//!     description: "Team funds".into(),
//!     members: vec![alice.clone(), bob.clone(), carol],
//!     required: 2,
//!     seed: None,
//! })?;
//!
//! let id = wallet.submit(&alice, Proposal::new("Rent", "", landlord, 10, vec![]), &[])?;
//! let ready = wallet.confirm(&bob, id)?;
//! ```

pub mod admin;
pub mod registry;
pub mod transaction;
pub mod wallet;

pub use admin::MembershipChange;
pub use registry::{CreateWallet, Registry, WalletInfo};
pub use transaction::{Transaction, TxFilter, TxQuery, TxStatus};
pub use wallet::{
    Dispatch, ExecutionOutcome, MultiSigWallet, MultisigError, Proposal, RegistryDirectory,
    MAX_MEMBERS,
};
