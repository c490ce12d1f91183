//! Core value types
//!
//! This module contains the building blocks shared by every component:
//! - Addresses (accounts, wallets, registries, tokens)
//! - Call payloads (selector + JSON arguments)
//! - Events and the sequenced event log

pub mod address;
pub mod call;
pub mod event;

pub use address::Address;
pub use call::{AdminAction, RegistryCall, TokenCall, TxId, WalletRequest};
pub use event::{Event, EventLog, EventRecord};
