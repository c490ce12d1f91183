//! Observable events
//!
//! Events are signals for external watchers (CLI, WebSocket subscribers);
//! nothing inside the engine reads them back for control flow.

use crate::core::call::TxId;
use crate::core::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Something that happened inside the runtime
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    Deposit {
        wallet: Address,
        sender: Address,
        value: u128,
    },
    Submission {
        wallet: Address,
        id: TxId,
    },
    Confirmation {
        wallet: Address,
        id: TxId,
        member: Address,
    },
    Revocation {
        wallet: Address,
        id: TxId,
        member: Address,
    },
    Execution {
        wallet: Address,
        id: TxId,
    },
    ExecutionFailure {
        wallet: Address,
        id: TxId,
        reason: String,
    },
    MemberAddition {
        wallet: Address,
        member: Address,
    },
    MemberRemoval {
        wallet: Address,
        member: Address,
    },
    RequirementChange {
        wallet: Address,
        required: usize,
    },
    ContractInstantiation {
        registry: Address,
        wallet: Address,
        creator: Address,
    },
    ChangedName {
        registry: Address,
        wallet: Address,
        name: String,
    },
    ChangedDescription {
        registry: Address,
        wallet: Address,
        description: String,
    },
    TokenTransfer {
        token: Address,
        from: Address,
        to: Address,
        amount: u128,
    },
    TokenMint {
        token: Address,
        to: Address,
        amount: u128,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Deposit { wallet, sender, value } => {
                write!(f, "Deposit of {} into {} from {}", value, wallet, sender)
            }
            Event::Submission { wallet, id } => write!(f, "Submission #{} on {}", id, wallet),
            Event::Confirmation { wallet, id, member } => {
                write!(f, "Confirmation #{} on {} by {}", id, wallet, member)
            }
            Event::Revocation { wallet, id, member } => {
                write!(f, "Revocation #{} on {} by {}", id, wallet, member)
            }
            Event::Execution { wallet, id } => write!(f, "Execution #{} on {}", id, wallet),
            Event::ExecutionFailure { wallet, id, reason } => {
                write!(f, "ExecutionFailure #{} on {}: {}", id, wallet, reason)
            }
            Event::MemberAddition { wallet, member } => {
                write!(f, "MemberAddition {} to {}", member, wallet)
            }
            Event::MemberRemoval { wallet, member } => {
                write!(f, "MemberRemoval {} from {}", member, wallet)
            }
            Event::RequirementChange { wallet, required } => {
                write!(f, "RequirementChange on {} to {}", wallet, required)
            }
            Event::ContractInstantiation {
                registry,
                wallet,
                creator,
            } => write!(
                f,
                "ContractInstantiation of {} by {} via {}",
                wallet, creator, registry
            ),
            Event::ChangedName { wallet, name, .. } => {
                write!(f, "ChangedName of {} to {:?}", wallet, name)
            }
            Event::ChangedDescription {
                wallet,
                description,
                ..
            } => write!(f, "ChangedDescription of {} to {:?}", wallet, description),
            Event::TokenTransfer {
                token,
                from,
                to,
                amount,
            } => write!(f, "TokenTransfer of {} {} from {} to {}", amount, token, from, to),
            Event::TokenMint { token, to, amount } => {
                write!(f, "TokenMint of {} {} to {}", amount, token, to)
            }
        }
    }
}

/// An event with its position in the global order
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventRecord {
    /// Sequence number, starting at 1
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

/// Append-only, sequenced event log
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return its sequence number
    pub fn push(&mut self, event: Event) -> u64 {
        let seq = self.records.len() as u64 + 1;
        log::info!("{}", event);
        self.records.push(EventRecord {
            seq,
            timestamp: Utc::now(),
            event,
        });
        seq
    }

    /// Records with a sequence number strictly greater than `seq`
    pub fn since(&self, seq: u64) -> &[EventRecord] {
        let start = (seq as usize).min(self.records.len());
        &self.records[start..]
    }

    /// The last `count` records
    pub fn latest(&self, count: usize) -> &[EventRecord] {
        let start = self.records.len().saturating_sub(count);
        &self.records[start..]
    }

    /// Drop every record after the first `len`
    pub(crate) fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
    }

    pub fn last_seq(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.records.iter().map(|r| &r.event)
    }
}
