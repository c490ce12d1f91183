//! Wallet transactions
//!
//! A transaction is a submitted, quorum-gated unit of work. It is never
//! deleted; once executed it no longer changes outcome.

use crate::core::call::TxId;
use crate::core::Address;
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution state of a transaction
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TxStatus {
    /// Not yet executed, no execution attempted
    Pending,
    /// An execution attempt failed; still eligible for another attempt
    Failed,
    /// Executed successfully (terminal)
    Executed,
}

bitflags! {
    /// Which transactions a query selects
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TxFilter: u8 {
        /// Not executed (includes failed attempts)
        const PENDING = 0b0000_0001;
        /// Executed
        const EXECUTED = 0b0000_0010;
    }
}

impl TxFilter {
    /// Build a filter from the pair of include flags
    pub fn from_flags(pending: bool, executed: bool) -> Self {
        let mut filter = TxFilter::empty();
        filter.set(TxFilter::PENDING, pending);
        filter.set(TxFilter::EXECUTED, executed);
        filter
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        (self.contains(TxFilter::PENDING) && !tx.executed)
            || (self.contains(TxFilter::EXECUTED) && tx.executed)
    }
}

/// Paginated id query over a wallet ledger
///
/// Ids are first restricted to `[from, to)`, then filtered, then windowed by
/// `offset`/`limit` over the filtered sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxQuery {
    pub from: TxId,
    pub to: TxId,
    pub filter: TxFilter,
    pub offset: usize,
    pub limit: usize,
}

impl TxQuery {
    /// Every id, filtered, windowed
    pub fn new(filter: TxFilter, offset: usize, limit: usize) -> Self {
        Self {
            from: 0,
            to: TxId::MAX,
            filter,
            offset,
            limit,
        }
    }

    /// Restrict the id range to `[from, to)`
    pub fn range(mut self, from: TxId, to: TxId) -> Self {
        self.from = from;
        self.to = to;
        self
    }
}

/// A submitted action
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub title: String,
    pub description: String,
    /// Target endpoint
    pub destination: Address,
    pub value: u128,
    /// Opaque call payload
    pub data: Vec<u8>,
    pub executed: bool,
    /// Members who confirmed, in confirmation order
    confirmations: Vec<Address>,
    pub submitter: Address,
    pub submitted_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    /// Reason of the most recent failed execution attempt
    pub last_failure: Option<String>,
}

impl Transaction {
    /// New transaction, confirmed by its submitter
    pub fn new(
        id: TxId,
        title: String,
        description: String,
        destination: Address,
        value: u128,
        data: Vec<u8>,
        submitter: Address,
    ) -> Self {
        Self {
            id,
            title,
            description,
            destination,
            value,
            data,
            executed: false,
            confirmations: vec![submitter.clone()],
            submitter,
            submitted_at: Utc::now(),
            executed_at: None,
            last_failure: None,
        }
    }

    pub fn status(&self) -> TxStatus {
        if self.executed {
            TxStatus::Executed
        } else if self.last_failure.is_some() {
            TxStatus::Failed
        } else {
            TxStatus::Pending
        }
    }

    pub fn confirmations(&self) -> &[Address] {
        &self.confirmations
    }

    pub fn confirmation_count(&self) -> usize {
        self.confirmations.len()
    }

    pub fn is_confirmed_by(&self, member: &Address) -> bool {
        self.confirmations.contains(member)
    }

    pub(crate) fn add_confirmation(&mut self, member: Address) {
        self.confirmations.push(member);
    }

    pub(crate) fn remove_confirmation(&mut self, member: &Address) {
        self.confirmations.retain(|m| m != member);
    }

    pub(crate) fn mark_executed(&mut self) {
        self.executed = true;
        self.executed_at = Some(Utc::now());
        self.last_failure = None;
    }

    pub(crate) fn mark_failed(&mut self, reason: String) {
        self.last_failure = Some(reason);
    }
}
