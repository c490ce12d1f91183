//! Multi-signature wallet core
//!
//! Owns one member set, one approval threshold and an append-only ledger of
//! submitted transactions. Execution is split in two halves so the hosting
//! runtime can perform the external call between them without holding a
//! borrow of the wallet:
//!
//! 1. [`MultiSigWallet::begin_execution`] re-checks quorum against the
//!    *current* threshold, arms the in-flight guard and hands back what to run;
//! 2. [`MultiSigWallet::finish_execution`] disarms the guard and records the
//!    outcome.

use crate::core::call::{AdminAction, RegistryCall, TxId};
use crate::core::Address;
use crate::multisig::transaction::{Transaction, TxFilter, TxQuery};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of members a wallet may have
pub const MAX_MEMBERS: usize = 50;

/// Errors related to multisig operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MultisigError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TxId),
    #[error("Transaction {0} already confirmed by this member")]
    AlreadyConfirmed(TxId),
    #[error("Transaction {0} not confirmed by this member")]
    NotConfirmed(TxId),
    #[error("Transaction {0} already executed")]
    AlreadyExecuted(TxId),
    #[error("Insufficient confirmations: have {have}, need {need}")]
    InsufficientConfirmations { have: usize, need: usize },
    #[error("Invalid destination: {0}")]
    InvalidDestination(Address),
    #[error("Invalid function call: member-mutating registry calls cannot be submitted")]
    InvalidFunctionCall,
    #[error("Reentrant call: transaction {0} is being executed")]
    ReentrantCall(TxId),
    #[error("Wallet not found: {0}")]
    WalletNotFound(Address),
}

/// Tells the submit guard which addresses are registries
pub trait RegistryDirectory {
    fn is_registry(&self, address: &Address) -> bool;
}

impl RegistryDirectory for [Address] {
    fn is_registry(&self, address: &Address) -> bool {
        self.contains(address)
    }
}

/// A transaction as proposed by a member
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub title: String,
    pub description: String,
    pub destination: Address,
    pub value: u128,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl Proposal {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        destination: Address,
        value: u128,
        data: Vec<u8>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            destination,
            value,
            data,
        }
    }
}

/// What the runtime has to run for an armed execution
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Membership protocol, applied directly to the wallet
    Admin(AdminAction),
    /// External call
    Invoke {
        destination: Address,
        value: u128,
        data: Vec<u8>,
    },
}

/// Result of an execution attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    Executed,
    Failed(String),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Executed)
    }
}

/// A multi-signature wallet
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MultiSigWallet {
    /// Wallet identity
    pub address: Address,
    /// Members in insertion order
    members: Vec<Address>,
    /// Confirmations needed to execute
    required: usize,
    /// Registry that created this wallet, if any
    registry: Option<Address>,
    pub creator: Address,
    /// Ledger; transaction `id` lives at index `id - 1`
    transactions: Vec<Transaction>,
    pub created_at: DateTime<Utc>,
    /// In-flight guard
    #[serde(skip)]
    executing: Option<TxId>,
}

impl MultiSigWallet {
    /// Create a wallet with a validated initial member set
    pub fn new(
        address: Address,
        members: Vec<Address>,
        required: usize,
        registry: Option<Address>,
        creator: Address,
    ) -> Result<Self, MultisigError> {
        validate_members(&members)?;
        validate_requirement(members.len(), required)?;

        Ok(Self {
            address,
            members,
            required,
            registry,
            creator,
            transactions: Vec::new(),
            created_at: Utc::now(),
            executing: None,
        })
    }

    pub fn members(&self) -> &[Address] {
        &self.members
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn registry(&self) -> Option<&Address> {
        self.registry.as_ref()
    }

    pub fn is_member(&self, address: &Address) -> bool {
        self.members.contains(address)
    }

    /// Description like "2-of-3"
    pub fn description(&self) -> String {
        format!("{}-of-{}", self.required, self.members.len())
    }

    /// Id that the next submission will receive
    pub fn next_id(&self) -> TxId {
        self.transactions.len() as TxId + 1
    }

    /// Transaction currently in flight, if any
    pub fn executing(&self) -> Option<TxId> {
        self.executing
    }

    fn require_member(&self, caller: &Address) -> Result<(), MultisigError> {
        if self.is_member(caller) {
            Ok(())
        } else {
            Err(MultisigError::Unauthorized(format!(
                "{} is not a member of {}",
                caller, self.address
            )))
        }
    }

    fn require_idle(&self) -> Result<(), MultisigError> {
        match self.executing {
            Some(id) => Err(MultisigError::ReentrantCall(id)),
            None => Ok(()),
        }
    }

    fn index(&self, id: TxId) -> Result<usize, MultisigError> {
        if id == 0 || id > self.transactions.len() as TxId {
            return Err(MultisigError::TransactionNotFound(id));
        }
        Ok((id - 1) as usize)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Submit a new transaction, confirmed by the submitter
    ///
    /// Rejects destinations that would let this wallet reach a registry's
    /// member-mutating callbacks through an ordinary transaction.
    pub fn submit<R: RegistryDirectory + ?Sized>(
        &mut self,
        caller: &Address,
        proposal: Proposal,
        registries: &R,
    ) -> Result<TxId, MultisigError> {
        self.require_member(caller)?;

        if proposal.destination.is_zero() {
            return Err(MultisigError::InvalidParameter(
                "destination must not be the zero address".to_string(),
            ));
        }

        if self.registry.as_ref() == Some(&proposal.destination) {
            return Err(MultisigError::InvalidDestination(proposal.destination));
        }

        if registries.is_registry(&proposal.destination)
            && RegistryCall::is_member_mutation(&proposal.data)
        {
            return Err(MultisigError::InvalidFunctionCall);
        }

        let id = self.next_id();
        self.transactions.push(Transaction::new(
            id,
            proposal.title,
            proposal.description,
            proposal.destination,
            proposal.value,
            proposal.data,
            caller.clone(),
        ));

        log::debug!("Wallet {} accepted submission #{} from {}", self.address, id, caller);
        Ok(id)
    }

    /// Record a confirmation
    ///
    /// Returns `true` when the transaction has reached quorum and is not yet
    /// executed, i.e. the caller should attempt execution now. Confirmations
    /// of an executed transaction are still recorded but never re-execute it.
    pub fn confirm(&mut self, caller: &Address, id: TxId) -> Result<bool, MultisigError> {
        self.require_member(caller)?;
        let index = self.index(id)?;
        self.require_idle()?;

        let required = self.required;
        let tx = &mut self.transactions[index];
        if tx.is_confirmed_by(caller) {
            return Err(MultisigError::AlreadyConfirmed(id));
        }

        tx.add_confirmation(caller.clone());
        Ok(!tx.executed && tx.confirmation_count() >= required)
    }

    /// Withdraw a confirmation from a not yet executed transaction
    pub fn revoke(&mut self, caller: &Address, id: TxId) -> Result<(), MultisigError> {
        self.require_member(caller)?;
        let index = self.index(id)?;
        self.require_idle()?;

        let tx = &mut self.transactions[index];
        if !tx.is_confirmed_by(caller) {
            return Err(MultisigError::NotConfirmed(id));
        }
        if tx.executed {
            return Err(MultisigError::AlreadyExecuted(id));
        }

        tx.remove_confirmation(caller);
        Ok(())
    }

    /// Arm the in-flight guard for `id` and return what to run
    ///
    /// Quorum is evaluated against the current threshold, so a transaction
    /// that was under quorum at submission becomes executable once `required`
    /// is lowered.
    pub fn begin_execution(&mut self, id: TxId) -> Result<Dispatch, MultisigError> {
        let index = self.index(id)?;
        self.require_idle()?;

        let tx = &self.transactions[index];
        if tx.executed {
            return Err(MultisigError::AlreadyExecuted(id));
        }
        if tx.confirmation_count() < self.required {
            return Err(MultisigError::InsufficientConfirmations {
                have: tx.confirmation_count(),
                need: self.required,
            });
        }

        let dispatch = match AdminAction::decode(&tx.data) {
            Some(action) if tx.destination == self.address => Dispatch::Admin(action),
            _ => Dispatch::Invoke {
                destination: tx.destination.clone(),
                value: tx.value,
                data: tx.data.clone(),
            },
        };

        self.executing = Some(id);
        Ok(dispatch)
    }

    /// Disarm the guard and record the outcome of the attempt
    pub fn finish_execution(&mut self, id: TxId, result: Result<(), String>) -> ExecutionOutcome {
        if self.executing == Some(id) {
            self.executing = None;
        }

        let Some(tx) = id
            .checked_sub(1)
            .and_then(|i| self.transactions.get_mut(i as usize))
        else {
            return ExecutionOutcome::Failed(format!("transaction {} not found", id));
        };

        match result {
            Ok(()) => {
                tx.mark_executed();
                ExecutionOutcome::Executed
            }
            Err(reason) => {
                tx.mark_failed(reason.clone());
                ExecutionOutcome::Failed(reason)
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn transaction(&self, id: TxId) -> Result<&Transaction, MultisigError> {
        let index = self.index(id)?;
        Ok(&self.transactions[index])
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Number of transactions selected by `filter`
    pub fn transaction_count(&self, filter: TxFilter) -> usize {
        self.transactions.iter().filter(|tx| filter.matches(tx)).count()
    }

    pub fn confirmations(&self, id: TxId) -> Result<&[Address], MultisigError> {
        Ok(self.transaction(id)?.confirmations())
    }

    pub fn confirmation_count(&self, id: TxId) -> Result<usize, MultisigError> {
        Ok(self.transaction(id)?.confirmation_count())
    }

    /// Whether `id` has reached quorum under the current threshold
    pub fn is_confirmed(&self, id: TxId) -> bool {
        self.transaction(id)
            .map(|tx| tx.confirmation_count() >= self.required)
            .unwrap_or(false)
    }

    /// Ascending ids selected by `query`
    pub fn transaction_ids(&self, query: &TxQuery) -> Vec<TxId> {
        self.transactions
            .iter()
            .filter(|tx| tx.id >= query.from && tx.id < query.to)
            .filter(|tx| query.filter.matches(tx))
            .skip(query.offset)
            .take(query.limit)
            .map(|tx| tx.id)
            .collect()
    }

    // =========================================================================
    // Membership state, used by the admin protocol
    // =========================================================================

    pub(crate) fn members_mut(&mut self) -> &mut Vec<Address> {
        &mut self.members
    }

    pub(crate) fn set_required(&mut self, required: usize) {
        self.required = required;
    }

    /// Snapshot of the membership state, for rollback
    pub(crate) fn membership(&self) -> (Vec<Address>, usize) {
        (self.members.clone(), self.required)
    }

    pub(crate) fn restore_membership(&mut self, snapshot: (Vec<Address>, usize)) {
        self.members = snapshot.0;
        self.required = snapshot.1;
    }
}

/// Check a member list: non-empty, bounded, no zero or duplicate identities
pub(crate) fn validate_members(members: &[Address]) -> Result<(), MultisigError> {
    if members.is_empty() {
        return Err(MultisigError::InvalidParameter(
            "at least one member is required".to_string(),
        ));
    }

    if members.len() > MAX_MEMBERS {
        return Err(MultisigError::InvalidParameter(format!(
            "member count {} exceeds maximum {}",
            members.len(),
            MAX_MEMBERS
        )));
    }

    for (i, member) in members.iter().enumerate() {
        if member.is_zero() {
            return Err(MultisigError::InvalidParameter(
                "member must not be the zero address".to_string(),
            ));
        }
        if members[..i].contains(member) {
            return Err(MultisigError::InvalidParameter(format!(
                "duplicate member {}",
                member
            )));
        }
    }

    Ok(())
}

/// Check `1 <= required <= member_count`
pub(crate) fn validate_requirement(member_count: usize, required: usize) -> Result<(), MultisigError> {
    if required == 0 || required > member_count {
        return Err(MultisigError::InvalidParameter(format!(
            "required {} must be between 1 and {}",
            required, member_count
        )));
    }
    Ok(())
}
