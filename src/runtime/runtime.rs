//! Hosting environment
//!
//! The runtime owns every piece of state: native balances, registries,
//! wallets, tokens and registered endpoints. It is the only place where calls
//! are dispatched, and it processes one call at a time.

use crate::core::call::TxId;
use crate::core::{Address, Event, EventLog, EventRecord};
use crate::multisig::{
    CreateWallet, ExecutionOutcome, MultiSigWallet, MultisigError, Proposal, Registry,
};
use crate::runtime::dispatch::{Entry, Undo};
use crate::runtime::endpoint::{Endpoint, InvokeError};
use crate::token::{Token, TokenError, TokenMetadata};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors surfaced by runtime entry points
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error(transparent)]
    Multisig(#[from] MultisigError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error("Registry not found: {0}")]
    RegistryNotFound(Address),
    #[error("Token not found: {0}")]
    TokenNotFound(Address),
    #[error("Address already in use: {0}")]
    AddressInUse(Address),
}

/// Result of a submit, confirm or execute call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: TxId,
    /// Set when the call attempted execution
    pub execution: Option<ExecutionOutcome>,
}

impl Receipt {
    /// Whether the call executed the transaction successfully
    pub fn executed(&self) -> bool {
        matches!(self.execution, Some(ExecutionOutcome::Executed))
    }
}

/// Persistent state
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct Ledger {
    pub(crate) balances: HashMap<Address, u128>,
    pub(crate) registries: HashMap<Address, Registry>,
    pub(crate) wallets: HashMap<Address, MultiSigWallet>,
    pub(crate) tokens: HashMap<Address, Token>,
    /// Deployment counter for address generation
    pub(crate) nonce: u64,
}

/// Serialized host for registries, wallets, tokens and endpoints
#[derive(Default, Serialize, Deserialize)]
pub struct Runtime {
    pub(crate) ledger: Ledger,
    pub(crate) events: EventLog,
    /// `None` while the endpoint is running
    #[serde(skip)]
    pub(crate) endpoints: HashMap<Address, Option<Box<dyn Endpoint>>>,
    /// Current call nesting
    #[serde(skip)]
    pub(crate) depth: usize,
    /// Prior values of entries changed by the call in progress
    #[serde(skip)]
    pub(crate) journal: Vec<Undo>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("registries", &self.ledger.registries.len())
            .field("wallets", &self.ledger.wallets.len())
            .field("tokens", &self.ledger.tokens.len())
            .field("endpoints", &self.endpoints.len())
            .field("events", &self.events.len())
            .finish()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_nonce(&mut self) -> u64 {
        let nonce = self.ledger.nonce;
        self.ledger.nonce += 1;
        nonce
    }

    /// Whether `address` is a wallet, registry, token or endpoint
    pub fn is_contract(&self, address: &Address) -> bool {
        self.ledger.wallets.contains_key(address)
            || self.ledger.registries.contains_key(address)
            || self.ledger.tokens.contains_key(address)
            || self.endpoints.contains_key(address)
    }

    fn ensure_free(&self, address: &Address) -> Result<(), RuntimeError> {
        if self.is_contract(address) {
            return Err(RuntimeError::AddressInUse(address.clone()));
        }
        Ok(())
    }

    // =========================================================================
    // Native value
    // =========================================================================

    /// Credit `amount` to `account` out of thin air; returns the new balance
    pub fn fund(&mut self, account: &Address, amount: u128) -> u128 {
        let balance = self.ledger.balances.entry(account.clone()).or_insert(0);
        *balance = balance.saturating_add(amount);
        log::info!("Funded {} with {}", account, amount);
        *balance
    }

    pub fn balance_of(&self, address: &Address) -> u128 {
        self.ledger.balances.get(address).copied().unwrap_or(0)
    }

    /// Plain value transfer
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), RuntimeError> {
        Ok(self.invoke(from, to, amount, &[])?)
    }

    /// Top-level call with an arbitrary payload
    pub fn call(
        &mut self,
        caller: &Address,
        target: &Address,
        value: u128,
        payload: &[u8],
    ) -> Result<(), RuntimeError> {
        Ok(self.invoke(caller, target, value, payload)?)
    }

    // =========================================================================
    // Deployment
    // =========================================================================

    /// Deploy a registry administered by `deployer`
    pub fn deploy_registry(&mut self, deployer: &Address) -> Address {
        let nonce = self.next_nonce();
        let address = Address::from_preimage(format!("{}:registry:{}", deployer, nonce).as_bytes());
        self.ledger
            .registries
            .insert(address.clone(), Registry::new(address.clone(), deployer.clone()));
        log::info!("Registry deployed at {} by {}", address, deployer);
        address
    }

    /// Deploy a wallet that belongs to no registry
    pub fn deploy_wallet(
        &mut self,
        deployer: &Address,
        members: Vec<Address>,
        required: usize,
    ) -> Result<Address, RuntimeError> {
        let address = Address::wallet_from_preimage(
            format!("{}:standalone:{}", deployer, self.ledger.nonce).as_bytes(),
        );
        self.ensure_free(&address)?;

        let wallet = MultiSigWallet::new(address.clone(), members, required, None, deployer.clone())?;
        self.next_nonce();
        log::info!("Wallet {} ({}) deployed by {}", address, wallet.description(), deployer);
        self.ledger.wallets.insert(address.clone(), wallet);
        Ok(address)
    }

    /// Deploy a token owned by the wallet `owner`, which receives `initial_supply`
    pub fn deploy_token(
        &mut self,
        deployer: &Address,
        name: &str,
        symbol: &str,
        decimals: u8,
        owner: &Address,
        initial_supply: u128,
    ) -> Result<Address, RuntimeError> {
        if !self.ledger.wallets.contains_key(owner) {
            return Err(TokenError::OwnerNotContract(owner.clone()).into());
        }
        let metadata = TokenMetadata::new(name.to_string(), symbol.to_string(), decimals, owner.clone())?;

        let nonce = self.next_nonce();
        let address = Address::from_preimage(format!("{}:token:{}", deployer, nonce).as_bytes());
        self.ensure_free(&address)?;

        let token = Token::new(address.clone(), metadata, initial_supply);
        log::info!(
            "Token created: {} ({}) at {}",
            token.name(),
            token.symbol(),
            address
        );
        self.ledger.tokens.insert(address.clone(), token);

        if initial_supply > 0 {
            self.events.push(Event::TokenMint {
                token: address.clone(),
                to: owner.clone(),
                amount: initial_supply,
            });
        }
        Ok(address)
    }

    /// Register an external endpoint under `address`
    pub fn register_endpoint(
        &mut self,
        address: Address,
        endpoint: Box<dyn Endpoint>,
    ) -> Result<(), RuntimeError> {
        self.ensure_free(&address)?;
        log::info!("Endpoint registered at {}", address);
        self.endpoints.insert(address, Some(endpoint));
        Ok(())
    }

    // =========================================================================
    // Registry operations
    // =========================================================================

    /// Create a wallet through `registry`
    pub fn create_wallet(
        &mut self,
        caller: &Address,
        registry: &Address,
        request: CreateWallet,
    ) -> Result<Address, RuntimeError> {
        let address = self.registry(registry)?.next_address(caller, request.seed);
        self.ensure_free(&address)?;

        let wallet = self.registry_mut(registry)?.create(caller, request)?;
        self.ledger.wallets.insert(address.clone(), wallet);
        self.events.push(Event::ContractInstantiation {
            registry: registry.clone(),
            wallet: address.clone(),
            creator: caller.clone(),
        });
        Ok(address)
    }

    pub fn change_name(
        &mut self,
        caller: &Address,
        registry: &Address,
        wallet: &Address,
        name: &str,
    ) -> Result<(), RuntimeError> {
        self.registry_mut(registry)?
            .change_name(caller, wallet, name.to_string())?;
        self.events.push(Event::ChangedName {
            registry: registry.clone(),
            wallet: wallet.clone(),
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn change_description(
        &mut self,
        caller: &Address,
        registry: &Address,
        wallet: &Address,
        description: &str,
    ) -> Result<(), RuntimeError> {
        self.registry_mut(registry)?
            .change_description(caller, wallet, description.to_string())?;
        self.events.push(Event::ChangedDescription {
            registry: registry.clone(),
            wallet: wallet.clone(),
            description: description.to_string(),
        });
        Ok(())
    }

    // =========================================================================
    // Wallet operations
    // =========================================================================

    /// Submit a transaction; executes right away when the submitter alone
    /// meets the threshold
    pub fn submit(
        &mut self,
        caller: &Address,
        wallet: &Address,
        proposal: Proposal,
    ) -> Result<Receipt, RuntimeError> {
        Ok(self.submit_as(caller, wallet, proposal)?)
    }

    /// Confirm a transaction; executes it when this confirmation reaches quorum
    pub fn confirm(&mut self, caller: &Address, wallet: &Address, id: TxId) -> Result<Receipt, RuntimeError> {
        Ok(self.confirm_as(caller, wallet, id)?)
    }

    pub fn revoke(&mut self, caller: &Address, wallet: &Address, id: TxId) -> Result<(), RuntimeError> {
        Ok(self.revoke_as(caller, wallet, id)?)
    }

    /// Explicitly execute a transaction that has quorum; any caller may do so
    pub fn execute(&mut self, caller: &Address, wallet: &Address, id: TxId) -> Result<Receipt, RuntimeError> {
        Ok(self.execute_as(caller, wallet, id)?)
    }

    pub(crate) fn submit_as(
        &mut self,
        caller: &Address,
        wallet: &Address,
        proposal: Proposal,
    ) -> Result<Receipt, MultisigError> {
        self.touch(Entry::Wallet, wallet);
        let ledger = &mut self.ledger;
        let w = ledger
            .wallets
            .get_mut(wallet)
            .ok_or_else(|| MultisigError::WalletNotFound(wallet.clone()))?;
        let id = w.submit(caller, proposal, &ledger.registries)?;
        let ready = w.executing().is_none() && w.is_confirmed(id);

        self.events.push(Event::Submission {
            wallet: wallet.clone(),
            id,
        });
        self.events.push(Event::Confirmation {
            wallet: wallet.clone(),
            id,
            member: caller.clone(),
        });

        let execution = if ready {
            Some(self.attempt_execution(wallet, id)?)
        } else {
            None
        };
        Ok(Receipt { id, execution })
    }

    pub(crate) fn confirm_as(
        &mut self,
        caller: &Address,
        wallet: &Address,
        id: TxId,
    ) -> Result<Receipt, MultisigError> {
        let ready = self.wallet_mut(wallet)?.confirm(caller, id)?;
        self.events.push(Event::Confirmation {
            wallet: wallet.clone(),
            id,
            member: caller.clone(),
        });

        let execution = if ready {
            Some(self.attempt_execution(wallet, id)?)
        } else {
            None
        };
        Ok(Receipt { id, execution })
    }

    pub(crate) fn revoke_as(&mut self, caller: &Address, wallet: &Address, id: TxId) -> Result<(), MultisigError> {
        self.wallet_mut(wallet)?.revoke(caller, id)?;
        self.events.push(Event::Revocation {
            wallet: wallet.clone(),
            id,
            member: caller.clone(),
        });
        Ok(())
    }

    pub(crate) fn execute_as(
        &mut self,
        caller: &Address,
        wallet: &Address,
        id: TxId,
    ) -> Result<Receipt, MultisigError> {
        log::debug!("{} requested execution of #{} on {}", caller, id, wallet);
        let outcome = self.attempt_execution(wallet, id)?;
        Ok(Receipt {
            id,
            execution: Some(outcome),
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn registry(&self, address: &Address) -> Result<&Registry, RuntimeError> {
        self.ledger
            .registries
            .get(address)
            .ok_or_else(|| RuntimeError::RegistryNotFound(address.clone()))
    }

    fn registry_mut(&mut self, address: &Address) -> Result<&mut Registry, RuntimeError> {
        self.touch(Entry::Registry, address);
        self.ledger
            .registries
            .get_mut(address)
            .ok_or_else(|| RuntimeError::RegistryNotFound(address.clone()))
    }

    pub fn wallet(&self, address: &Address) -> Result<&MultiSigWallet, RuntimeError> {
        self.ledger
            .wallets
            .get(address)
            .ok_or_else(|| MultisigError::WalletNotFound(address.clone()).into())
    }

    pub(crate) fn wallet_mut(&mut self, address: &Address) -> Result<&mut MultiSigWallet, MultisigError> {
        self.touch(Entry::Wallet, address);
        self.ledger
            .wallets
            .get_mut(address)
            .ok_or_else(|| MultisigError::WalletNotFound(address.clone()))
    }

    pub fn token(&self, address: &Address) -> Result<&Token, RuntimeError> {
        self.ledger
            .tokens
            .get(address)
            .ok_or_else(|| RuntimeError::TokenNotFound(address.clone()))
    }

    pub fn registries(&self) -> impl Iterator<Item = &Registry> {
        self.ledger.registries.values()
    }

    pub fn wallets(&self) -> impl Iterator<Item = &MultiSigWallet> {
        self.ledger.wallets.values()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.ledger.tokens.values()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Event records after sequence number `seq`
    pub fn events_since(&self, seq: u64) -> &[EventRecord] {
        self.events.since(seq)
    }
}
