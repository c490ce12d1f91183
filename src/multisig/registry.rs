//! Wallet registry
//!
//! Creates wallets, keeps their display metadata and maintains the reverse
//! index from member to wallets. Wallets report their own membership changes
//! back through [`Registry::add_member`] / [`Registry::remove_member`]; a
//! caller may only ever report changes about itself.

use crate::core::call::RegistryCall;
use crate::core::Address;
use crate::multisig::wallet::{MultiSigWallet, MultisigError, RegistryDirectory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Registry entry for one wallet
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletInfo {
    pub wallet: Address,
    pub name: String,
    pub description: String,
    pub creator: Address,
    pub created_at: DateTime<Utc>,
}

/// Parameters for [`Registry::create`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateWallet {
    pub name: String,
    pub description: String,
    pub members: Vec<Address>,
    pub required: usize,
    /// Makes the wallet address predictable before creation
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Registry of wallets and their members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    /// Registry identity
    pub address: Address,
    /// Deploying identity; the only caller allowed to edit metadata
    pub admin: Address,
    /// Entries by wallet address
    entries: HashMap<Address, WalletInfo>,
    /// Wallets in creation order
    wallets: Vec<Address>,
    /// Member -> wallets, in insertion order
    member_index: HashMap<Address, Vec<Address>>,
    /// Counter for unseeded wallet addresses
    nonce: u64,
    pub created_at: DateTime<Utc>,
}

impl Registry {
    /// Create an empty registry
    pub fn new(address: Address, admin: Address) -> Self {
        Self {
            address,
            admin,
            entries: HashMap::new(),
            wallets: Vec::new(),
            member_index: HashMap::new(),
            nonce: 0,
            created_at: Utc::now(),
        }
    }

    /// Address a seeded [`Registry::create`] by `creator` will produce
    pub fn predict_address(&self, creator: &Address, seed: u64) -> Address {
        let preimage = format!("{}:{}:seed:{}", self.address, creator, seed);
        Address::wallet_from_preimage(preimage.as_bytes())
    }

    /// Address the next creation by `creator` will produce
    pub fn next_address(&self, creator: &Address, seed: Option<u64>) -> Address {
        match seed {
            Some(seed) => self.predict_address(creator, seed),
            None => {
                let preimage = format!("{}:nonce:{}", self.address, self.nonce);
                Address::wallet_from_preimage(preimage.as_bytes())
            }
        }
    }

    /// Create a new wallet, record its entry and index its members
    pub fn create(
        &mut self,
        creator: &Address,
        request: CreateWallet,
    ) -> Result<MultiSigWallet, MultisigError> {
        let address = self.next_address(creator, request.seed);
        if self.entries.contains_key(&address) {
            return Err(MultisigError::InvalidParameter(format!(
                "wallet {} already exists",
                address
            )));
        }

        let wallet = MultiSigWallet::new(
            address.clone(),
            request.members,
            request.required,
            Some(self.address.clone()),
            creator.clone(),
        )?;

        self.entries.insert(
            address.clone(),
            WalletInfo {
                wallet: address.clone(),
                name: request.name,
                description: request.description,
                creator: creator.clone(),
                created_at: wallet.created_at,
            },
        );
        self.wallets.push(address.clone());
        for member in wallet.members() {
            self.index_member(member, &address);
        }
        self.nonce += 1;

        log::info!(
            "Registry {} created wallet {} ({}) for {}",
            self.address,
            address,
            wallet.description(),
            creator
        );

        Ok(wallet)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn wallet_info(&self, wallet: &Address) -> Result<&WalletInfo, MultisigError> {
        self.entries
            .get(wallet)
            .ok_or_else(|| MultisigError::WalletNotFound(wallet.clone()))
    }

    pub fn is_registered(&self, wallet: &Address) -> bool {
        self.entries.contains_key(wallet)
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    /// All wallets in creation order
    pub fn wallets(&self) -> Vec<&WalletInfo> {
        self.wallets
            .iter()
            .filter_map(|w| self.entries.get(w))
            .collect()
    }

    pub fn number_of_wallets_for_member(&self, member: &Address) -> usize {
        self.member_index.get(member).map_or(0, Vec::len)
    }

    /// Window `[offset, offset + limit)` of the wallets `member` belongs to
    pub fn wallets_for_member(&self, member: &Address, offset: usize, limit: usize) -> Vec<WalletInfo> {
        self.member_index
            .get(member)
            .map(|wallets| {
                wallets
                    .iter()
                    .skip(offset)
                    .take(limit)
                    .filter_map(|w| self.entries.get(w).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    // =========================================================================
    // Administration
    // =========================================================================

    fn require_admin(&self, caller: &Address) -> Result<(), MultisigError> {
        if *caller != self.admin {
            return Err(MultisigError::Unauthorized(format!(
                "{} is not the administrator of registry {}",
                caller, self.address
            )));
        }
        Ok(())
    }

    pub fn change_name(
        &mut self,
        caller: &Address,
        wallet: &Address,
        name: String,
    ) -> Result<(), MultisigError> {
        self.require_admin(caller)?;
        let entry = self
            .entries
            .get_mut(wallet)
            .ok_or_else(|| MultisigError::WalletNotFound(wallet.clone()))?;
        entry.name = name;
        Ok(())
    }

    pub fn change_description(
        &mut self,
        caller: &Address,
        wallet: &Address,
        description: String,
    ) -> Result<(), MultisigError> {
        self.require_admin(caller)?;
        let entry = self
            .entries
            .get_mut(wallet)
            .ok_or_else(|| MultisigError::WalletNotFound(wallet.clone()))?;
        entry.description = description;
        Ok(())
    }

    // =========================================================================
    // Wallet callbacks
    // =========================================================================

    /// Only the wallet itself may report changes about itself
    fn require_self_report(&self, caller: &Address, wallet: &Address) -> Result<(), MultisigError> {
        if caller != wallet {
            log::warn!(
                "Registry {} rejected callback from {} about {}",
                self.address,
                caller,
                wallet
            );
            return Err(MultisigError::Unauthorized(format!(
                "{} cannot report membership changes of {}",
                caller, wallet
            )));
        }
        if !self.is_registered(wallet) {
            return Err(MultisigError::WalletNotFound(wallet.clone()));
        }
        Ok(())
    }

    /// Callback: `member` joined `wallet`
    pub fn add_member(
        &mut self,
        caller: &Address,
        member: &Address,
        wallet: &Address,
    ) -> Result<(), MultisigError> {
        self.require_self_report(caller, wallet)?;
        if self
            .member_index
            .get(member)
            .is_some_and(|wallets| wallets.contains(wallet))
        {
            return Err(MultisigError::InvalidParameter(format!(
                "{} is already indexed for {}",
                member, wallet
            )));
        }
        self.index_member(member, wallet);
        Ok(())
    }

    /// Callback: `member` left `wallet`
    pub fn remove_member(
        &mut self,
        caller: &Address,
        member: &Address,
        wallet: &Address,
    ) -> Result<(), MultisigError> {
        self.require_self_report(caller, wallet)?;
        let wallets = self
            .member_index
            .get_mut(member)
            .filter(|wallets| wallets.contains(wallet))
            .ok_or_else(|| {
                MultisigError::InvalidParameter(format!("{} is not indexed for {}", member, wallet))
            })?;

        // Order of the remaining entries is preserved
        wallets.retain(|w| w != wallet);
        if wallets.is_empty() {
            self.member_index.remove(member);
        }
        Ok(())
    }

    /// Dispatch a decoded callback
    pub fn handle(&mut self, caller: &Address, call: &RegistryCall) -> Result<(), MultisigError> {
        match call {
            RegistryCall::AddMember { member, wallet } => self.add_member(caller, member, wallet),
            RegistryCall::RemoveMember { member, wallet } => {
                self.remove_member(caller, member, wallet)
            }
        }
    }

    fn index_member(&mut self, member: &Address, wallet: &Address) {
        self.member_index
            .entry(member.clone())
            .or_default()
            .push(wallet.clone());
    }
}

impl RegistryDirectory for HashMap<Address, Registry> {
    fn is_registry(&self, address: &Address) -> bool {
        self.contains_key(address)
    }
}
