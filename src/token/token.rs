//! Owner-gated fungible token
//!
//! A plain balance ledger used as a call target for wallets. The owner (a
//! wallet) receives the initial supply and is the only identity allowed to
//! mint.

use crate::core::call::TokenCall;
use crate::core::{Address, Event};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Token-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: u128, need: u128 },
    #[error("Invalid amount: amount must be greater than 0")]
    InvalidAmount,
    #[error("Invalid address: cannot transfer to self")]
    SelfTransfer,
    #[error("Invalid recipient: zero address")]
    ZeroRecipient,
    #[error("Invalid symbol: must be 1-10 characters")]
    InvalidSymbol,
    #[error("Invalid name: must be 1-50 characters")]
    InvalidName,
    #[error("Invalid decimals: must be 0-18")]
    InvalidDecimals,
    #[error("Owner is not a contract: {0}")]
    OwnerNotContract(Address),
    #[error("Only the owner may mint, not {0}")]
    NotOwner(Address),
    #[error("Supply overflow")]
    SupplyOverflow,
}

/// Token metadata (immutable after creation)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TokenMetadata {
    /// Token name (e.g., "My Token")
    pub name: String,
    /// Token symbol (e.g., "MTK")
    pub symbol: String,
    /// Decimal places
    pub decimals: u8,
    /// Minting authority
    pub owner: Address,
    pub created_at: DateTime<Utc>,
}

impl TokenMetadata {
    /// Create new token metadata with validation
    pub fn new(name: String, symbol: String, decimals: u8, owner: Address) -> Result<Self, TokenError> {
        if name.is_empty() || name.len() > 50 {
            return Err(TokenError::InvalidName);
        }

        if symbol.is_empty() || symbol.len() > 10 {
            return Err(TokenError::InvalidSymbol);
        }

        if decimals > 18 {
            return Err(TokenError::InvalidDecimals);
        }

        Ok(Self {
            name,
            symbol,
            decimals,
            owner,
            created_at: Utc::now(),
        })
    }
}

/// A mintable fungible token
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Token {
    /// Unique token address
    pub address: Address,
    pub metadata: TokenMetadata,
    total_supply: u128,
    /// Balances: address -> amount
    balances: HashMap<Address, u128>,
}

impl Token {
    /// Create a new token with `initial_supply` allocated to the owner
    pub fn new(address: Address, metadata: TokenMetadata, initial_supply: u128) -> Self {
        let mut balances = HashMap::new();
        if initial_supply > 0 {
            balances.insert(metadata.owner.clone(), initial_supply);
        }

        Self {
            address,
            metadata,
            total_supply: initial_supply,
            balances,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn symbol(&self) -> &str {
        &self.metadata.symbol
    }

    pub fn owner(&self) -> &Address {
        &self.metadata.owner
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    /// Get balance of an address
    pub fn balance_of(&self, address: &Address) -> u128 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Number of addresses holding a non-zero balance
    pub fn holder_count(&self) -> usize {
        self.balances.values().filter(|&&b| b > 0).count()
    }

    /// Move `amount` from `from` to `to`
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<Event, TokenError> {
        if amount == 0 {
            return Err(TokenError::InvalidAmount);
        }
        if to.is_zero() {
            return Err(TokenError::ZeroRecipient);
        }
        if from == to {
            return Err(TokenError::SelfTransfer);
        }

        let from_balance = self.balance_of(from);
        if from_balance < amount {
            return Err(TokenError::InsufficientBalance {
                have: from_balance,
                need: amount,
            });
        }

        *self.balances.entry(from.clone()).or_insert(0) -= amount;
        *self.balances.entry(to.clone()).or_insert(0) += amount;

        Ok(Event::TokenTransfer {
            token: self.address.clone(),
            from: from.clone(),
            to: to.clone(),
            amount,
        })
    }

    /// Create `amount` new tokens for `to`; owner only
    pub fn mint(&mut self, caller: &Address, to: &Address, amount: u128) -> Result<Event, TokenError> {
        if caller != self.owner() {
            return Err(TokenError::NotOwner(caller.clone()));
        }
        if amount == 0 {
            return Err(TokenError::InvalidAmount);
        }
        if to.is_zero() {
            return Err(TokenError::ZeroRecipient);
        }

        self.total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow)?;
        *self.balances.entry(to.clone()).or_insert(0) += amount;

        Ok(Event::TokenMint {
            token: self.address.clone(),
            to: to.clone(),
            amount,
        })
    }

    /// Run a decoded call on behalf of `caller`
    pub fn handle(&mut self, caller: &Address, call: &TokenCall) -> Result<Event, TokenError> {
        match call {
            TokenCall::Transfer { to, amount } => self.transfer(caller, to, *amount),
            TokenCall::Mint { to, amount } => self.mint(caller, to, *amount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Address {
        Address::new("3owner")
    }

    fn create_test_token() -> Token {
        let metadata =
            TokenMetadata::new("Test Token".to_string(), "TST".to_string(), 18, owner()).unwrap();
        Token::new(Address::new("0xtoken"), metadata, 1_000_000)
    }

    #[test]
    fn test_token_creation() {
        let token = create_test_token();

        assert_eq!(token.name(), "Test Token");
        assert_eq!(token.symbol(), "TST");
        assert_eq!(token.total_supply(), 1_000_000);
        assert_eq!(token.balance_of(&owner()), 1_000_000);
        assert_eq!(token.holder_count(), 1);
    }

    #[test]
    fn test_metadata_validation() {
        let meta = |name: &str, symbol: &str, decimals| {
            TokenMetadata::new(name.to_string(), symbol.to_string(), decimals, owner())
        };

        assert!(matches!(meta("", "TST", 18), Err(TokenError::InvalidName)));
        assert!(matches!(meta("Test", "TOOLONGSYMBOL", 18), Err(TokenError::InvalidSymbol)));
        assert!(matches!(meta("Test", "TST", 19), Err(TokenError::InvalidDecimals)));
    }

    #[test]
    fn test_transfer() {
        let mut token = create_test_token();
        let recipient = Address::new("0xrecipient");

        let event = token.transfer(&owner(), &recipient, 1000).unwrap();
        assert!(matches!(event, Event::TokenTransfer { amount: 1000, .. }));
        assert_eq!(token.balance_of(&owner()), 999_000);
        assert_eq!(token.balance_of(&recipient), 1000);
        assert_eq!(token.holder_count(), 2);
    }

    #[test]
    fn test_transfer_rejections() {
        let mut token = create_test_token();
        let recipient = Address::new("0xrecipient");

        assert!(matches!(
            token.transfer(&owner(), &recipient, 2_000_000),
            Err(TokenError::InsufficientBalance { .. })
        ));
        assert_eq!(token.transfer(&owner(), &recipient, 0), Err(TokenError::InvalidAmount));
        assert_eq!(token.transfer(&owner(), &owner(), 100), Err(TokenError::SelfTransfer));
        assert_eq!(
            token.transfer(&owner(), &Address::zero(), 100),
            Err(TokenError::ZeroRecipient)
        );
    }

    #[test]
    fn test_mint_owner_only() {
        let mut token = create_test_token();
        let holder = Address::new("0xholder");

        assert_eq!(
            token.mint(&holder, &holder, 10),
            Err(TokenError::NotOwner(holder.clone()))
        );

        token.mint(&owner(), &holder, 10).unwrap();
        assert_eq!(token.balance_of(&holder), 10);
        assert_eq!(token.total_supply(), 1_000_010);
    }

    #[test]
    fn test_handle_decoded_call() {
        let mut token = create_test_token();
        let holder = Address::new("0xholder");
        let call = TokenCall::decode(
            &TokenCall::Transfer {
                to: holder.clone(),
                amount: 5,
            }
            .encode(),
        )
        .unwrap();

        token.handle(&owner(), &call).unwrap();
        assert_eq!(token.balance_of(&holder), 5);
    }
}
