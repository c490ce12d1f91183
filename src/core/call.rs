//! Call payload codec
//!
//! A payload is opaque bytes to the wallet core, but the runtime and the
//! submit guard need to recognise a handful of calls. The layout is
//!
//! ```text
//! selector (4 bytes, SHA-256 of the signature) || JSON argument tuple
//! ```
//!
//! An empty payload is a plain value transfer. Decoding never fails loudly:
//! unknown selectors or malformed arguments simply decode to `None`.

use crate::core::Address;
use crate::crypto::hash::{selector, SELECTOR_LEN};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Transaction id inside a wallet's ledger
pub type TxId = u64;

pub const SIG_ADD_MEMBER: &str = "addMember(address)";
pub const SIG_REMOVE_MEMBER: &str = "removeMember(address)";
pub const SIG_REPLACE_MEMBER: &str = "replaceMember(address,address)";
pub const SIG_CHANGE_REQUIREMENT: &str = "changeRequirement(uint256)";

pub const SIG_SUBMIT: &str = "submitTransaction(string,string,address,uint256,bytes)";
pub const SIG_CONFIRM: &str = "confirmTransaction(uint256)";
pub const SIG_REVOKE: &str = "revokeConfirmation(uint256)";
pub const SIG_EXECUTE: &str = "executeTransaction(uint256)";

pub const SIG_REGISTRY_ADD_MEMBER: &str = "addMember(address,address)";
pub const SIG_REGISTRY_REMOVE_MEMBER: &str = "removeMember(address,address)";

pub const SIG_TOKEN_TRANSFER: &str = "transfer(address,uint256)";
pub const SIG_TOKEN_MINT: &str = "mint(address,uint256)";

/// Encode a call as `selector || json(args)`
pub fn encode<A: Serialize>(signature: &str, args: &A) -> Vec<u8> {
    let mut payload = selector(signature).to_vec();
    // Tuples of addresses, integers and strings always serialize
    payload.extend(serde_json::to_vec(args).unwrap_or_default());
    payload
}

/// Split a payload into selector and argument bytes
pub fn split(payload: &[u8]) -> Option<([u8; SELECTOR_LEN], &[u8])> {
    if payload.len() < SELECTOR_LEN {
        return None;
    }
    let mut sel = [0u8; SELECTOR_LEN];
    sel.copy_from_slice(&payload[..SELECTOR_LEN]);
    Some((sel, &payload[SELECTOR_LEN..]))
}

/// Decode the arguments of `payload` if it carries `signature`
fn decode_args<A: DeserializeOwned>(payload: &[u8], signature: &str) -> Option<A> {
    let (sel, args) = split(payload)?;
    if sel != selector(signature) {
        return None;
    }
    serde_json::from_slice(args).ok()
}

/// Whether `payload` starts with the selector of `signature`
pub fn has_selector(payload: &[u8], signature: &str) -> bool {
    matches!(split(payload), Some((sel, _)) if sel == selector(signature))
}

/// Membership-protocol calls a wallet may only make against itself
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminAction {
    AddMember { member: Address },
    RemoveMember { member: Address },
    ReplaceMember { member: Address, new_member: Address },
    ChangeRequirement { required: usize },
}

impl AdminAction {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            AdminAction::AddMember { member } => encode(SIG_ADD_MEMBER, &(member,)),
            AdminAction::RemoveMember { member } => encode(SIG_REMOVE_MEMBER, &(member,)),
            AdminAction::ReplaceMember { member, new_member } => {
                encode(SIG_REPLACE_MEMBER, &(member, new_member))
            }
            AdminAction::ChangeRequirement { required } => {
                encode(SIG_CHANGE_REQUIREMENT, &(required,))
            }
        }
    }

    pub fn decode(payload: &[u8]) -> Option<Self> {
        if let Some((member,)) = decode_args(payload, SIG_ADD_MEMBER) {
            return Some(AdminAction::AddMember { member });
        }
        if let Some((member,)) = decode_args(payload, SIG_REMOVE_MEMBER) {
            return Some(AdminAction::RemoveMember { member });
        }
        if let Some((member, new_member)) = decode_args(payload, SIG_REPLACE_MEMBER) {
            return Some(AdminAction::ReplaceMember { member, new_member });
        }
        decode_args(payload, SIG_CHANGE_REQUIREMENT)
            .map(|(required,)| AdminAction::ChangeRequirement { required })
    }
}

/// Wallet entry points reachable through a payload, so that a wallet (or any
/// endpoint) can act as a member of another wallet
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletRequest {
    Submit {
        title: String,
        description: String,
        destination: Address,
        value: u128,
        data: Vec<u8>,
    },
    Confirm { id: TxId },
    Revoke { id: TxId },
    Execute { id: TxId },
}

impl WalletRequest {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            WalletRequest::Submit {
                title,
                description,
                destination,
                value,
                data,
            } => encode(
                SIG_SUBMIT,
                &(title, description, destination, value, hex::encode(data)),
            ),
            WalletRequest::Confirm { id } => encode(SIG_CONFIRM, &(id,)),
            WalletRequest::Revoke { id } => encode(SIG_REVOKE, &(id,)),
            WalletRequest::Execute { id } => encode(SIG_EXECUTE, &(id,)),
        }
    }

    pub fn decode(payload: &[u8]) -> Option<Self> {
        if let Some((title, description, destination, value, data)) =
            decode_args::<(String, String, Address, u128, String)>(payload, SIG_SUBMIT)
        {
            return Some(WalletRequest::Submit {
                title,
                description,
                destination,
                value,
                data: hex::decode(data).ok()?,
            });
        }
        if let Some((id,)) = decode_args(payload, SIG_CONFIRM) {
            return Some(WalletRequest::Confirm { id });
        }
        if let Some((id,)) = decode_args(payload, SIG_REVOKE) {
            return Some(WalletRequest::Revoke { id });
        }
        decode_args(payload, SIG_EXECUTE).map(|(id,)| WalletRequest::Execute { id })
    }
}

/// Registry callbacks. Only the wallet named in the call may make it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryCall {
    AddMember { member: Address, wallet: Address },
    RemoveMember { member: Address, wallet: Address },
}

impl RegistryCall {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            RegistryCall::AddMember { member, wallet } => {
                encode(SIG_REGISTRY_ADD_MEMBER, &(member, wallet))
            }
            RegistryCall::RemoveMember { member, wallet } => {
                encode(SIG_REGISTRY_REMOVE_MEMBER, &(member, wallet))
            }
        }
    }

    pub fn decode(payload: &[u8]) -> Option<Self> {
        if let Some((member, wallet)) = decode_args(payload, SIG_REGISTRY_ADD_MEMBER) {
            return Some(RegistryCall::AddMember { member, wallet });
        }
        decode_args(payload, SIG_REGISTRY_REMOVE_MEMBER)
            .map(|(member, wallet)| RegistryCall::RemoveMember { member, wallet })
    }

    /// True when the payload targets a member-mutating registry callback,
    /// whether or not its arguments are well formed
    pub fn is_member_mutation(payload: &[u8]) -> bool {
        has_selector(payload, SIG_REGISTRY_ADD_MEMBER)
            || has_selector(payload, SIG_REGISTRY_REMOVE_MEMBER)
    }
}

/// Calls understood by [`crate::token::Token`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenCall {
    Transfer { to: Address, amount: u128 },
    Mint { to: Address, amount: u128 },
}

impl TokenCall {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            TokenCall::Transfer { to, amount } => encode(SIG_TOKEN_TRANSFER, &(to, amount)),
            TokenCall::Mint { to, amount } => encode(SIG_TOKEN_MINT, &(to, amount)),
        }
    }

    pub fn decode(payload: &[u8]) -> Option<Self> {
        if let Some((to, amount)) = decode_args(payload, SIG_TOKEN_TRANSFER) {
            return Some(TokenCall::Transfer { to, amount });
        }
        decode_args(payload, SIG_TOKEN_MINT).map(|(to, amount)| TokenCall::Mint { to, amount })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_action_decodes() {
        let action = AdminAction::ReplaceMember {
            member: Address::new("0xa"),
            new_member: Address::new("0xb"),
        };
        assert_eq!(AdminAction::decode(&action.encode()), Some(action));

        let required = AdminAction::ChangeRequirement { required: 1 };
        assert_eq!(AdminAction::decode(&required.encode()), Some(required));
    }

    #[test]
    fn test_admin_and_registry_selectors_do_not_collide() {
        let admin = AdminAction::AddMember {
            member: Address::new("0xa"),
        }
        .encode();
        let callback = RegistryCall::AddMember {
            member: Address::new("0xa"),
            wallet: Address::new("3abc"),
        }
        .encode();

        assert!(RegistryCall::decode(&admin).is_none());
        assert!(AdminAction::decode(&callback).is_none());
        assert!(RegistryCall::is_member_mutation(&callback));
        assert!(!RegistryCall::is_member_mutation(&admin));
    }

    #[test]
    fn test_member_mutation_detected_with_garbage_args() {
        let mut payload = selector(SIG_REGISTRY_REMOVE_MEMBER).to_vec();
        payload.extend_from_slice(b"not json");
        assert!(RegistryCall::is_member_mutation(&payload));
        assert!(RegistryCall::decode(&payload).is_none());
    }

    #[test]
    fn test_submit_request_carries_bytes() {
        let request = WalletRequest::Submit {
            title: "pay".to_string(),
            description: "rent".to_string(),
            destination: Address::new("0xdead"),
            value: 5,
            data: vec![0xde, 0xad, 0xbe, 0xef],
        };
        assert_eq!(WalletRequest::decode(&request.encode()), Some(request));
    }

    #[test]
    fn test_short_and_empty_payloads() {
        assert!(split(&[]).is_none());
        assert!(split(&[1, 2, 3]).is_none());
        assert!(TokenCall::decode(&[]).is_none());
        assert!(!RegistryCall::is_member_mutation(&[]));
    }
}
