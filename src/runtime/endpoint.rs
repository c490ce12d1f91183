//! External call boundary
//!
//! Anything a wallet can call that is not a wallet, registry or token is an
//! [`Endpoint`]: a trait object registered with the runtime under an address.

use crate::core::Address;
use crate::multisig::MultisigError;
use crate::runtime::Runtime;
use crate::token::TokenError;
use thiserror::Error;

/// Maximum nesting of calls
pub const MAX_CALL_DEPTH: usize = 32;

/// Why an invocation failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: u128, need: u128 },
    #[error("Not a contract: {0}")]
    NotAContract(Address),
    #[error("Unknown call to {0}")]
    UnknownCall(Address),
    #[error("Endpoint busy: {0}")]
    EndpointBusy(Address),
    #[error("Call depth exceeded")]
    CallDepthExceeded,
    #[error("Reverted by {0}: {1}")]
    Reverted(Address, String),
    #[error(transparent)]
    Multisig(#[from] MultisigError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// One call as seen by the callee
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallFrame {
    pub caller: Address,
    pub target: Address,
    pub value: u128,
    pub payload: Vec<u8>,
    /// Nesting level, 1 for a top-level call
    pub depth: usize,
}

/// A pluggable call target
///
/// Endpoints may call back into the runtime through their
/// [`EndpointContext`]. While an endpoint runs it is checked out of the
/// runtime, so a nested call to the same endpoint fails with
/// [`InvokeError::EndpointBusy`].
pub trait Endpoint: Send + Sync {
    fn invoke(&mut self, ctx: &mut EndpointContext<'_>, frame: &CallFrame) -> Result<(), InvokeError>;
}

/// Handle an endpoint gets for the duration of one call
///
/// Reads see the whole runtime. Nested calls always carry the endpoint's own
/// address as caller.
pub struct EndpointContext<'a> {
    runtime: &'a mut Runtime,
    address: Address,
}

impl<'a> EndpointContext<'a> {
    pub(crate) fn new(runtime: &'a mut Runtime, address: Address) -> Self {
        Self { runtime, address }
    }

    /// Address the endpoint is registered under
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn runtime(&self) -> &Runtime {
        self.runtime
    }

    /// Call `target` as this endpoint
    pub fn call(&mut self, target: &Address, value: u128, payload: &[u8]) -> Result<(), InvokeError> {
        self.runtime.invoke(&self.address, target, value, payload)
    }
}
