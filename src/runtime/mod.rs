//! Hosting environment for wallets and registries
//!
//! The runtime processes one call at a time. Every nested call moves value,
//! dispatches by target kind and rolls back everything on failure. Endpoints
//! reach the runtime only through an [`EndpointContext`], which calls with the
//! endpoint's own address.

pub mod dispatch;
pub mod endpoint;
pub mod runtime;

pub use endpoint::{CallFrame, Endpoint, EndpointContext, InvokeError, MAX_CALL_DEPTH};
pub use runtime::{Receipt, Runtime, RuntimeError};
