//! REST API module
//!
//! Provides HTTP REST API access to registries and wallets.
//!
//! # Endpoints
//!
//! ## Registries
//! - `POST /api/registries` - Deploy a registry
//! - `POST /api/registries/:address/wallets` - Create a wallet
//! - `GET /api/registries/:address/wallets/:wallet` - Wallet entry
//! - `GET /api/registries/:address/members/:member` - Wallets of a member
//!
//! ## Wallets
//! - `GET /api/wallets/:address` - Wallet details
//! - `POST /api/wallets/:address/submit` - Submit a transaction
//! - `POST /api/wallets/:address/confirm` - Confirm a transaction
//! - `POST /api/wallets/:address/revoke` - Revoke a confirmation
//! - `POST /api/wallets/:address/execute` - Execute a transaction
//! - `GET /api/wallets/:address/transactions` - List transactions
//! - `GET /api/wallets/:address/transactions/:id` - Get transaction
//!
//! ## Events
//! - `GET /api/events` - Event log
//! - `GET /ws?since=N` - Real-time event stream, replaying records after `N`

pub mod handlers;
pub mod routes;
pub mod websocket;

pub use handlers::ApiState;
pub use routes::create_router;
pub use websocket::WsBroadcaster;
