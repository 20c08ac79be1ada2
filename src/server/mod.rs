//! Relay server
//!
//! Accepts relay connections, negotiates their session ids and binds each
//! one as the publisher of a router.

pub mod accept;
pub mod config;
pub mod listener;

pub use accept::{bind_transport, negotiate_id, IdNegotiation};
pub use config::ServerConfig;
pub use listener::RelayServer;
