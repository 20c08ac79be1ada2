//! Session-routing core of a real-time RTP media relay
//!
//! Inbound relay connections announce a session id, become the publisher of
//! a per-session [`Router`], and have their packets passed through a plugin
//! chain and fanned out to every subscriber of that session.
//!
//! # Quick start
//!
//! ```no_run
//! use rtc_relay::{RelayServer, ServerConfig};
//!
//! # async fn run() -> rtc_relay::Result<()> {
//! let server = RelayServer::init(ServerConfig::with_port(5000).crypto("key", "salt")).await?;
//! let mut reaped = server.take_clean_channel().expect("first take");
//!
//! while let Some(session) = reaped.recv().await {
//!     println!("session {} ended", session);
//! }
//!
//! server.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`registry`]: routers, the session registry and the liveness monitor
//! - [`server`]: relay listener, id negotiation and the management surface
//! - [`transport`]: connection contract, relay framing and encryption
//! - [`plugin`]: per-router packet processors
//! - [`rtp`]: RTP packet parsing
//! - [`stats`]: traffic and monitor counters

pub mod error;
pub mod plugin;
pub mod registry;
pub mod rtp;
pub mod server;
pub mod stats;
pub mod transport;

pub use error::{Error, Result};
pub use registry::{RegistryConfig, Router, RouterRegistry};
pub use server::{RelayServer, ServerConfig};
