//! Session registry and per-session routing
//!
//! The registry maps session ids to routers. Each router owns at most one
//! publisher, runs its packets through a plugin chain and fans the result
//! out to every subscriber.
//!
//! # Architecture
//!
//! ```text
//!                         Arc<RouterRegistry>
//!                     ┌─────────────────────────┐
//!                     │ routers: HashMap<Id,    │
//!                     │   Arc<Router> {         │
//!                     │     publisher,          │
//!                     │     plugins,            │
//!                     │     subscribers,        │
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Publisher]            [Subscriber]            [Subscriber]
//!    rx.recv()              write_rtp()             write_rtp()
//!         │                       ▲                       ▲
//!         └──► plugins.process() ─┴──── fan_out() ────────┘
//! ```
//!
//! # Liveness
//!
//! A background monitor ([`RouterRegistry::spawn_monitor_task`]) reaps
//! routers whose publisher or plugin chain has died and reports their ids
//! on a bounded cleanup queue.
//!
//! # Zero-Copy Design
//!
//! RTP payloads are `bytes::Bytes`, so every subscriber shares the same
//! allocation. Fan-out only bumps reference counts.

pub mod config;
pub mod error;
pub mod monitor;
pub mod router;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use config::RegistryConfig;
pub use error::RouterError;
pub use monitor::CheckReport;
pub use router::Router;
pub use store::RouterRegistry;
