//! Media transports
//!
//! The router core only sees connections through the [`Transport`] trait:
//! an identifiable endpoint that yields inbound RTP packets once and accepts
//! outbound packets without blocking.
//!
//! # Architecture
//!
//! ```text
//!   TcpStream ──► reader task ──► inbound mpsc ──► take_receiver() ──► Router pump
//!                                                                          │
//!   TcpStream ◄── writer task ◄── outbound mpsc ◄── write_rtp() ◄──────────┘
//! ```
//!
//! [`RtpTransport`] is the concrete handle. Its I/O half ([`TransportIo`]) is
//! driven either by the relay socket tasks in [`relay`] or directly by an
//! in-process peer.

pub mod crypto;
pub mod frame;
pub mod publisher;
pub mod relay;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::rtp::RtpPacket;

pub use crypto::{RelayCipher, RelayCrypto};
pub use frame::RelayFrame;
pub use publisher::RelayPublisher;
pub use relay::RelayListener;

/// Connection contract consumed by routers
pub trait Transport: Send + Sync {
    /// Session identifier, `None` until the peer has announced it
    fn id(&self) -> Option<String>;

    /// Remote peer address
    fn remote_addr(&self) -> SocketAddr;

    /// Take the inbound packet stream. Returns `None` after the first call.
    fn take_receiver(&self) -> Option<mpsc::Receiver<RtpPacket>>;

    /// Queue a packet for delivery without waiting
    fn write_rtp(&self, packet: &RtpPacket) -> Result<(), TransportError>;

    /// Whether the connection is still usable
    fn is_alive(&self) -> bool;

    /// Close the connection. Idempotent.
    fn close(&self);
}

/// Queue sizes and frame limits for a transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Inbound packet queue capacity
    pub inbound_capacity: usize,
    /// Outbound packet queue capacity
    pub outbound_capacity: usize,
    /// Largest relay frame body accepted or produced
    pub max_frame_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 1024,
            outbound_capacity: 1024,
            max_frame_size: u16::MAX as usize,
        }
    }
}

impl TransportConfig {
    /// Set inbound queue capacity
    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity.max(1);
        self
    }

    /// Set outbound queue capacity
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Set maximum frame size (capped by the 16-bit length prefix)
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.min(u16::MAX as usize);
        self
    }
}

/// I/O half of an [`RtpTransport`]
///
/// Whoever drives the connection pushes received packets into `inbound`
/// and drains `outbound`. `shutdown` fires when the transport is closed.
pub struct TransportIo {
    pub inbound: mpsc::Sender<RtpPacket>,
    pub outbound: mpsc::Receiver<RtpPacket>,
    pub shutdown: CancellationToken,
}

/// RTP connection handle
pub struct RtpTransport {
    id: OnceLock<String>,
    remote_addr: SocketAddr,
    alive: AtomicBool,
    shutdown: CancellationToken,
    inbound: Mutex<Option<mpsc::Receiver<RtpPacket>>>,
    outbound: mpsc::Sender<RtpPacket>,
}

impl RtpTransport {
    /// Create a transport that is not bound to any socket
    ///
    /// Returns the handle and the I/O half used to feed and drain it.
    pub fn detached(remote_addr: SocketAddr, config: &TransportConfig) -> (Arc<Self>, TransportIo) {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let shutdown = CancellationToken::new();

        let transport = Arc::new(Self {
            id: OnceLock::new(),
            remote_addr,
            alive: AtomicBool::new(true),
            shutdown: shutdown.clone(),
            inbound: Mutex::new(Some(inbound_rx)),
            outbound: outbound_tx,
        });

        let io = TransportIo {
            inbound: inbound_tx,
            outbound: outbound_rx,
            shutdown,
        };

        (transport, io)
    }

    /// Record the session id announced by the peer
    ///
    /// Only the first non-empty id is kept. Returns false if the id was
    /// ignored.
    pub fn set_id(&self, id: impl Into<String>) -> bool {
        let id = id.into();
        if id.is_empty() {
            return false;
        }
        self.id.set(id).is_ok()
    }
}

impl Transport for RtpTransport {
    fn id(&self) -> Option<String> {
        self.id.get().cloned()
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    fn take_receiver(&self) -> Option<mpsc::Receiver<RtpPacket>> {
        self.inbound.lock().take()
    }

    fn write_rtp(&self, packet: &RtpPacket) -> Result<(), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Closed);
        }

        self.outbound.try_send(packet.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire) && !self.shutdown.is_cancelled()
    }

    fn close(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            self.shutdown.cancel();
            tracing::debug!(
                session = self.id.get().map(String::as_str).unwrap_or(""),
                peer = %self.remote_addr,
                "Transport closed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    #[test]
    fn test_id_set_once() {
        let (transport, _io) = RtpTransport::detached(addr(), &TransportConfig::default());

        assert_eq!(transport.id(), None);
        assert!(!transport.set_id(""));
        assert_eq!(transport.id(), None);

        assert!(transport.set_id("stream-1"));
        assert!(!transport.set_id("stream-2"));
        assert_eq!(transport.id().as_deref(), Some("stream-1"));
    }

    #[test]
    fn test_receiver_taken_once() {
        let (transport, _io) = RtpTransport::detached(addr(), &TransportConfig::default());

        assert!(transport.take_receiver().is_some());
        assert!(transport.take_receiver().is_none());
    }

    #[tokio::test]
    async fn test_write_and_backpressure() {
        let config = TransportConfig::default().outbound_capacity(1);
        let (transport, mut io) = RtpTransport::detached(addr(), &config);
        let packet = RtpPacket::new(96, 1, 0, 1, Bytes::from_static(b"a"));

        tokio_test::assert_ok!(transport.write_rtp(&packet));
        assert_eq!(transport.write_rtp(&packet), Err(TransportError::Backpressure));

        let received = io.outbound.recv().await.unwrap();
        assert_eq!(received.sequence_number, 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (transport, io) = RtpTransport::detached(addr(), &TransportConfig::default());
        let packet = RtpPacket::new(96, 1, 0, 1, Bytes::new());

        assert!(transport.is_alive());
        transport.close();
        transport.close();

        assert!(!transport.is_alive());
        assert!(io.shutdown.is_cancelled());
        assert_eq!(transport.write_rtp(&packet), Err(TransportError::Closed));
    }
}
