//! Test doubles shared by registry tests

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::rtp::RtpPacket;
use crate::transport::{RtpTransport, Transport, TransportConfig, TransportIo};

/// Transport that counts `close` calls and can refuse every write
pub(crate) struct MockTransport {
    inner: Arc<RtpTransport>,
    closes: AtomicUsize,
    fail_writes: bool,
}

impl MockTransport {
    pub(crate) fn new() -> (Arc<Self>, TransportIo) {
        Self::build(false)
    }

    pub(crate) fn failing() -> (Arc<Self>, TransportIo) {
        Self::build(true)
    }

    fn build(fail_writes: bool) -> (Arc<Self>, TransportIo) {
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let (inner, io) = RtpTransport::detached(addr, &TransportConfig::default());
        let mock = Arc::new(Self {
            inner,
            closes: AtomicUsize::new(0),
            fail_writes,
        });
        (mock, io)
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn set_id(&self, id: &str) {
        self.inner.set_id(id);
    }

    /// Simulate the peer going away without a local close
    pub(crate) fn kill(&self) {
        self.inner.close();
    }
}

impl Transport for MockTransport {
    fn id(&self) -> Option<String> {
        self.inner.id()
    }

    fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr()
    }

    fn take_receiver(&self) -> Option<mpsc::Receiver<RtpPacket>> {
        self.inner.take_receiver()
    }

    fn write_rtp(&self, packet: &RtpPacket) -> Result<(), TransportError> {
        if self.fail_writes {
            return Err(TransportError::Closed);
        }
        self.inner.write_rtp(packet)
    }

    fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close();
    }
}
