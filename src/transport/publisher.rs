//! Relay publisher
//!
//! Client side of a relay link: an upstream node connects, announces the
//! session id and pushes RTP packets.

use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::{Result, TransportError};
use crate::rtp::RtpPacket;

use super::crypto::RelayCipher;
use super::frame::{write_frame, RelayFrame};
use super::TransportConfig;

/// Relay link publisher
///
/// # Example
/// ```no_run
/// use bytes::Bytes;
/// use rtc_relay::rtp::RtpPacket;
/// use rtc_relay::transport::RelayPublisher;
///
/// # async fn example() -> rtc_relay::error::Result<()> {
/// let addr = "127.0.0.1:5000".parse().unwrap();
/// let mut publisher = RelayPublisher::publish(addr, "stream-1", None).await?;
///
/// let packet = RtpPacket::new(96, 1, 3000, 0x1234, Bytes::from_static(b"frame"));
/// publisher.send_rtp(&packet).await?;
/// publisher.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct RelayPublisher {
    stream: Option<TcpStream>,
    cipher: Option<RelayCipher>,
    max_frame_size: usize,
    session_id: Option<String>,
}

impl RelayPublisher {
    /// Connect without announcing a session id
    pub async fn connect(addr: SocketAddr, cipher: Option<RelayCipher>) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream: Some(stream),
            cipher,
            max_frame_size: TransportConfig::default().max_frame_size,
            session_id: None,
        })
    }

    /// Connect and announce `session_id` immediately
    pub async fn publish(
        addr: SocketAddr,
        session_id: impl Into<String>,
        cipher: Option<RelayCipher>,
    ) -> Result<Self> {
        let mut publisher = Self::connect(addr, cipher).await?;
        publisher.announce(session_id).await?;
        Ok(publisher)
    }

    /// Send the Hello frame carrying the session id
    pub async fn announce(&mut self, session_id: impl Into<String>) -> Result<()> {
        let session_id = session_id.into();
        self.send_frame(&RelayFrame::Hello(session_id.clone())).await?;
        self.session_id = Some(session_id);
        Ok(())
    }

    /// Send one RTP packet
    pub async fn send_rtp(&mut self, packet: &RtpPacket) -> Result<()> {
        self.send_frame(&RelayFrame::Rtp(packet.raw.clone())).await
    }

    /// Session id announced on this link, if any
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Check if the link is still open
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Close the link
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }

    async fn send_frame(&mut self, frame: &RelayFrame) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        write_frame(stream, frame, self.cipher.as_ref(), self.max_frame_size).await
    }
}
