//! Relay listener
//!
//! Accepts relay links from upstream nodes and turns each socket into an
//! [`RtpTransport`] driven by a reader task and a writer task.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::rtp::RtpPacket;

use super::crypto::RelayCipher;
use super::frame::{read_frame, write_frame, RelayFrame};
use super::{RtpTransport, Transport, TransportConfig, TransportIo};

/// Listener for inbound relay links
pub struct RelayListener {
    listener: TcpListener,
    cipher: Option<Arc<RelayCipher>>,
    config: TransportConfig,
    tcp_nodelay: bool,
}

impl RelayListener {
    /// Bind a relay listener
    ///
    /// When `cipher` is set every frame on accepted links must be sealed
    /// with the same key.
    pub async fn bind(
        addr: SocketAddr,
        cipher: Option<RelayCipher>,
        config: TransportConfig,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        tracing::info!(
            addr = %listener.local_addr()?,
            encrypted = cipher.is_some(),
            "Relay listener bound"
        );

        Ok(Self {
            listener,
            cipher: cipher.map(Arc::new),
            config,
            tcp_nodelay: true,
        })
    }

    /// Enable or disable TCP_NODELAY on accepted sockets
    pub fn set_nodelay(&mut self, nodelay: bool) {
        self.tcp_nodelay = nodelay;
    }

    /// Local address the listener is bound to
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Whether accepted links are encrypted
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Accept the next relay link
    ///
    /// The returned transport may not have a session id yet: it is set once
    /// the peer's Hello frame arrives.
    pub async fn accept(&self) -> std::io::Result<Arc<RtpTransport>> {
        let (socket, peer_addr) = self.listener.accept().await?;

        if self.tcp_nodelay {
            socket.set_nodelay(true)?;
        }

        tracing::debug!(peer = %peer_addr, "Relay link accepted");

        Ok(spawn_relay_link(socket, peer_addr, self.cipher.clone(), &self.config))
    }
}

/// Wrap a connected socket in a transport and spawn its I/O tasks
pub fn spawn_relay_link(
    socket: TcpStream,
    peer_addr: SocketAddr,
    cipher: Option<Arc<RelayCipher>>,
    config: &TransportConfig,
) -> Arc<RtpTransport> {
    let (transport, io) = RtpTransport::detached(peer_addr, config);
    let (reader, writer) = socket.into_split();
    let TransportIo {
        inbound,
        outbound,
        shutdown,
    } = io;

    tokio::spawn(read_loop(
        Arc::clone(&transport),
        reader,
        inbound,
        shutdown.clone(),
        cipher.clone(),
        config.max_frame_size,
    ));
    tokio::spawn(write_loop(
        Arc::clone(&transport),
        writer,
        outbound,
        shutdown,
        cipher,
        config.max_frame_size,
    ));

    transport
}

async fn read_loop(
    transport: Arc<RtpTransport>,
    mut reader: OwnedReadHalf,
    inbound: tokio::sync::mpsc::Sender<RtpPacket>,
    shutdown: tokio_util::sync::CancellationToken,
    cipher: Option<Arc<RelayCipher>>,
    max_frame_size: usize,
) {
    let peer = transport.remote_addr();

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = read_frame(&mut reader, cipher.as_deref(), max_frame_size) => frame,
        };

        match frame {
            Ok(Some(RelayFrame::Hello(id))) => {
                if transport.set_id(id.as_str()) {
                    tracing::debug!(peer = %peer, session = %id, "Session id announced");
                } else {
                    tracing::debug!(
                        peer = %peer,
                        session = %id,
                        "Ignoring repeated session announcement"
                    );
                }
            }
            Ok(Some(RelayFrame::Rtp(raw))) => {
                let packet = match RtpPacket::parse(raw) {
                    Ok(packet) => packet,
                    Err(e) => {
                        tracing::trace!(peer = %peer, error = %e, "Dropping malformed RTP packet");
                        continue;
                    }
                };

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = inbound.send(packet) => {
                        if result.is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(None) => {
                tracing::debug!(peer = %peer, "Relay peer closed link");
                break;
            }
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "Relay link read error");
                break;
            }
        }
    }

    transport.close();
}

async fn write_loop(
    transport: Arc<RtpTransport>,
    mut writer: OwnedWriteHalf,
    mut outbound: tokio::sync::mpsc::Receiver<RtpPacket>,
    shutdown: tokio_util::sync::CancellationToken,
    cipher: Option<Arc<RelayCipher>>,
    max_frame_size: usize,
) {
    loop {
        let packet = tokio::select! {
            _ = shutdown.cancelled() => break,
            packet = outbound.recv() => match packet {
                Some(packet) => packet,
                None => break,
            },
        };

        let frame = RelayFrame::Rtp(packet.raw);
        if let Err(e) = write_frame(&mut writer, &frame, cipher.as_deref(), max_frame_size).await {
            tracing::debug!(peer = %transport.remote_addr(), error = %e, "Relay link write error");
            break;
        }
    }

    transport.close();
}
