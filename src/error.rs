//! Error types
//!
//! Crate-wide error enum with per-area sub-errors. Sub-errors convert into
//! [`Error`] so `?` works across module boundaries.

use std::io;

pub use crate::registry::error::RouterError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket or listener I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Relay transport failure (framing, crypto, closed connection)
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Router lifecycle failure
    #[error("router error: {0}")]
    Router(#[from] RouterError),

    /// Malformed RTP packet
    #[error("RTP error: {0}")]
    Rtp(#[from] RtpError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation refused after shutdown
    #[error("server stopped")]
    Stopped,
}

/// RTP parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RtpError {
    #[error("packet too short: {0} bytes")]
    TooShort(usize),
    #[error("unsupported RTP version {0}")]
    UnsupportedVersion(u8),
    #[error("invalid padding length {0}")]
    InvalidPadding(u8),
    #[error("header extension exceeds packet")]
    TruncatedExtension,
}

/// Relay transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Transport has been closed locally or by the peer
    #[error("transport closed")]
    Closed,
    /// Outbound queue is full, packet dropped
    #[error("outbound queue full")]
    Backpressure,
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
    #[error("empty frame")]
    EmptyFrame,
    #[error("unknown frame kind 0x{0:02x}")]
    UnknownFrameKind(u8),
    #[error("session id is not valid UTF-8")]
    InvalidSessionId,
    #[error("crypto failure: {0}")]
    Crypto(&'static str),
    /// Peer never announced a session id
    #[error("session id not announced after {0} attempts")]
    IdNegotiation(u32),
}
