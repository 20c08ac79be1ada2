//! RTP packet handling
//!
//! The relay does not interpret media payloads. It only needs enough of the
//! RTP fixed header to order packets and report stream statistics.

pub mod packet;

pub use packet::{RtpPacket, RTP_HEADER_LEN, RTP_VERSION};
