//! RTP fixed header parsing
//!
//! RTP Header (RFC 3550):
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       sequence number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           synchronization source (SSRC) identifier            |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! |            contributing source (CSRC) identifiers             |
//! |                             ....                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::RtpError;

/// Supported RTP version
pub const RTP_VERSION: u8 = 2;

/// Size of the fixed RTP header
pub const RTP_HEADER_LEN: usize = 12;

/// Parsed RTP packet
///
/// Cheap to clone: `raw` and `payload` share the same reference-counted buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    /// Marker bit
    pub marker: bool,
    /// Payload type (7 bits)
    pub payload_type: u8,
    /// Sequence number
    pub sequence_number: u16,
    /// Media timestamp
    pub timestamp: u32,
    /// Synchronization source
    pub ssrc: u32,
    /// Payload without header, extension or padding
    pub payload: Bytes,
    /// Complete packet as received, forwarded unchanged
    pub raw: Bytes,
}

impl RtpPacket {
    /// Build a packet with a minimal header (no CSRCs, extension or padding)
    pub fn new(
        payload_type: u8,
        sequence_number: u16,
        timestamp: u32,
        ssrc: u32,
        payload: Bytes,
    ) -> Self {
        let mut buf = BytesMut::with_capacity(RTP_HEADER_LEN + payload.len());
        buf.put_u8(RTP_VERSION << 6);
        buf.put_u8(payload_type & 0x7F);
        buf.put_u16(sequence_number);
        buf.put_u32(timestamp);
        buf.put_u32(ssrc);
        buf.put_slice(&payload);
        let raw = buf.freeze();

        Self {
            marker: false,
            payload_type: payload_type & 0x7F,
            sequence_number,
            timestamp,
            ssrc,
            payload: raw.slice(RTP_HEADER_LEN..),
            raw,
        }
    }

    /// Parse an RTP packet
    pub fn parse(raw: Bytes) -> Result<Self, RtpError> {
        if raw.len() < RTP_HEADER_LEN {
            return Err(RtpError::TooShort(raw.len()));
        }

        let version = raw[0] >> 6;
        if version != RTP_VERSION {
            return Err(RtpError::UnsupportedVersion(version));
        }

        let has_padding = raw[0] & 0x20 != 0;
        let has_extension = raw[0] & 0x10 != 0;
        let csrc_count = (raw[0] & 0x0F) as usize;

        let marker = raw[1] & 0x80 != 0;
        let payload_type = raw[1] & 0x7F;
        let sequence_number = u16::from_be_bytes([raw[2], raw[3]]);
        let timestamp = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let ssrc = u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]);

        let mut offset = RTP_HEADER_LEN + csrc_count * 4;
        if raw.len() < offset {
            return Err(RtpError::TooShort(raw.len()));
        }

        if has_extension {
            if raw.len() < offset + 4 {
                return Err(RtpError::TruncatedExtension);
            }
            let words = u16::from_be_bytes([raw[offset + 2], raw[offset + 3]]) as usize;
            offset += 4 + words * 4;
            if raw.len() < offset {
                return Err(RtpError::TruncatedExtension);
            }
        }

        let mut end = raw.len();
        if has_padding {
            let pad = raw[end - 1];
            if pad == 0 || (pad as usize) > end - offset {
                return Err(RtpError::InvalidPadding(pad));
            }
            end -= pad as usize;
        }

        Ok(Self {
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            payload: raw.slice(offset..end),
            raw,
        })
    }

    /// Size of the packet on the wire
    pub fn size(&self) -> usize {
        self.raw.len()
    }
}
