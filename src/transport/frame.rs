//! Relay framing
//!
//! Relay links carry discrete frames over a reliable stream:
//! ```text
//! +------------+--------------------------------------+
//! | Length(2)  | Body(Length)                         |
//! +------------+--------------------------------------+
//!
//! Plain body:      | Kind(1) | Payload(N) |
//! Encrypted body:  | Nonce(12) | AES-256-GCM(Kind(1) | Payload(N)) + Tag(16) |
//! ```
//!
//! Kinds:
//! - `0x01` Hello: UTF-8 session id announced by the publisher
//! - `0x02` RTP: one RTP packet

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result, TransportError};

use super::crypto::RelayCipher;

/// Hello frame kind
pub const FRAME_HELLO: u8 = 0x01;

/// RTP frame kind
pub const FRAME_RTP: u8 = 0x02;

/// A single relay frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    /// Session id announcement
    Hello(String),
    /// Raw RTP packet
    Rtp(Bytes),
}

impl RelayFrame {
    /// Encode the frame including its length prefix
    pub fn encode(
        &self,
        cipher: Option<&RelayCipher>,
        max_frame_size: usize,
    ) -> std::result::Result<Bytes, TransportError> {
        let (kind, payload): (u8, &[u8]) = match self {
            RelayFrame::Hello(id) => (FRAME_HELLO, id.as_bytes()),
            RelayFrame::Rtp(raw) => (FRAME_RTP, &raw[..]),
        };

        let mut body = Vec::with_capacity(1 + payload.len());
        body.push(kind);
        body.extend_from_slice(payload);

        let body = match cipher {
            Some(cipher) => cipher.seal(&body)?,
            None => body,
        };

        let limit = max_frame_size.min(u16::MAX as usize);
        if body.len() > limit {
            return Err(TransportError::FrameTooLarge(body.len()));
        }

        let mut buf = BytesMut::with_capacity(2 + body.len());
        buf.put_u16(body.len() as u16);
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    /// Decode a frame body (length prefix already stripped)
    pub fn decode(
        body: &[u8],
        cipher: Option<&RelayCipher>,
    ) -> std::result::Result<Self, TransportError> {
        let opened;
        let body = match cipher {
            Some(cipher) => {
                opened = cipher.open(body)?;
                &opened[..]
            }
            None => body,
        };

        let (&kind, payload) = body.split_first().ok_or(TransportError::EmptyFrame)?;

        match kind {
            FRAME_HELLO => {
                let id = std::str::from_utf8(payload)
                    .map_err(|_| TransportError::InvalidSessionId)?;
                Ok(RelayFrame::Hello(id.to_string()))
            }
            FRAME_RTP => Ok(RelayFrame::Rtp(Bytes::copy_from_slice(payload))),
            other => Err(TransportError::UnknownFrameKind(other)),
        }
    }
}

/// Read one frame
///
/// Returns `Ok(None)` when the peer closed the stream at a frame boundary.
pub async fn read_frame<R>(
    reader: &mut R,
    cipher: Option<&RelayCipher>,
    max_frame_size: usize,
) -> Result<Option<RelayFrame>>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u16().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };

    if len == 0 {
        return Err(TransportError::EmptyFrame.into());
    }
    if len > max_frame_size {
        return Err(TransportError::FrameTooLarge(len).into());
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    Ok(Some(RelayFrame::decode(&body, cipher)?))
}

/// Write one frame
pub async fn write_frame<W>(
    writer: &mut W,
    frame: &RelayFrame,
    cipher: Option<&RelayCipher>,
    max_frame_size: usize,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let encoded = frame.encode(cipher, max_frame_size)?;
    writer.write_all(&encoded).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::crypto::SEAL_OVERHEAD;

    const MAX: usize = u16::MAX as usize;

    #[test]
    fn test_plain_layout() {
        let encoded = RelayFrame::Hello("s1".into()).encode(None, MAX).unwrap();

        assert_eq!(&encoded[..], &[0x00, 0x03, FRAME_HELLO, b's', b'1']);
        assert_eq!(
            RelayFrame::decode(&encoded[2..], None).unwrap(),
            RelayFrame::Hello("s1".into())
        );
    }

    #[test]
    fn test_encrypted_body_is_opaque() {
        let cipher = RelayCipher::new("key", "salt").unwrap();
        let frame = RelayFrame::Rtp(Bytes::from_static(&[0x80, 0x60, 0x00, 0x01]));

        let encoded = frame.encode(Some(&cipher), MAX).unwrap();
        assert_eq!(encoded.len(), 2 + 1 + 4 + SEAL_OVERHEAD);
        assert_eq!(RelayFrame::decode(&encoded[2..], Some(&cipher)).unwrap(), frame);

        // Plain decoding of an encrypted body must not yield the frame
        assert_ne!(RelayFrame::decode(&encoded[2..], None).ok(), Some(frame));
    }

    #[test]
    fn test_unknown_kind() {
        assert_eq!(
            RelayFrame::decode(&[0x7F, 0x00], None),
            Err(TransportError::UnknownFrameKind(0x7F))
        );
        assert_eq!(RelayFrame::decode(&[], None), Err(TransportError::EmptyFrame));
    }

    #[test]
    fn test_invalid_session_id() {
        assert_eq!(
            RelayFrame::decode(&[FRAME_HELLO, 0xFF, 0xFE], None),
            Err(TransportError::InvalidSessionId)
        );
    }

    #[test]
    fn test_frame_too_large() {
        let frame = RelayFrame::Rtp(Bytes::from(vec![0u8; 64]));
        assert_eq!(frame.encode(None, 32), Err(TransportError::FrameTooLarge(65)));
    }

    #[tokio::test]
    async fn test_read_frames_until_eof() {
        let mut wire = Vec::new();
        write_frame(&mut wire, &RelayFrame::Hello("s1".into()), None, MAX).await.unwrap();
        let frame = RelayFrame::Rtp(Bytes::from_static(b"pkt"));
        write_frame(&mut wire, &frame, None, MAX).await.unwrap();

        let mut reader = &wire[..];
        assert_eq!(
            read_frame(&mut reader, None, MAX).await.unwrap(),
            Some(RelayFrame::Hello("s1".into()))
        );
        assert_eq!(
            read_frame(&mut reader, None, MAX).await.unwrap(),
            Some(RelayFrame::Rtp(Bytes::from_static(b"pkt")))
        );
        assert_eq!(read_frame(&mut reader, None, MAX).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_rejects_oversized_length() {
        let wire = [0x01u8, 0x00, FRAME_RTP];
        let mut reader = &wire[..];

        let result = read_frame(&mut reader, None, 16).await;
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::FrameTooLarge(256)))
        ));
    }
}
