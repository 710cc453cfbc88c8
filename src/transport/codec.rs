//! Length-prefixed stanza framing.
//!
//! Frames are a big-endian u32 length followed by the serialized stanza.
//! The codec rejects frames above [`MAX_FRAME_SIZE`] so a corrupt length
//! cannot make the reader buffer unbounded amounts of data.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::TransportError;
use crate::packet::Packet;

/// Largest accepted frame payload.
pub const MAX_FRAME_SIZE: usize = 256 * 1024;

const LENGTH_PREFIX: usize = 4;

/// Codec turning the byte stream into [`Packet`]s and back.
#[derive(Debug)]
pub struct StanzaCodec {
    max_frame: usize,
}

impl StanzaCodec {
    pub fn new() -> Self {
        Self {
            max_frame: MAX_FRAME_SIZE,
        }
    }

    #[cfg(test)]
    fn with_max_frame(max_frame: usize) -> Self {
        Self { max_frame }
    }
}

impl Default for StanzaCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StanzaCodec {
    type Item = Packet;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, TransportError> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let mut length_bytes = [0u8; LENGTH_PREFIX];
        length_bytes.copy_from_slice(&src[..LENGTH_PREFIX]);
        let length = u32::from_be_bytes(length_bytes) as usize;

        if length > self.max_frame {
            return Err(TransportError::FrameTooLarge {
                size: length,
                limit: self.max_frame,
            });
        }

        if src.len() < LENGTH_PREFIX + length {
            src.reserve(LENGTH_PREFIX + length - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let frame = src.split_to(length);

        let packet = serde_json::from_slice(&frame)
            .map_err(|e| TransportError::Codec(e.to_string()))?;
        Ok(Some(packet))
    }
}

impl<'a> Encoder<&'a Packet> for StanzaCodec {
    type Error = TransportError;

    fn encode(&mut self, packet: &'a Packet, dst: &mut BytesMut) -> Result<(), TransportError> {
        let body = serde_json::to_vec(packet).map_err(|e| TransportError::Codec(e.to_string()))?;

        if body.len() > self.max_frame {
            return Err(TransportError::FrameTooLarge {
                size: body.len(),
                limit: self.max_frame,
            });
        }

        dst.reserve(LENGTH_PREFIX + body.len());
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Message;

    #[test]
    fn test_decode_across_split_buffers() {
        let packet = Packet::Message(Message::chat("a@example.org", "hello"));
        let mut codec = StanzaCodec::new();
        let mut encoded = BytesMut::new();
        codec.encode(&packet, &mut encoded).unwrap();

        // Feed the frame two bytes at a time; only the final chunk completes it.
        let mut buffer = BytesMut::new();
        let mut decoded = None;
        for chunk in encoded.chunks(2) {
            buffer.extend_from_slice(chunk);
            if let Some(packet) = codec.decode(&mut buffer).unwrap() {
                decoded = Some(packet);
            }
        }

        assert_eq!(decoded, Some(packet));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_oversize_frame_rejected() {
        let mut codec = StanzaCodec::with_max_frame(8);
        let packet = Packet::Message(Message::chat("a@example.org", "way too long for eight"));
        let mut dst = BytesMut::new();
        assert!(matches!(
            codec.encode(&packet, &mut dst),
            Err(TransportError::FrameTooLarge { .. })
        ));

        // A corrupt length prefix on the read side is rejected before buffering.
        let mut src = BytesMut::new();
        src.put_u32(1024);
        assert!(matches!(
            codec.decode(&mut src),
            Err(TransportError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_garbage_payload_is_codec_error() {
        let mut codec = StanzaCodec::new();
        let mut src = BytesMut::new();
        src.put_u32(3);
        src.extend_from_slice(b"{{{");
        assert!(matches!(
            codec.decode(&mut src),
            Err(TransportError::Codec(_))
        ));
    }
}
