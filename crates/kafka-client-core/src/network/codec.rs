//! Kafka protocol frame codec.
//!
//! Implements tokio's `Decoder` and `Encoder` traits for Kafka wire protocol frames.
//! Kafka uses a simple framing format: 4-byte big-endian length prefix followed by
//! the message bytes.

use bytes::{Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::packet::SIZE_PREFIX_LENGTH;
use crate::protocol::Buffer;

/// Maximum frame size (100 MB by default).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Which side of the conversation the decoded frames come from.
///
/// Determines where the correlation id sits: right after the size prefix in
/// a response, after the api key and version in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Frames sent by a broker.
    Response,
    /// Frames sent by a client.
    Request,
}

impl FrameKind {
    fn correlation_id_offset(self) -> usize {
        match self {
            Self::Response => SIZE_PREFIX_LENGTH,
            Self::Request => SIZE_PREFIX_LENGTH + 4,
        }
    }
}

/// A complete frame, length prefix included.
#[derive(Debug)]
pub struct KafkaFrame {
    /// The correlation ID for request/response matching.
    pub correlation_id: i32,
    /// The complete frame bytes, starting with the length prefix.
    pub bytes: BytesMut,
}

impl KafkaFrame {
    /// Wrap the frame in a [`Buffer`] with the read cursor at the size field.
    #[must_use]
    pub fn into_buffer(self) -> Buffer {
        Buffer::from_received(&self.bytes)
    }
}

/// Codec for Kafka wire protocol frames.
///
/// Kafka messages are framed as:
/// - 4 bytes: message length (big-endian, excludes these 4 bytes)
/// - N bytes: message content
///
/// Outbound packets are already framed by [`crate::protocol::encode`], so the
/// encoder writes them through unchanged.
#[derive(Debug, Clone)]
pub struct KafkaCodec {
    kind: FrameKind,
    max_frame_size: usize,
}

impl KafkaCodec {
    /// Codec for reading broker responses, with the default max frame size.
    #[must_use]
    pub fn responses() -> Self {
        Self::new(FrameKind::Response)
    }

    /// Codec for reading client requests, with the default max frame size.
    #[must_use]
    pub fn requests() -> Self {
        Self::new(FrameKind::Request)
    }

    /// Create a new codec with default max frame size.
    #[must_use]
    pub fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Set a custom max frame size.
    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

impl Default for KafkaCodec {
    fn default() -> Self {
        Self::responses()
    }
}

impl Decoder for KafkaCodec {
    type Item = KafkaFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Need at least 4 bytes for the length prefix
        if src.len() < SIZE_PREFIX_LENGTH {
            return Ok(None);
        }

        let length = i32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        let length = usize::try_from(length).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("negative frame size {length}"),
            )
        })?;

        if length > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "frame size {length} exceeds maximum {}",
                    self.max_frame_size
                ),
            ));
        }

        let offset = self.kind.correlation_id_offset();
        if SIZE_PREFIX_LENGTH + length < offset + 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame too small for correlation id",
            ));
        }

        if src.len() < SIZE_PREFIX_LENGTH + length {
            // Reserve space for the full frame
            src.reserve(SIZE_PREFIX_LENGTH + length - src.len());
            return Ok(None);
        }

        let bytes = src.split_to(SIZE_PREFIX_LENGTH + length);
        let correlation_id = i32::from_be_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]);

        Ok(Some(KafkaFrame {
            correlation_id,
            bytes,
        }))
    }
}

impl Encoder<Bytes> for KafkaCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn make_response_frame(correlation_id: i32, body: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_i32(4 + body.len() as i32);
        buf.put_i32(correlation_id);
        buf.extend_from_slice(body);
        buf
    }

    fn make_request_frame(api_key: i16, api_version: i16, correlation_id: i32) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_i32(10);
        buf.put_i16(api_key);
        buf.put_i16(api_version);
        buf.put_i32(correlation_id);
        buf.put_i16(-1);
        buf
    }

    #[test]
    fn test_decode_valid_response() {
        let mut codec = KafkaCodec::responses();
        let mut buf = make_response_frame(12345, &[1, 2, 3, 4]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.correlation_id, 12345);
        assert_eq!(frame.bytes.len(), 12);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_valid_request() {
        let mut codec = KafkaCodec::requests();
        let mut buf = make_request_frame(3, 8, 77);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.correlation_id, 77);
        assert_eq!(frame.bytes.len(), 14);
    }

    #[test]
    fn test_decode_incomplete_length() {
        let mut codec = KafkaCodec::responses();
        let mut buf = BytesMut::from(&[0u8, 0, 0][..]);

        let result = codec.decode(&mut buf).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_decode_incomplete_body() {
        let mut codec = KafkaCodec::responses();
        let mut buf = BytesMut::new();
        buf.put_u32(100);
        buf.put_u32(0);

        let result = codec.decode(&mut buf).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn test_decode_frame_too_large() {
        let mut codec = KafkaCodec::responses().with_max_frame_size(100);
        let mut buf = BytesMut::new();
        buf.put_u32(200);

        let result = codec.decode(&mut buf);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_negative_size() {
        let mut codec = KafkaCodec::responses();
        let mut buf = BytesMut::new();
        buf.put_i32(-5);

        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_decode_frame_without_correlation_id() {
        let mut codec = KafkaCodec::responses();
        let mut buf = BytesMut::new();
        buf.put_i32(2);
        buf.put_i16(0);

        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_multiple_frames() {
        let mut codec = KafkaCodec::responses();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&make_response_frame(1, &[9]));
        buf.extend_from_slice(&make_response_frame(2, &[]));

        let frame1 = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame1.correlation_id, 1);

        let frame2 = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame2.correlation_id, 2);

        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_frame_into_buffer_starts_at_size() {
        let mut codec = KafkaCodec::responses();
        let mut buf = make_response_frame(3, &[0, 0, 0, 7]);

        let mut buffer = codec.decode(&mut buf).unwrap().unwrap().into_buffer();
        assert_eq!(buffer.read::<i32>().unwrap(), 8);
        assert_eq!(buffer.read::<i32>().unwrap(), 3);
        assert_eq!(buffer.read::<i32>().unwrap(), 7);
    }

    #[test]
    fn test_encode_passes_bytes_through() {
        let mut codec = KafkaCodec::responses();
        let mut dst = BytesMut::new();

        codec
            .encode(Bytes::from_static(&[0, 0, 0, 1, 9]), &mut dst)
            .unwrap();
        assert_eq!(&dst[..], &[0, 0, 0, 1, 9]);
    }
}
