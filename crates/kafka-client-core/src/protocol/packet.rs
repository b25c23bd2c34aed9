//! Packet framing shared by every request and response.
//!
//! Every packet starts with a 4-byte size that counts the bytes after it.
//! Requests reserve the size slot, write their payload and backpatch the
//! size once the total is known. Responses read it back followed by the
//! echoed correlation id.
//!
//! Request layout:
//!
//! ```text
//! [size:i32][api_key:i16][api_version:i16][correlation_id:i32][client_id:i16=-1] payload...
//! ```

use super::buffer::{Buffer, NULL_STRING_LENGTH};
use crate::error::BufferResult;

/// Width of the leading size field.
pub const SIZE_PREFIX_LENGTH: usize = 4;

/// Byte offset of the correlation id inside a serialized request.
pub const CORRELATION_ID_OFFSET: usize = 8;

/// Serialized size of [`RequestHeader`], including the size prefix.
pub const REQUEST_HEADER_SIZE: usize = SIZE_PREFIX_LENGTH + 2 + 2 + 4 + 2;

/// Serialized size of [`ResponseHeader`].
pub const RESPONSE_HEADER_SIZE: usize = SIZE_PREFIX_LENGTH + 4;

/// A packet that knows its exact serialized size up front.
pub trait Encodable {
    /// Exact number of bytes [`Encodable::write`] produces.
    fn size(&self) -> usize;

    /// Serialize into `buffer`.
    fn write(&self, buffer: &mut Buffer) -> BufferResult<()>;
}

/// A packet that can be parsed from a buffer.
pub trait Decodable: Sized {
    /// Parse from the buffer's read cursor.
    fn read(buffer: &mut Buffer) -> BufferResult<Self>;
}

/// Allocate a buffer of exactly `packet.size()` bytes and serialize into it.
pub fn encode<P: Encodable>(packet: &P) -> BufferResult<Buffer> {
    let mut buffer = Buffer::with_capacity(packet.size());
    packet.write(&mut buffer)?;
    debug_assert_eq!(buffer.len(), packet.size(), "size() disagrees with write()");
    Ok(buffer)
}

/// Parse a packet from the start of `buffer`.
pub fn decode<P: Decodable>(buffer: &mut Buffer) -> BufferResult<P> {
    buffer.reset_read_position();
    P::read(buffer)
}

/// Reserve the size slot, returning its offset for [`end_frame`].
pub fn begin_frame(buffer: &mut Buffer) -> BufferResult<usize> {
    buffer.write::<i32>(0)
}

/// Backpatch the size slot at `size_offset` with the bytes written after it.
pub fn end_frame(buffer: &mut Buffer, size_offset: usize) -> BufferResult<()> {
    let size = buffer.len() - size_offset - SIZE_PREFIX_LENGTH;
    // Frames are sized from Encodable::size, so a size past i32::MAX cannot
    // have been allocated in the first place.
    buffer.overwrite::<i32>(size_offset, size as i32)
}

/// Common header of every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// API being called.
    pub api_key: i16,
    /// Version of the API schema.
    pub api_version: i16,
    /// Assigned by the transport when the request is sent.
    pub correlation_id: i32,
}

impl RequestHeader {
    /// Create a header; the correlation id is filled in later.
    #[must_use]
    pub fn new(api_key: i16, api_version: i16) -> Self {
        Self {
            api_key,
            api_version,
            correlation_id: 0,
        }
    }

    /// Start a request frame. Returns the size offset to pass to [`end_frame`].
    pub fn write(&self, buffer: &mut Buffer) -> BufferResult<usize> {
        let size_offset = begin_frame(buffer)?;
        buffer.write::<i16>(self.api_key)?;
        buffer.write::<i16>(self.api_version)?;
        buffer.write::<i32>(self.correlation_id)?;
        // Client ids are not supported yet; always send the null string.
        buffer.write::<i16>(NULL_STRING_LENGTH)?;
        Ok(size_offset)
    }

    /// Parse a request header, skipping the client id.
    pub fn read(buffer: &mut Buffer) -> BufferResult<(i32, Self)> {
        let size = buffer.read::<i32>()?;
        let api_key = buffer.read::<i16>()?;
        let api_version = buffer.read::<i16>()?;
        let correlation_id = buffer.read::<i32>()?;
        buffer.read_string()?;
        Ok((
            size,
            Self {
                api_key,
                api_version,
                correlation_id,
            },
        ))
    }
}

/// Common header of every response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Bytes following the size field.
    pub size: i32,
    /// Echo of the request's correlation id.
    pub correlation_id: i32,
}

impl ResponseHeader {
    /// Start a response frame. Returns the size offset to pass to [`end_frame`].
    pub fn write(&self, buffer: &mut Buffer) -> BufferResult<usize> {
        let size_offset = begin_frame(buffer)?;
        buffer.write::<i32>(self.correlation_id)?;
        Ok(size_offset)
    }
}

impl Decodable for ResponseHeader {
    fn read(buffer: &mut Buffer) -> BufferResult<Self> {
        let size = buffer.read::<i32>()?;
        let correlation_id = buffer.read::<i32>()?;
        Ok(Self {
            size,
            correlation_id,
        })
    }
}
