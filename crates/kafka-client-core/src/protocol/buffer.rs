//! Fixed-capacity, big-endian wire buffer.
//!
//! A [`Buffer`] is allocated once with the exact size of the packet it will
//! hold, then filled front to back. Reads and writes use independent cursors,
//! and [`Buffer::overwrite`] patches already-written bytes in place (used for
//! the leading size field and the correlation id).
//!
//! Strings are encoded as an `i16` length followed by the raw bytes. A length
//! of `-1` is the null string and decodes to an empty `String`.

use bytes::{Bytes, BytesMut};

use crate::error::{BufferError, BufferResult};

/// Length prefix of the null string.
pub const NULL_STRING_LENGTH: i16 = -1;

/// A fixed-width integer that can be written to and read from the wire.
pub trait WireScalar: Copy {
    /// Encoded width in bytes.
    const SIZE: usize;

    /// Write the big-endian representation into `dst` (exactly `SIZE` bytes).
    fn put(self, dst: &mut [u8]);

    /// Read a big-endian value from `src` (exactly `SIZE` bytes).
    fn get(src: &[u8]) -> Self;
}

macro_rules! impl_wire_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl WireScalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn put(self, dst: &mut [u8]) {
                    dst.copy_from_slice(&self.to_be_bytes());
                }

                fn get(src: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(src);
                    <$ty>::from_be_bytes(raw)
                }
            }
        )*
    };
}

impl_wire_scalar!(i8, u8, i16, u16, i32, u32, i64, u64);

/// Encoded size of a length-prefixed string.
#[must_use]
pub fn string_size(value: &str) -> usize {
    2 + value.len()
}

/// A contiguous byte region with separate read and write cursors.
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    data: BytesMut,
    write_position: usize,
    read_position: usize,
}

impl Buffer {
    /// Create an empty, unallocated buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer with exactly `capacity` writable bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut buffer = Self::new();
        buffer.ensure_allocated(capacity);
        buffer
    }

    /// Wrap bytes received from the network.
    ///
    /// The whole slice counts as written; the read cursor starts at zero.
    #[must_use]
    pub fn from_received(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            write_position: bytes.len(),
            read_position: 0,
        }
    }

    /// Allocate `capacity` zeroed bytes and reset both cursors.
    pub fn ensure_allocated(&mut self, capacity: usize) {
        self.data = BytesMut::zeroed(capacity);
        self.write_position = 0;
        self.read_position = 0;
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.write_position
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.write_position == 0
    }

    /// Total allocated bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes not yet consumed by reads.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.write_position - self.read_position
    }

    /// Current read cursor.
    #[must_use]
    pub fn read_position(&self) -> usize {
        self.read_position
    }

    /// Rewind the read cursor to the start of the buffer.
    pub fn reset_read_position(&mut self) {
        self.read_position = 0;
    }

    /// The written bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.write_position]
    }

    /// Consume the buffer, returning the written bytes.
    #[must_use]
    pub fn freeze(mut self) -> Bytes {
        self.data.truncate(self.write_position);
        self.data.freeze()
    }

    /// Append `value` in big-endian order, returning the offset it was written at.
    pub fn write<T: WireScalar>(&mut self, value: T) -> BufferResult<usize> {
        let offset = self.reserve(T::SIZE)?;
        value.put(&mut self.data[offset..offset + T::SIZE]);
        Ok(offset)
    }

    /// Consume a big-endian value at the read cursor.
    pub fn read<T: WireScalar>(&mut self) -> BufferResult<T> {
        let offset = self.consume(T::SIZE)?;
        Ok(T::get(&self.data[offset..offset + T::SIZE]))
    }

    /// Replace already-written bytes at `offset` without moving either cursor.
    pub fn overwrite<T: WireScalar>(&mut self, offset: usize, value: T) -> BufferResult<()> {
        let end = offset
            .checked_add(T::SIZE)
            .filter(|end| *end <= self.write_position)
            .ok_or(BufferError::OverwriteOutOfBounds {
                offset,
                needed: T::SIZE,
                written: self.write_position,
            })?;
        value.put(&mut self.data[offset..end]);
        Ok(())
    }

    /// Append a boolean as a single byte.
    pub fn write_bool(&mut self, value: bool) -> BufferResult<usize> {
        self.write::<u8>(u8::from(value))
    }

    /// Consume a single-byte boolean; only `1` is true.
    pub fn read_bool(&mut self) -> BufferResult<bool> {
        Ok(self.read::<u8>()? == 1)
    }

    /// Append a length-prefixed string, returning the offset of its prefix.
    pub fn write_string(&mut self, value: &str) -> BufferResult<usize> {
        let length =
            i16::try_from(value.len()).map_err(|_| BufferError::StringTooLong(value.len()))?;
        if self.write_position + string_size(value) > self.capacity() {
            return Err(BufferError::Overflow {
                offset: self.write_position,
                needed: string_size(value),
                capacity: self.capacity(),
            });
        }
        let offset = self.write::<i16>(length)?;
        self.write_data(value.as_bytes())?;
        Ok(offset)
    }

    /// Consume a length-prefixed string; the null string reads as empty.
    pub fn read_string(&mut self) -> BufferResult<String> {
        let length = self.read::<i16>()?;
        if length == NULL_STRING_LENGTH {
            return Ok(String::new());
        }
        let length = usize::try_from(length).map_err(|_| BufferError::InvalidStringLength(length))?;
        let offset = self.consume(length)?;
        String::from_utf8(self.data[offset..offset + length].to_vec())
            .map_err(|_| BufferError::InvalidUtf8)
    }

    /// Append raw bytes, returning the offset they start at.
    pub fn write_data(&mut self, bytes: &[u8]) -> BufferResult<usize> {
        let offset = self.reserve(bytes.len())?;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(offset)
    }

    fn reserve(&mut self, needed: usize) -> BufferResult<usize> {
        let offset = self.write_position;
        if offset + needed > self.capacity() {
            return Err(BufferError::Overflow {
                offset,
                needed,
                capacity: self.capacity(),
            });
        }
        self.write_position += needed;
        Ok(offset)
    }

    fn consume(&mut self, needed: usize) -> BufferResult<usize> {
        let offset = self.read_position;
        if offset + needed > self.write_position {
            return Err(BufferError::Underflow {
                offset,
                needed,
                written: self.write_position,
            });
        }
        self.read_position += needed;
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_true_boolean_encoding() {
        let mut buffer = Buffer::with_capacity(1);
        buffer.write_bool(true).unwrap();

        assert_eq!(buffer.as_slice(), &[1]);
        assert!(buffer.read_bool().unwrap());
    }

    #[test]
    fn test_false_boolean_encoding() {
        let mut buffer = Buffer::with_capacity(1);
        buffer.write_bool(false).unwrap();

        assert_eq!(buffer.as_slice(), &[0]);
        assert!(!buffer.read_bool().unwrap());
    }

    #[test]
    fn test_short_encoding() {
        let mut buffer = Buffer::with_capacity(2);
        buffer.write::<i16>(255).unwrap();

        assert_eq!(buffer.as_slice(), &[0x00, 0xFF]);
        assert_eq!(buffer.read::<i16>().unwrap(), 255);
    }

    #[test]
    fn test_int_encoding() {
        let mut buffer = Buffer::with_capacity(4);
        let offset = buffer.write::<i32>(128_000).unwrap();

        assert_eq!(offset, 0);
        assert_eq!(buffer.as_slice(), &[0x00, 0x01, 0xF4, 0x00]);
        assert_eq!(buffer.read::<i32>().unwrap(), 128_000);
    }

    #[test]
    fn test_long_encoding() {
        let mut buffer = Buffer::with_capacity(8);
        buffer.write::<i64>(-849_018_880).unwrap();

        assert_eq!(
            buffer.as_slice(),
            &[0xFF, 0xFF, 0xFF, 0xFF, 0xCD, 0x65, 0x00, 0x00]
        );
        assert_eq!(buffer.read::<i64>().unwrap(), -849_018_880);
    }

    #[test]
    fn test_string_encoding() {
        let mut buffer = Buffer::with_capacity(6);
        buffer.write_string("test").unwrap();

        assert_eq!(buffer.as_slice(), &[0x00, 0x04, b't', b'e', b's', b't']);
        assert_eq!(buffer.read_string().unwrap(), "test");
    }

    #[test]
    fn test_null_string_reads_as_empty() {
        let mut buffer = Buffer::with_capacity(2);
        buffer.write::<i16>(NULL_STRING_LENGTH).unwrap();

        assert_eq!(buffer.read_string().unwrap(), "");
        assert_eq!(buffer.remaining(), 0);
    }

    #[test]
    fn test_empty_string() {
        let mut buffer = Buffer::with_capacity(2);
        buffer.write_string("").unwrap();

        assert_eq!(buffer.as_slice(), &[0x00, 0x00]);
        assert_eq!(buffer.read_string().unwrap(), "");
    }

    #[test]
    fn test_overwrite_int() {
        let mut buffer = Buffer::with_capacity(8);
        let offset = buffer.write::<i32>(128_000).unwrap();
        buffer.write::<i32>(8).unwrap();

        assert_eq!(buffer.read::<i32>().unwrap(), 128_000);
        assert_eq!(buffer.read::<i32>().unwrap(), 8);

        buffer.overwrite::<i32>(offset, 96_000).unwrap();
        buffer.reset_read_position();
        assert_eq!(buffer.read::<i32>().unwrap(), 96_000);
        assert_eq!(buffer.read::<i32>().unwrap(), 8);
    }

    #[test]
    fn test_overwrite_does_not_move_cursors() {
        let mut buffer = Buffer::with_capacity(6);
        buffer.write::<i32>(0).unwrap();
        buffer.read::<i16>().unwrap();

        buffer.overwrite::<i32>(0, 7).unwrap();
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.read_position(), 2);
    }

    #[test]
    fn test_write_past_capacity_fails() {
        let mut buffer = Buffer::with_capacity(3);
        let result = buffer.write::<i32>(1);

        assert!(matches!(result, Err(BufferError::Overflow { needed: 4, .. })));
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn test_string_past_capacity_writes_nothing() {
        let mut buffer = Buffer::with_capacity(4);
        let result = buffer.write_string("test");

        assert!(matches!(result, Err(BufferError::Overflow { .. })));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_read_past_write_cursor_fails() {
        let mut buffer = Buffer::with_capacity(8);
        buffer.write::<i16>(1).unwrap();

        let result = buffer.read::<i32>();
        assert!(matches!(result, Err(BufferError::Underflow { written: 2, .. })));
    }

    #[test]
    fn test_overwrite_unwritten_bytes_fails() {
        let mut buffer = Buffer::with_capacity(8);
        buffer.write::<i16>(1).unwrap();

        let result = buffer.overwrite::<i32>(0, 5);
        assert!(matches!(
            result,
            Err(BufferError::OverwriteOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_negative_string_length_rejected() {
        let mut buffer = Buffer::with_capacity(2);
        buffer.write::<i16>(-3).unwrap();

        assert_eq!(
            buffer.read_string(),
            Err(BufferError::InvalidStringLength(-3))
        );
    }

    #[test]
    fn test_string_too_long_rejected() {
        let value = "x".repeat(i16::MAX as usize + 1);
        let mut buffer = Buffer::with_capacity(value.len() + 2);

        assert_eq!(
            buffer.write_string(&value),
            Err(BufferError::StringTooLong(value.len()))
        );
    }

    #[test]
    fn test_from_received_and_freeze() {
        let mut buffer = Buffer::from_received(&[0, 0, 0, 4, 0, 0, 0, 9]);
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.read::<i32>().unwrap(), 4);
        assert_eq!(buffer.read::<i32>().unwrap(), 9);

        let bytes = buffer.freeze();
        assert_eq!(bytes.len(), 8);
    }

    #[test]
    fn test_freeze_drops_unwritten_tail() {
        let mut buffer = Buffer::with_capacity(10);
        buffer.write::<i16>(3).unwrap();

        assert_eq!(buffer.freeze().as_ref(), &[0, 3]);
    }
}
