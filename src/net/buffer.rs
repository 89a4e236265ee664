//! Packet buffer implementation
//!
//! Provides a byte buffer for message payloads:
//! - Big-endian integer and float types
//! - Null-terminated UTF-8 strings
//! - Bit length accounting for message statistics
//!
//! Reads are checked; running past the end is a protocol error instead of a
//! silent zero.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtocolError;

/// Maximum packet size (64KB)
pub const MAX_PACKET_SIZE: usize = 65535;

type ReadResult<T> = std::result::Result<T, ProtocolError>;

/// Packet buffer for reading and writing message payloads
#[derive(Debug, Clone, Default)]
pub struct PacketBuffer {
    /// Internal byte buffer
    data: BytesMut,
    /// Current read position
    read_pos: usize,
}

impl PacketBuffer {
    /// Create a new empty packet buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a packet buffer with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            read_pos: 0,
        }
    }

    /// Create a packet buffer from existing bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            read_pos: 0,
        }
    }

    /// Create a packet buffer by wrapping a BytesMut
    pub fn wrap(data: BytesMut) -> Self {
        Self { data, read_pos: 0 }
    }

    // ============ Properties ============

    /// Get the current read position
    #[inline]
    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    /// Get the total length of the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the whole payload in bits
    #[inline]
    pub fn length_bits(&self) -> u32 {
        (self.data.len() as u32).saturating_mul(8)
    }

    /// Get the number of bytes remaining to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.read_pos)
    }

    /// Check if there are bytes remaining to read
    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Get a reference to the underlying bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reset read position to start
    pub fn reset(&mut self) {
        self.read_pos = 0;
    }

    fn ensure(&self, needed: usize) -> ReadResult<()> {
        let remaining = self.remaining();
        if remaining < needed {
            return Err(ProtocolError::BufferUnderflow { needed, remaining });
        }
        Ok(())
    }

    fn unread(&self) -> &[u8] {
        &self.data[self.read_pos..]
    }

    // ============ Reading Methods (Big-Endian) ============

    /// Read an unsigned byte
    pub fn read_u8(&mut self) -> ReadResult<u8> {
        self.ensure(1)?;
        let value = self.unread().get_u8();
        self.read_pos += 1;
        Ok(value)
    }

    /// Read an unsigned big-endian short (2 bytes)
    pub fn read_u16(&mut self) -> ReadResult<u16> {
        self.ensure(2)?;
        let value = self.unread().get_u16();
        self.read_pos += 2;
        Ok(value)
    }

    /// Read an unsigned big-endian int (4 bytes)
    pub fn read_u32(&mut self) -> ReadResult<u32> {
        self.ensure(4)?;
        let value = self.unread().get_u32();
        self.read_pos += 4;
        Ok(value)
    }

    /// Read a signed big-endian int (4 bytes)
    pub fn read_i32(&mut self) -> ReadResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Read a big-endian IEEE 754 float (4 bytes)
    pub fn read_f32(&mut self) -> ReadResult<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    // ============ String Reading ============

    /// Read a null-terminated string
    pub fn read_string(&mut self) -> ReadResult<String> {
        let unread = self.unread();
        let Some(end) = unread.iter().position(|&b| b == 0) else {
            return Err(ProtocolError::BufferUnderflow {
                needed: unread.len() + 1,
                remaining: unread.len(),
            });
        };
        let value = std::str::from_utf8(&unread[..end])
            .map_err(|_| ProtocolError::InvalidStringEncoding)?
            .to_owned();
        self.read_pos += end + 1;
        Ok(value)
    }

    // ============ Writing Methods (Big-Endian) ============

    /// Write an unsigned byte
    pub fn write_u8(&mut self, value: u8) {
        self.data.put_u8(value);
    }

    /// Write an unsigned big-endian short (2 bytes)
    pub fn write_u16(&mut self, value: u16) {
        self.data.put_u16(value);
    }

    /// Write an unsigned big-endian int (4 bytes)
    pub fn write_u32(&mut self, value: u32) {
        self.data.put_u32(value);
    }

    /// Write a signed big-endian int (4 bytes)
    pub fn write_i32(&mut self, value: i32) {
        self.data.put_i32(value);
    }

    /// Write a big-endian IEEE 754 float (4 bytes)
    pub fn write_f32(&mut self, value: f32) {
        self.data.put_f32(value);
    }

    // ============ String Writing ============

    /// Write a null-terminated string. Interior nulls end the string early on
    /// the reading side, so they are dropped.
    pub fn write_string(&mut self, value: &str) {
        self.data
            .extend(value.as_bytes().iter().copied().filter(|&b| b != 0));
        self.data.put_u8(0);
    }
}

impl AsRef<[u8]> for PacketBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
