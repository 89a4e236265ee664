//! Frame transport
//!
//! Messages travel over a byte stream as length-prefixed frames:
//!
//! ```text
//! [u16 length (big-endian)][u8 message id][payload ...]
//! ```
//!
//! `length` counts the id byte plus the payload, so a valid frame has a
//! length of at least 1.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ProtocolError, Result, ServerError};
use crate::net::buffer::MAX_PACKET_SIZE;

/// Length prefix size
pub const FRAME_HEADER_SIZE: usize = 2;

/// Build a frame for a message
pub fn encode_frame(id: u8, payload: &[u8]) -> std::result::Result<Bytes, ProtocolError> {
    let length = payload.len() + 1;
    if length > MAX_PACKET_SIZE {
        return Err(ProtocolError::InvalidFrameLength {
            size: length,
            max: MAX_PACKET_SIZE,
        });
    }

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + length);
    frame.put_u16(length as u16);
    frame.put_u8(id);
    frame.extend_from_slice(payload);
    Ok(frame.freeze())
}

/// Read one frame body (id byte and payload).
///
/// Returns `Ok(None)` on a clean end of stream between frames. A stream that
/// ends inside a frame is an I/O error; a zero-length frame is a protocol
/// error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<BytesMut>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(ServerError::Io(e)),
    }

    let length = u16::from_be_bytes(header) as usize;
    if length == 0 {
        return Err(ProtocolError::EmptyFrame.into());
    }

    let mut body = BytesMut::zeroed(length);
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}
