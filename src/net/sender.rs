//! Outbound message path
//!
//! The simulation never touches sockets. It hands encoded frames to a
//! [`NetworkSender`], and each connection's writer task drains its channel.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{NetworkError, Result};
use crate::net::transport::encode_frame;
use crate::protocol::messages::ServerMessage;

/// Something that can deliver a message to one client
pub trait NetworkSender: Send + Sync {
    /// Queue a raw message
    fn send(&self, id: u8, payload: &[u8]) -> Result<()>;

    /// Queue a typed server message
    fn send_message(&self, message: &ServerMessage) -> Result<()> {
        self.send(message.id(), message.encode().as_bytes())
    }
}

/// Sender backed by the connection's outbound channel
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ChannelSender {
    pub fn new(tx: mpsc::UnboundedSender<Bytes>) -> Self {
        Self { tx }
    }

    /// Sender plus the receiving end for the writer task
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl NetworkSender for ChannelSender {
    fn send(&self, id: u8, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(id, payload)?;
        self.tx
            .send(frame)
            .map_err(|_| NetworkError::ConnectionClosed.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;

    #[test]
    fn test_channel_sender_frames_messages() {
        let (sender, mut rx) = ChannelSender::channel();
        sender.send_message(&ServerMessage::Pong(7)).unwrap();

        let frame = rx.try_recv().unwrap();
        assert_eq!(&frame[..], &[0, 5, ServerMessage::PONG, 0, 0, 0, 7]);
    }

    #[test]
    fn test_send_after_close() {
        let (sender, rx) = ChannelSender::channel();
        drop(rx);
        assert!(sender.is_closed());
        assert!(matches!(
            sender.send(1, &[]),
            Err(ServerError::Network(NetworkError::ConnectionClosed))
        ));
    }
}
