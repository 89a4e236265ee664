//! Message identifiers
//!
//! Every frame carries one message: a single id byte followed by the payload.
//! Client and server ids are separate spaces.

use crate::error::ProtocolError;
use crate::net::buffer::PacketBuffer;

/// Longest chat line accepted from a client, in bytes
pub const MAX_CHAT_LENGTH: usize = 80;

/// Client to server message ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientMessage {
    /// Latency probe, echoed back as `Pong` (u32 token)
    Ping = 0,
    MoveLeft = 1,
    MoveRight = 2,
    StopMoving = 3,
    Jump = 4,
    /// Chat line (string)
    Say = 5,
}

impl ClientMessage {
    pub const ALL: [ClientMessage; 6] = [
        ClientMessage::Ping,
        ClientMessage::MoveLeft,
        ClientMessage::MoveRight,
        ClientMessage::StopMoving,
        ClientMessage::Jump,
        ClientMessage::Say,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Handler name used in logs and stats
    pub fn name(self) -> &'static str {
        match self {
            ClientMessage::Ping => "ping",
            ClientMessage::MoveLeft => "move_left",
            ClientMessage::MoveRight => "move_right",
            ClientMessage::StopMoving => "stop_moving",
            ClientMessage::Jump => "jump",
            ClientMessage::Say => "say",
        }
    }
}

impl TryFrom<u8> for ClientMessage {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ClientMessage::ALL
            .into_iter()
            .find(|message| message.id() == value)
            .ok_or(ProtocolError::UnknownMessage(value))
    }
}

/// Server to client messages
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Sent once the client's entity exists
    Welcome { map: u16, entity: u32 },
    /// Reply to `Ping`
    Pong(u32),
    /// Chat line from an entity on the same map
    Chat { entity: u32, message: String },
}

impl ServerMessage {
    pub const WELCOME: u8 = 0;
    pub const PONG: u8 = 1;
    pub const CHAT: u8 = 2;

    pub fn id(&self) -> u8 {
        match self {
            ServerMessage::Welcome { .. } => Self::WELCOME,
            ServerMessage::Pong(_) => Self::PONG,
            ServerMessage::Chat { .. } => Self::CHAT,
        }
    }

    /// Encode the payload (without the id byte)
    pub fn encode(&self) -> PacketBuffer {
        let mut buf = PacketBuffer::with_capacity(8);
        match self {
            ServerMessage::Welcome { map, entity } => {
                buf.write_u16(*map);
                buf.write_u32(*entity);
            }
            ServerMessage::Pong(token) => buf.write_u32(*token),
            ServerMessage::Chat { entity, message } => {
                buf.write_u32(*entity);
                buf.write_string(message);
            }
        }
        buf
    }

    /// Decode a payload for the given id
    pub fn decode(id: u8, buf: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        match id {
            Self::WELCOME => Ok(ServerMessage::Welcome {
                map: buf.read_u16()?,
                entity: buf.read_u32()?,
            }),
            Self::PONG => Ok(ServerMessage::Pong(buf.read_u32()?)),
            Self::CHAT => Ok(ServerMessage::Chat {
                entity: buf.read_u32()?,
                message: buf.read_string()?,
            }),
            other => Err(ProtocolError::UnknownMessage(other)),
        }
    }
}
