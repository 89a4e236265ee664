//! Error handling module
//!
//! Defines custom error types for the DemoGame server.

use std::io;

use thiserror::Error;

/// Main error type for the DemoGame server
#[derive(Error, Debug)]
pub enum ServerError {
    /// Spatial index errors
    #[error("Spatial error: {0}")]
    Spatial(#[from] SpatialError),

    /// Protocol-related errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Persistence collaborator errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Game logic errors
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Spatial grid errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpatialError {
    #[error("Segment size {size} is below the minimum of {min}")]
    SegmentTooSmall { size: u32, min: u32 },

    #[error("Invalid grid area: {width}x{height}")]
    InvalidArea { width: f32, height: f32 },
}

/// Protocol-specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Unknown message id: {0}")]
    UnknownMessage(u8),

    #[error("Empty message frame")]
    EmptyFrame,

    #[error("Invalid frame length: {size} bytes (max: {max})")]
    InvalidFrameLength { size: usize, max: usize },

    #[error("Buffer underflow: needed {needed} bytes, {remaining} remaining")]
    BufferUnderflow { needed: usize, remaining: usize },

    #[error("Invalid string encoding")]
    InvalidStringEncoding,

    #[error("Handler already registered for message id {0}")]
    DuplicateHandler(u8),
}

/// Network-specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Too many connections from {0}")]
    TooManyConnections(String),
}

/// Persistence collaborator errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Template not found: {0}")]
    TemplateNotFound(u32),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Game logic errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GameError {
    #[error("Entity not found: {0}")]
    EntityNotFound(u32),

    #[error("Map not found: {0}")]
    MapNotFound(u16),

    #[error("No constructor registered for entity kind '{0}'")]
    UnknownEntityKind(String),

    #[error("Constructor already registered for entity kind '{0}'")]
    DuplicateEntityKind(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),
}

/// Result type alias for DemoGame operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Failure of a single message dispatch.
///
/// Protocol-level failures mean the stream can no longer be trusted and the
/// connection should be dropped. Handler failures only affect the message that
/// produced them.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Unregistered message id: {0}")]
    Unregistered(u8),

    #[error("Empty message frame")]
    EmptyFrame,

    #[error("Handler '{name}' for message {id} failed: {source}")]
    Handler {
        id: u8,
        name: &'static str,
        #[source]
        source: ServerError,
    },
}

impl DispatchError {
    /// Whether the failure is a protocol violation (disconnect-worthy)
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, DispatchError::Unregistered(_) | DispatchError::EmptyFrame)
    }
}

impl From<DispatchError> for ServerError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Unregistered(id) => {
                ServerError::Protocol(ProtocolError::UnknownMessage(id))
            }
            DispatchError::EmptyFrame => ServerError::Protocol(ProtocolError::EmptyFrame),
            DispatchError::Handler { source, .. } => source,
        }
    }
}
