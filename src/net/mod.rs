//! Networking module
//!
//! This module handles all network-related functionality for the DemoGame server:
//! - Payload buffers and length-prefixed framing
//! - Message dispatch and per-message statistics
//! - Session management
//! - TCP connection lifecycle

pub mod buffer;
pub mod dispatch;
pub mod handler;
pub mod sender;
pub mod session;
pub mod stats;
pub mod transport;

pub use buffer::PacketBuffer;
pub use dispatch::MessageDispatcher;
pub use handler::IngressEvent;
pub use sender::{ChannelSender, NetworkSender};
pub use stats::{MessageStats, ProcessorStats};
