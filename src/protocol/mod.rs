//! Protocol module
//!
//! Message ids and the client message handlers:
//! - Client and server message definitions
//! - Handlers turning client messages into player actions

pub mod client;
pub mod messages;

pub use client::{register_client_handlers, ClientSession};
pub use messages::{ClientMessage, ServerMessage};
