//! DemoGame World Server Library
//!
//! This library provides the core of the DemoGame world server: the spatial
//! index, entity collision and standing resolution, the fixed-step world
//! scheduler and the client message dispatch layer.
//!
//! ## Modules
//!
//! - `config` - Server configuration management
//! - `console` - Administrator console commands
//! - `error` - Error types and result definitions
//! - `game` - World, maps, entities and the update scheduler
//! - `net` - Framing, dispatch, message statistics and sessions
//! - `protocol` - Client and server message definitions
//! - `spatial` - Rectangles and the uniform spatial grid

pub mod config;
pub mod console;
pub mod error;
pub mod game;
pub mod net;
pub mod protocol;
pub mod spatial;
pub mod state;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use state::AppState;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
