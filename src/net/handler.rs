//! Connection handler module
//!
//! Handles the lifecycle of client connections including:
//! - Session registration and the outbound writer task
//! - Frame reading and message dispatch
//! - Forwarding decoded actions to the simulation loop
//! - Graceful disconnection
//!
//! A protocol violation (unknown message id, empty or oversized frame) ends
//! the connection. A handler failure only drops the offending message.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::error::{NetworkError, Result, ServerError};
use crate::game::map::PlayerAction;
use crate::net::sender::ChannelSender;
use crate::net::session::SessionId;
use crate::net::transport::read_frame;
use crate::protocol::client::ClientSession;
use crate::state::AppState;

/// Idle time before a silent client is dropped
const READ_TIMEOUT_SECS: u64 = 60;

/// Connection activity the simulation loop acts on
#[derive(Debug, Clone, PartialEq)]
pub enum IngressEvent {
    /// A client connected and needs an entity
    Connected(SessionId),
    /// A decoded player action
    Action {
        session: SessionId,
        action: PlayerAction,
    },
    /// A client went away
    Disconnected(SessionId),
}

/// Connection handler for processing client connections
pub struct ConnectionHandler {
    state: Arc<AppState>,
}

impl ConnectionHandler {
    /// Create a new connection handler
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Handle a TCP connection
    pub async fn handle_tcp(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(address = %addr, "Handling TCP connection");

        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();

        let (sender, mut outbound_rx) = ChannelSender::channel();
        let session = self
            .state
            .session_manager
            .create_session(addr, Arc::new(sender))?;
        let session_id = session.id;

        let writer_task = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(e) = writer.write_all(&frame).await {
                    debug!(session_id = session_id, error = %e, "Outbound write failed");
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });

        self.forward(IngressEvent::Connected(session_id))?;

        let mut ctx = ClientSession::new(session);
        let mut shutdown_rx = self.state.shutdown_tx.subscribe();
        let result = self.process_connection(&mut reader, &mut ctx, &mut shutdown_rx).await;

        debug!(session_id = session_id, "Connection handler ending");
        self.state.session_manager.remove(session_id);
        if self.forward(IngressEvent::Disconnected(session_id)).is_err() {
            trace!(session_id = session_id, "Simulation loop gone before disconnect");
        }
        writer_task.abort();

        result
    }

    /// Read and dispatch frames until the client leaves or misbehaves
    async fn process_connection<R>(
        &self,
        reader: &mut R,
        ctx: &mut ClientSession,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<()>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let session_id = ctx.session.id;

        loop {
            let frame = tokio::select! {
                read = timeout(Duration::from_secs(READ_TIMEOUT_SECS), read_frame(reader)) => read,
                _ = shutdown_rx.recv() => {
                    debug!(session_id = session_id, "Closing connection for shutdown");
                    return Ok(());
                }
            };

            let frame = match frame {
                Err(_) => {
                    info!(session_id = session_id, "Client timed out");
                    return Ok(());
                }
                Ok(Ok(Some(frame))) => frame,
                Ok(Ok(None)) => {
                    debug!(session_id = session_id, "Connection closed");
                    return Ok(());
                }
                Ok(Err(ServerError::Protocol(e))) => {
                    error!(session_id = session_id, error = %e, "Malformed frame, disconnecting");
                    return Err(e.into());
                }
                Ok(Err(e)) => return Err(e),
            };

            ctx.session.touch();

            if let Err(e) = self.state.dispatcher.dispatch_frame(ctx, &frame) {
                if e.is_protocol_violation() {
                    error!(session_id = session_id, error = %e, "Protocol violation, disconnecting");
                    return Err(e.into());
                }
                warn!(session_id = session_id, error = %e, "Message handler failed");
            }

            let actions: Vec<PlayerAction> = ctx.drain_actions().collect();
            for action in actions {
                self.forward(IngressEvent::Action {
                    session: session_id,
                    action,
                })?;
            }
        }
    }

    fn forward(&self, event: IngressEvent) -> Result<()> {
        self.state
            .ingress_tx
            .send(event)
            .map_err(|_| NetworkError::ConnectionClosed.into())
    }
}

/// Accept incoming game connections until shutdown
pub async fn accept_connections(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        info!("New game connection from: {}", addr);
                        let handler = ConnectionHandler::new(state.clone());
                        tokio::spawn(async move {
                            if let Err(e) = handler.handle_tcp(stream, addr).await {
                                warn!("Game connection error from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept game connection: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Game connection acceptor shutting down");
                break;
            }
        }
    }
}
