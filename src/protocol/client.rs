//! Client message handlers
//!
//! Handlers run on the connection task. They never touch the world directly;
//! movement and chat become [`PlayerAction`]s collected on the
//! [`ClientSession`] and forwarded to the simulation loop.

use std::sync::Arc;

use tracing::trace;

use crate::error::{GameError, ProtocolError, Result};
use crate::game::map::PlayerAction;
use crate::net::buffer::PacketBuffer;
use crate::net::dispatch::{MessageDispatcher, MessageHandler};
use crate::net::session::Session;
use crate::net::stats::MessageStats;
use crate::protocol::messages::{ClientMessage, ServerMessage, MAX_CHAT_LENGTH};

/// Dispatch context for one connection
#[derive(Debug)]
pub struct ClientSession {
    pub session: Arc<Session>,
    actions: Vec<PlayerAction>,
}

impl ClientSession {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            actions: Vec::new(),
        }
    }

    /// Actions decoded since the last drain
    pub fn drain_actions(&mut self) -> std::vec::Drain<'_, PlayerAction> {
        self.actions.drain(..)
    }

    fn push_action(&mut self, action: PlayerAction) -> Result<()> {
        if !self.session.state().can_act() {
            return Err(GameError::InvalidAction(format!(
                "session {} is not in the world",
                self.session.id
            ))
            .into());
        }
        trace!(session_id = self.session.id, action = ?action, "Decoded action");
        self.actions.push(action);
        Ok(())
    }
}

/// Dispatcher with every client message registered
pub fn client_dispatcher(
    stats: Arc<MessageStats>,
) -> std::result::Result<MessageDispatcher<ClientSession>, ProtocolError> {
    let mut dispatcher = MessageDispatcher::new(stats);
    register_client_handlers(&mut dispatcher)?;
    Ok(dispatcher)
}

/// Register the handler for each [`ClientMessage`]
pub fn register_client_handlers(
    dispatcher: &mut MessageDispatcher<ClientSession>,
) -> std::result::Result<(), ProtocolError> {
    for message in ClientMessage::ALL {
        let handler: MessageHandler<ClientSession> = match message {
            ClientMessage::Ping => handle_ping,
            ClientMessage::MoveLeft => handle_move_left,
            ClientMessage::MoveRight => handle_move_right,
            ClientMessage::StopMoving => handle_stop_moving,
            ClientMessage::Jump => handle_jump,
            ClientMessage::Say => handle_say,
        };
        dispatcher.register(message.id(), message.name(), handler)?;
    }
    Ok(())
}

fn handle_ping(ctx: &mut ClientSession, buf: &mut PacketBuffer) -> Result<()> {
    let token = buf.read_u32()?;
    ctx.session.send(&ServerMessage::Pong(token))
}

fn handle_move_left(ctx: &mut ClientSession, _buf: &mut PacketBuffer) -> Result<()> {
    ctx.push_action(PlayerAction::MoveLeft)
}

fn handle_move_right(ctx: &mut ClientSession, _buf: &mut PacketBuffer) -> Result<()> {
    ctx.push_action(PlayerAction::MoveRight)
}

fn handle_stop_moving(ctx: &mut ClientSession, _buf: &mut PacketBuffer) -> Result<()> {
    ctx.push_action(PlayerAction::StopMoving)
}

fn handle_jump(ctx: &mut ClientSession, _buf: &mut PacketBuffer) -> Result<()> {
    ctx.push_action(PlayerAction::Jump)
}

fn handle_say(ctx: &mut ClientSession, buf: &mut PacketBuffer) -> Result<()> {
    let message = buf.read_string()?;
    let message = message.trim();
    if message.is_empty() {
        return Err(GameError::InvalidAction("empty chat message".into()).into());
    }
    if message.len() > MAX_CHAT_LENGTH {
        return Err(GameError::InvalidAction(format!(
            "chat message of {} bytes exceeds {}",
            message.len(),
            MAX_CHAT_LENGTH
        ))
        .into());
    }
    ctx.push_action(PlayerAction::Say(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use crate::game::entity::EntityId;
    use crate::net::sender::ChannelSender;
    use std::net::SocketAddr;

    fn setup() -> (
        MessageDispatcher<ClientSession>,
        ClientSession,
        tokio::sync::mpsc::UnboundedReceiver<bytes::Bytes>,
    ) {
        let dispatcher = client_dispatcher(Arc::new(MessageStats::new())).unwrap();
        let (sender, rx) = ChannelSender::channel();
        let session = Arc::new(Session::new(
            1,
            SocketAddr::from(([127, 0, 0, 1], 4000)),
            Arc::new(sender),
        ));
        session.attach_entity(1, EntityId(1));
        (dispatcher, ClientSession::new(session), rx)
    }

    #[test]
    fn test_all_messages_registered() {
        let (dispatcher, _, _) = setup();
        assert_eq!(dispatcher.registered_ids(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(dispatcher.handler_name(5), Some("say"));
    }

    #[test]
    fn test_ping_answers_pong() {
        let (dispatcher, mut ctx, mut rx) = setup();
        dispatcher
            .dispatch(&mut ctx, ClientMessage::Ping.id(), &[0, 0, 0, 9])
            .unwrap();
        let frame = rx.try_recv().unwrap();
        assert_eq!(&frame[2..], &[ServerMessage::PONG, 0, 0, 0, 9]);
    }

    #[test]
    fn test_movement_collects_actions() {
        let (dispatcher, mut ctx, _rx) = setup();
        dispatcher.dispatch_frame(&mut ctx, &[ClientMessage::MoveRight.id()]).unwrap();
        dispatcher.dispatch_frame(&mut ctx, &[ClientMessage::Jump.id()]).unwrap();

        let actions: Vec<_> = ctx.drain_actions().collect();
        assert_eq!(actions, vec![PlayerAction::MoveRight, PlayerAction::Jump]);
        assert_eq!(ctx.drain_actions().count(), 0);
    }

    #[test]
    fn test_say() {
        let (dispatcher, mut ctx, _rx) = setup();
        let mut payload = PacketBuffer::new();
        payload.write_string("  hello there ");
        dispatcher
            .dispatch(&mut ctx, ClientMessage::Say.id(), payload.as_bytes())
            .unwrap();
        assert_eq!(
            ctx.drain_actions().collect::<Vec<_>>(),
            vec![PlayerAction::Say("hello there".into())]
        );

        let mut long = PacketBuffer::new();
        long.write_string(&"x".repeat(MAX_CHAT_LENGTH + 1));
        let err = dispatcher
            .dispatch(&mut ctx, ClientMessage::Say.id(), long.as_bytes())
            .unwrap_err();
        assert!(matches!(err, DispatchError::Handler { name: "say", .. }));
    }

    #[test]
    fn test_actions_rejected_before_entering_world() {
        let (dispatcher, _, _rx) = setup();
        let (sender, _rx2) = ChannelSender::channel();
        let session = Arc::new(Session::new(
            2,
            SocketAddr::from(([127, 0, 0, 1], 4001)),
            Arc::new(sender),
        ));
        let mut ctx = ClientSession::new(session);

        let err = dispatcher
            .dispatch(&mut ctx, ClientMessage::Jump.id(), &[])
            .unwrap_err();
        assert!(!err.is_protocol_violation());
        assert_eq!(ctx.drain_actions().count(), 0);
    }
}
