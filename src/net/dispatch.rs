//! Message dispatch
//!
//! Routes a decoded message to the handler registered for its id. The table
//! is filled at startup and shared read-only between connections.

use std::sync::Arc;

use bytes::BytesMut;
use tracing::trace;

use crate::error::{DispatchError, ProtocolError, Result};
use crate::net::buffer::PacketBuffer;
use crate::net::stats::MessageStats;

/// Message handler: reads its payload and acts on the context
pub type MessageHandler<C> = fn(&mut C, &mut PacketBuffer) -> Result<()>;

struct Registration<C> {
    name: &'static str,
    handler: MessageHandler<C>,
}

/// Registration table from message id to handler
pub struct MessageDispatcher<C> {
    handlers: Vec<Option<Registration<C>>>,
    stats: Arc<MessageStats>,
}

impl<C> MessageDispatcher<C> {
    /// Empty table recording into `stats`
    pub fn new(stats: Arc<MessageStats>) -> Self {
        Self {
            handlers: (0..=u8::MAX).map(|_| None).collect(),
            stats,
        }
    }

    /// Register a handler. Each id takes exactly one handler.
    pub fn register(
        &mut self,
        id: u8,
        name: &'static str,
        handler: MessageHandler<C>,
    ) -> std::result::Result<(), ProtocolError> {
        let slot = &mut self.handlers[id as usize];
        if slot.is_some() {
            return Err(ProtocolError::DuplicateHandler(id));
        }
        *slot = Some(Registration { name, handler });
        Ok(())
    }

    pub fn is_registered(&self, id: u8) -> bool {
        self.handlers[id as usize].is_some()
    }

    /// Name a handler was registered under
    pub fn handler_name(&self, id: u8) -> Option<&'static str> {
        self.handlers[id as usize].as_ref().map(|r| r.name)
    }

    /// Registered ids in ascending order
    pub fn registered_ids(&self) -> Vec<u8> {
        self.handlers
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(id, _)| id as u8)
            .collect()
    }

    pub fn stats(&self) -> &Arc<MessageStats> {
        &self.stats
    }

    /// Run the handler for `id` over `payload`.
    ///
    /// Stats are recorded once the handler returns, for every registered id,
    /// whether or not the handler succeeds.
    pub fn dispatch(
        &self,
        ctx: &mut C,
        id: u8,
        payload: &[u8],
    ) -> std::result::Result<(), DispatchError> {
        let registration = self.handlers[id as usize]
            .as_ref()
            .ok_or(DispatchError::Unregistered(id))?;

        let mut buffer = PacketBuffer::wrap(BytesMut::from(payload));
        let bits = buffer.length_bits();
        trace!(id, handler = registration.name, bytes = payload.len(), "Dispatching message");

        let outcome = (registration.handler)(ctx, &mut buffer);
        self.stats.query_executed(id, bits);

        outcome.map_err(|source| DispatchError::Handler {
            id,
            name: registration.name,
            source,
        })
    }

    /// Dispatch a frame whose first byte is the message id
    pub fn dispatch_frame(&self, ctx: &mut C, frame: &[u8]) -> std::result::Result<(), DispatchError> {
        let (&id, payload) = frame.split_first().ok_or(DispatchError::EmptyFrame)?;
        self.dispatch(ctx, id, payload)
    }
}

impl<C> std::fmt::Debug for MessageDispatcher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("registered", &self.registered_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GameError, ServerError};

    #[derive(Default)]
    struct Ctx {
        values: Vec<u32>,
    }

    fn push_value(ctx: &mut Ctx, buf: &mut PacketBuffer) -> Result<()> {
        ctx.values.push(buf.read_u32()?);
        Ok(())
    }

    fn always_fails(_ctx: &mut Ctx, _buf: &mut PacketBuffer) -> Result<()> {
        Err(GameError::InvalidAction("nope".into()).into())
    }

    fn dispatcher() -> MessageDispatcher<Ctx> {
        let mut dispatcher = MessageDispatcher::new(Arc::new(MessageStats::new()));
        dispatcher.register(1, "push_value", push_value).unwrap();
        dispatcher.register(2, "always_fails", always_fails).unwrap();
        dispatcher
    }

    #[test]
    fn test_dispatch_to_handler() {
        let dispatcher = dispatcher();
        let mut ctx = Ctx::default();
        dispatcher.dispatch(&mut ctx, 1, &[0, 0, 1, 0]).unwrap();
        assert_eq!(ctx.values, vec![256]);
        assert_eq!(dispatcher.handler_name(1), Some("push_value"));
        assert_eq!(dispatcher.registered_ids(), vec![1, 2]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut dispatcher = dispatcher();
        assert_eq!(
            dispatcher.register(1, "again", push_value),
            Err(ProtocolError::DuplicateHandler(1))
        );
        assert_eq!(dispatcher.handler_name(1), Some("push_value"));
    }

    #[test]
    fn test_unregistered_is_protocol_error() {
        let dispatcher = dispatcher();
        let err = dispatcher.dispatch(&mut Ctx::default(), 99, &[]).unwrap_err();
        assert!(matches!(err, DispatchError::Unregistered(99)));
        assert!(err.is_protocol_violation());
        assert!(dispatcher.stats().get_stats(99).is_none());
    }

    #[test]
    fn test_handler_error_is_application_error() {
        let dispatcher = dispatcher();
        let mut ctx = Ctx::default();

        let err = dispatcher.dispatch(&mut ctx, 2, &[1, 2]).unwrap_err();
        assert!(!err.is_protocol_violation());
        assert!(matches!(
            err,
            DispatchError::Handler {
                id: 2,
                name: "always_fails",
                source: ServerError::Game(_)
            }
        ));
        assert_eq!(dispatcher.stats().get_stats(2).unwrap().calls, 1);

        // Truncated payload fails inside the handler, not the dispatcher
        let err = dispatcher.dispatch(&mut ctx, 1, &[0]).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Handler {
                source: ServerError::Protocol(ProtocolError::BufferUnderflow { .. }),
                ..
            }
        ));

        // Later messages still go through
        dispatcher.dispatch(&mut ctx, 1, &[0, 0, 0, 5]).unwrap();
        assert_eq!(ctx.values, vec![5]);
    }

    #[test]
    fn test_dispatch_frame() {
        let dispatcher = dispatcher();
        let mut ctx = Ctx::default();
        dispatcher.dispatch_frame(&mut ctx, &[1, 0, 0, 0, 9]).unwrap();
        assert_eq!(ctx.values, vec![9]);

        assert!(matches!(
            dispatcher.dispatch_frame(&mut ctx, &[]),
            Err(DispatchError::EmptyFrame)
        ));
    }

    #[test]
    fn test_stats_recorded_per_dispatch() {
        let dispatcher = dispatcher();
        let mut ctx = Ctx::default();
        dispatcher.dispatch(&mut ctx, 1, &[0, 0, 0, 1]).unwrap();
        dispatcher.dispatch(&mut ctx, 1, &[0, 0, 0, 2, 7, 7]).unwrap();

        let stats = dispatcher.stats().get_stats(1).unwrap();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.total_bits, 80);
        assert_eq!(stats.min_bits, 32);
        assert_eq!(stats.max_bits, 48);
    }

    struct Watcher {
        stats: Arc<MessageStats>,
        calls_seen: Vec<u64>,
    }

    fn watch_calls(ctx: &mut Watcher, _buf: &mut PacketBuffer) -> Result<()> {
        let calls = ctx.stats.get_stats(3).map_or(0, |record| record.calls);
        ctx.calls_seen.push(calls);
        Ok(())
    }

    #[test]
    fn test_stats_recorded_after_handler_runs() {
        let stats = Arc::new(MessageStats::new());
        let mut dispatcher = MessageDispatcher::new(stats.clone());
        dispatcher.register(3, "watch_calls", watch_calls).unwrap();

        let mut ctx = Watcher {
            stats: stats.clone(),
            calls_seen: Vec::new(),
        };
        dispatcher.dispatch(&mut ctx, 3, &[1]).unwrap();
        dispatcher.dispatch(&mut ctx, 3, &[1, 2]).unwrap();

        // Each handler sees only the dispatches that finished before it
        assert_eq!(ctx.calls_seen, vec![0, 1]);
        let record = stats.get_stats(3).unwrap();
        assert_eq!(record.calls, 2);
        assert_eq!(record.total_bits, 24);
    }
}
