use super::traits::FrameHandler;
use crate::message::ServerFrame;
use crate::session::RoomSession;
use std::collections::HashMap;
use std::sync::Arc;

/// Central router for dispatching inbound frames to their handlers.
///
/// The router maintains a registry of handlers keyed by the envelope
/// `type` tag and dispatches each frame to the matching handler.
pub struct FrameRouter {
    handlers: HashMap<&'static str, Arc<dyn FrameHandler>>,
}

impl FrameRouter {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under every kind it declares.
    ///
    /// # Panics
    /// Panics if a handler is already registered for one of the kinds,
    /// to prevent accidental overwrites during initialization.
    pub fn register(&mut self, handler: Arc<dyn FrameHandler>) {
        for kind in handler.kinds() {
            if self.handlers.insert(kind, handler.clone()).is_some() {
                panic!("Handler for frame kind '{}' already registered", kind);
            }
        }
    }

    /// Dispatch a frame to its handler. Returns `false` when no handler
    /// is registered for the frame's kind.
    pub async fn dispatch(&self, session: Arc<RoomSession>, frame: &ServerFrame) -> bool {
        if let Some(handler) = self.handlers.get(frame.kind()) {
            handler.handle(session, frame).await
        } else {
            false
        }
    }

    /// Number of registered frame kinds (useful for testing).
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for FrameRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct MockHandler {
        kinds: &'static [&'static str],
    }

    #[async_trait]
    impl FrameHandler for MockHandler {
        fn kinds(&self) -> &'static [&'static str] {
            self.kinds
        }

        async fn handle(&self, _session: Arc<RoomSession>, _frame: &ServerFrame) -> bool {
            true
        }
    }

    #[test]
    fn registration_counts_every_kind() {
        let mut router = FrameRouter::new();
        router.register(Arc::new(MockHandler {
            kinds: &["roster_update"],
        }));
        router.register(Arc::new(MockHandler {
            kinds: &["new_message", "private_message"],
        }));
        assert_eq!(router.handler_count(), 3);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn double_registration_panics() {
        let mut router = FrameRouter::new();
        router.register(Arc::new(MockHandler {
            kinds: &["typing_indicator"],
        }));
        router.register(Arc::new(MockHandler {
            kinds: &["typing_indicator"],
        }));
    }
}
