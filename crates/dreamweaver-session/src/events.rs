use tokio::sync::broadcast;

use dreamweaver_types::events::ChatListEvent;

/// Fan-out of chat list changes. Cloning shares the same channel.
#[derive(Clone)]
pub struct ChatEvents {
    tx: broadcast::Sender<ChatListEvent>,
}

impl Default for ChatEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatListEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers; dropped silently when nobody listens.
    pub fn publish(&self, event: ChatListEvent) {
        let _ = self.tx.send(event);
    }
}
