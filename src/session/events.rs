use tokio::sync::broadcast;

use crate::store::StoredMessage;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Message { code: String, message: StoredMessage },
    /// The session was swept; subscribers should stop listening.
    Closed { code: String },
}

impl SessionEvent {
    pub fn code(&self) -> &str {
        match self {
            Self::Message { code, .. } | Self::Closed { code } => code,
        }
    }
}

/// Fan-out of log activity to every live stream, shared by the HTTP layer and the sweeper job.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of subscribers reached; zero when nobody is listening.
    pub fn publish(&self, event: SessionEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}
