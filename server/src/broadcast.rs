//! Notification fan-out to WebSocket clients.
//!
//! Whenever the checklist or the todo cache changes, the server broadcasts a
//! [`Notification`] through a tokio broadcast channel. Each WebSocket client
//! holds its own receiver, so a slow client only lags itself.
//!
//! # Wire format
//!
//! Notifications serialize with a `type` tag:
//!
//! ```json
//! {"type": "update", "data": { ... checklist ... }, "stats": { ... }}
//! {"type": "todos", "version": 7, "count": 42, "last_update": "2026-01-01T00:00:00Z"}
//! ```
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use tickbook_server::broadcast::{Broadcaster, Notification, Topic};
//!
//! let broadcaster = Broadcaster::new();
//! let mut rx = broadcaster.subscribe();
//!
//! let note = Notification::Todos { version: 1, count: 3, last_update: Utc::now() };
//! assert_eq!(broadcaster.broadcast(note.clone()), 1);
//! assert_eq!(rx.try_recv().unwrap(), note);
//! assert_eq!(note.topic(), Topic::Todos);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tickbook_core::{Checklist, ChecklistStats};
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::{debug, trace};

/// Default channel capacity.
///
/// Notifications are small and infrequent; a client that falls this far
/// behind receives `RecvError::Lagged` and resumes with the newest state.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// A change pushed to WebSocket clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Sent once to each client right after it connects.
    Initial {
        data: Checklist,
        stats: ChecklistStats,
    },

    /// The checklist file changed.
    Update {
        data: Checklist,
        stats: ChecklistStats,
    },

    /// The todo cache was refreshed.
    Todos {
        version: u64,
        count: usize,
        last_update: DateTime<Utc>,
    },
}

impl Notification {
    /// The topic this notification belongs to.
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            Self::Initial { .. } | Self::Update { .. } => Topic::Checklist,
            Self::Todos { .. } => Topic::Todos,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Initial { .. } => "initial",
            Self::Update { .. } => "update",
            Self::Todos { .. } => "todos",
        }
    }
}

/// Which notifications a WebSocket client wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Checklist,
    Todos,
}

/// Subscriber-side filter. An empty filter accepts every notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicFilter {
    topic: Option<Topic>,
}

impl TopicFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_topic(mut self, topic: Topic) -> Self {
        self.topic = Some(topic);
        self
    }

    /// Returns `true` if the notification passes the filter.
    #[must_use]
    pub fn matches(&self, notification: &Notification) -> bool {
        self.topic.is_none_or(|topic| topic == notification.topic())
    }

    /// Whether the client should receive the initial checklist snapshot.
    #[must_use]
    pub fn wants_checklist(&self) -> bool {
        self.topic.is_none_or(|topic| topic == Topic::Checklist)
    }
}

/// Cloneable handle to the notification channel.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    sender: Sender<Notification>,
}

impl Broadcaster {
    /// Creates a broadcaster with [`DEFAULT_CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a broadcaster with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        debug!(capacity, "Created notification broadcaster");
        Self { sender }
    }

    /// Subscribes to notifications sent after this call.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<Notification> {
        let rx = self.sender.subscribe();
        debug!(
            subscriber_count = self.subscriber_count(),
            "New subscriber added"
        );
        rx
    }

    /// Sends a notification to every subscriber.
    ///
    /// Returns how many subscribers received it; 0 when nobody is listening.
    pub fn broadcast(&self, notification: Notification) -> usize {
        let kind = notification.kind();
        match self.sender.send(notification) {
            Ok(receivers) => {
                trace!(kind, receivers, "Notification broadcast");
                receivers
            }
            Err(_) => {
                trace!(kind, "No subscribers for notification");
                0
            }
        }
    }

    /// Number of live receivers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
