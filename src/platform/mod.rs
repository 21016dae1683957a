pub mod telegram;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Opaque reference to a chat the client can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatHandle(pub i64);

/// The account the monitoring client is logged in as
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: u64,
    pub username: Option<String>,
}

/// A chat resolved from a user-facing identifier
#[derive(Debug, Clone)]
pub struct Entity {
    pub handle: ChatHandle,
    /// Broadcast channels have no membership list to check.
    pub broadcast: bool,
    /// Whether the monitoring identity is currently a member.
    pub joined: bool,
}

/// The chat an incoming message was posted in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatInfo {
    pub id: i64,
    /// Public handle, if the chat has one.
    pub username: Option<String>,
}

/// A message event delivered by the platform
#[derive(Debug, Clone)]
pub struct IncomingEvent {
    pub chat: ChatInfo,
    pub message_id: i32,
    pub text: String,
    /// Service messages (joins, leaves, pins) carry no authored content.
    pub is_action: bool,
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("rate limited for {}s", .0.as_secs())]
    RateLimited(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Messaging-platform capabilities the monitor depends on.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn connect(&self) -> Result<(), PlatformError>;

    async fn get_me(&self) -> Result<Identity, PlatformError>;

    async fn get_entity(&self, identifier: &str) -> Result<Entity, PlatformError>;

    /// Lighter lookup that only yields a subscribable handle.
    async fn get_input_entity(&self, identifier: &str) -> Result<ChatHandle, PlatformError>;

    async fn join_channel(&self, identifier: &str) -> Result<(), PlatformError>;

    /// Deliver new messages from `chats` into `events` until the connection
    /// drops. Returns `Ok` on a clean disconnect or when `events` is closed.
    async fn run_until_disconnected(
        &self,
        chats: &[ChatHandle],
        events: mpsc::Sender<IncomingEvent>,
    ) -> Result<(), PlatformError>;
}

/// Outbound channel used to deliver alert text to a recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(
        &self,
        recipient: i64,
        text: &str,
        disable_link_preview: bool,
    ) -> anyhow::Result<()>;
}
