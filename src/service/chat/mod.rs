pub mod slack;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    base::types::{MessageHandle, RawMessage, Res, Void},
    interaction::app_mention::MentionCoordinator,
};

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This trait defines the core functionality for interacting with chat platforms
/// like Slack. Implementing this trait allows different chat services to be used
/// with the thread-bot.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Get the bot user ID.
    ///
    /// Returns the unique identifier for the bot in the chat platform,
    /// which is used to tell the bot's own messages apart and to strip self-mentions.
    fn bot_user_id(&self) -> &str;

    /// Listen for mention events until `shutdown` is cancelled.
    ///
    /// Every mention is handed to `coordinator` as its own task on `tracker`.
    /// Returns once the platform connection stops accepting new events; tasks
    /// already spawned are left for the caller to drain.
    async fn listen(&self, coordinator: MentionCoordinator, tracker: TaskTracker, shutdown: CancellationToken) -> Void;

    /// Get every message of a thread, root first.
    async fn fetch_thread_replies(&self, channel_id: &str, thread_ts: &str) -> Res<Vec<RawMessage>>;

    /// Post a message into a thread, returning a handle for later edits.
    async fn post_message(&self, channel_id: &str, thread_ts: &str, text: &str) -> Res<MessageHandle>;

    /// Replace the text of a previously posted message.
    async fn update_message(&self, handle: &MessageHandle, text: &str) -> Void;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}
