//! Chat service integration for thread-bot.
//!
//! This module provides the Slack implementation of `GenericChatClient`:
//! - Receiving `app_mention` events over socket mode
//! - Reading thread history
//! - Posting and editing thread replies

use crate::{
    base::{
        config::Config,
        prompts,
        types::{MentionEvent, MessageHandle, RawFile, RawMessage, Res, Void},
    },
    interaction::{self, app_mention::MentionCoordinator},
};
use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use slack_morphism::{errors::SlackClientError, prelude::*};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, instrument, warn};

use std::{ops::Deref, sync::Arc};

use super::{ChatClient, GenericChatClient};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub async fn slack(config: &Config) -> Res<Self> {
        let client = SlackChatClient::new(config).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// User state for the slack socket client.
struct SlackUserState {
    coordinator: MentionCoordinator,
    tracker: TaskTracker,
}

/// Slack client implementation.
#[derive(Clone)]
struct SlackChatClient {
    pub app_token: SlackApiToken,
    pub bot_token: SlackApiToken,
    pub bot_user_id: String,
    pub client: Arc<FullClient>,
}

impl Deref for SlackChatClient {
    type Target = FullClient;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub async fn new(config: &Config) -> Res<Self> {
        // Initialize tokens.

        let app_token = SlackApiToken::new(SlackApiTokenValue(config.slack_app_token.clone()));
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.slack_bot_token.clone()));

        // Initialize the Slack client.

        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        // Get the bot's user ID, unless it was configured.

        let bot_user_id = match config.slack_bot_member_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => {
                let session = client.open_session(&bot_token);
                let bot_user = session.auth_test().await?;
                bot_user.user_id.0
            }
        };

        info!("Slack bot user ID: {}", bot_user_id);

        Ok(Self {
            app_token,
            bot_token,
            bot_user_id,
            client,
        })
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    #[instrument(name = "SlackChatClient::listen", skip_all)]
    async fn listen(&self, coordinator: MentionCoordinator, tracker: TaskTracker, shutdown: CancellationToken) -> Void {
        // Initialize the socket mode listener.

        let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new()
            .with_command_events(handle_command_event)
            .with_interaction_events(handle_interaction_event)
            .with_push_events(handle_push_event);

        // Initialize the socket mode listener environment.

        let listener_environment = Arc::new(SlackClientEventsListenerEnvironment::new(self.client.clone()).with_user_state(SlackUserState { coordinator, tracker }));

        let socket_mode_listener = Arc::new(SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            listener_environment.clone(),
            socket_mode_callbacks,
        ));

        // Register an app token to listen for events.
        socket_mode_listener.listen_for(&self.app_token).await?;

        // Open the WS connections, and keep them until asked to stop.
        socket_mode_listener.start().await;
        info!("Listening for mentions ...");

        shutdown.cancelled().await;

        info!("Closing socket mode connections ...");
        socket_mode_listener.shutdown().await;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_thread_replies(&self, channel_id: &str, thread_ts: &str) -> Res<Vec<RawMessage>> {
        let request = SlackApiConversationsRepliesRequest::new(SlackChannelId(channel_id.to_string()), SlackTs(thread_ts.to_string()));
        let session = self.client.open_session(&self.bot_token);

        let response = session.conversations_replies(&request).await;

        let response = if let Err(e) = &response
            && let SlackClientError::ApiError(ae) = e
            && ae.code == "thread_not_found"
        {
            // The thread can vanish between the mention and this call.
            return Ok(Vec::new());
        } else {
            response.map_err(|e| anyhow::anyhow!("Failed to fetch thread replies: {}", e))?
        };

        Ok(response.messages.iter().map(raw_message).collect())
    }

    #[instrument(skip(self, text))]
    async fn post_message(&self, channel_id: &str, thread_ts: &str, text: &str) -> Res<MessageHandle> {
        let message = SlackMessageContent::new().with_text(text.to_string());

        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), message).with_thread_ts(SlackTs(thread_ts.to_string()));

        let session = self.client.open_session(&self.bot_token);

        let response = session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(MessageHandle {
            channel_id: response.channel.0,
            ts: response.ts.0,
        })
    }

    #[instrument(skip(self, text), fields(len = text.len()))]
    async fn update_message(&self, handle: &MessageHandle, text: &str) -> Void {
        let content = SlackMessageContent::new().with_text(text.to_string());

        let request = SlackApiChatUpdateRequest::new(SlackChannelId(handle.channel_id.clone()), content, SlackTs(handle.ts.clone()));

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_update(&request).await.map_err(|e| anyhow::anyhow!("Failed to update message: {}", e))?;

        Ok(())
    }
}

/// Convert a Slack history message into the platform-neutral shape.
fn raw_message(message: &SlackHistoryMessage) -> RawMessage {
    RawMessage {
        author_id: message.sender.user.as_ref().map(|user| user.0.clone()),
        text: message.content.text.clone().unwrap_or_default(),
        files: message
            .content
            .files
            .iter()
            .flatten()
            .map(|file| RawFile {
                url: file.url_private_download.as_ref().map(|url| url.to_string()),
            })
            .collect(),
    }
}

/// Convert a Slack mention into a `MentionEvent`.
fn mention_event(event: &SlackAppMentionEvent) -> MentionEvent {
    MentionEvent::new(
        event.origin.ts.0.clone(),
        event.user.0.clone(),
        event.channel.0.clone(),
        event.origin.thread_ts.as_ref().map(|ts| ts.0.clone()),
    )
}

// Socket mode listener callbacks for Slack.

/// Handles command events from Slack.
async fn handle_command_event(
    event: SlackCommandEvent,
    _client: Arc<SlackHyperClient>,
    _states: SlackClientEventsUserState,
) -> Result<SlackCommandEventResponse, Box<dyn std::error::Error + Send + Sync>> {
    warn!("[COMMAND] {:#?}", event);
    Ok(SlackCommandEventResponse::new(SlackMessageContent::new().with_text(prompts::NO_COMMANDS_TEXT.into())))
}

/// Handles interaction events from Slack.
async fn handle_interaction_event(event: SlackInteractionEvent, _client: Arc<SlackHyperClient>, _states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    warn!("[INTERACTION] {:#?}", event);
    Ok(())
}

/// Handles push events from Slack.
#[instrument(skip_all)]
async fn handle_push_event(event_callback: SlackPushEventCallback, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let event = event_callback.event;
    let states = states.read().await;
    let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

    match event {
        SlackEventCallbackBody::AppMention(slack_app_mention_event) => {
            info!("Received app mention event ...");

            let event = mention_event(&slack_app_mention_event);
            interaction::app_mention::handle_app_mention(event, user_state.coordinator.clone(), &user_state.tracker);
        }
        SlackEventCallbackBody::Message(_) => {
            debug!("Ignoring message event; only mentions are answered.");
        }
        _ => {
            warn!("Received unhandled push event.")
        }
    }

    Ok(())
}
