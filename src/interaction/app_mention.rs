//! Answers mentions by streaming a completion into a thread reply.
//!
//! One mention moves through: duplicate check, history fetch, transcript build,
//! placeholder post, then streaming edits until the completion ends or fails.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{
    FutureExt, StreamExt,
    future::{BoxFuture, Fuse, FusedFuture},
};
use tokio::time::{Instant, sleep_until};
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        error::MentionError,
        prompts,
        types::{MentionEvent, MentionOutcome, MessageHandle, ModelConfig, Transcript, Void},
    },
    interaction::{
        throttle::{Action, EditThrottler, PendingResponse},
        transcript::TranscriptBuilder,
    },
    service::{chat::ChatClient, llm::LlmClient},
};

/// Spawns the handling of one mention as a tracked task.
#[instrument(skip_all)]
pub fn handle_app_mention(event: MentionEvent, coordinator: MentionCoordinator, tracker: &TaskTracker) {
    tracker.spawn(
        async move {
            coordinator.handle(event).await;
        }
        .in_current_span(),
    );
}

/// Drives mention events to completion.
///
/// It is cheap to clone; each `handle` call owns its own transcript and pending response.
#[derive(Clone)]
pub struct MentionCoordinator {
    chat: ChatClient,
    llm: LlmClient,
    transcripts: TranscriptBuilder,
    throttler: EditThrottler,
    model: ModelConfig,
    duplicate_window: Duration,
    placeholder_text: String,
    failure_notice: String,
}

impl MentionCoordinator {
    pub fn new(config: &Config, chat: ChatClient, llm: LlmClient) -> Self {
        let transcripts = TranscriptBuilder::new(chat.bot_user_id(), config.attachment_url_policy);

        Self {
            transcripts,
            throttler: EditThrottler::new(config.min_flush_interval()),
            model: config.model_config(),
            duplicate_window: config.duplicate_window(),
            placeholder_text: config.placeholder_text.clone(),
            failure_notice: config.failure_notice.clone(),
            chat,
            llm,
        }
    }

    /// Handles one mention; failures are logged, never propagated.
    #[instrument(name = "MentionCoordinator::handle", skip_all, fields(channel = %event.channel_id, thread_ts = %event.thread_ts))]
    pub async fn handle(&self, event: MentionEvent) -> MentionOutcome {
        match self.handle_internal(&event).await {
            Ok(outcome) => {
                debug!(?outcome, "Mention handled.");
                outcome
            }
            Err(err) => {
                error!("Error while handling: {}", err);
                MentionOutcome::Failed
            }
        }
    }

    async fn handle_internal(&self, event: &MentionEvent) -> Result<MentionOutcome, MentionError> {
        if is_stale(event, Utc::now(), self.duplicate_window) {
            info!("Dropping mention older than {:?}; likely a redelivery.", self.duplicate_window);
            return Ok(MentionOutcome::Duplicate);
        }

        let history = self.chat.fetch_thread_replies(&event.channel_id, &event.thread_ts).await.map_err(MentionError::HistoryFetch)?;

        let transcript = self.transcripts.build(&history);

        if transcript.is_empty() {
            info!("Thread has nothing to answer.");
            return Ok(MentionOutcome::EmptyTranscript);
        }

        let handle = self
            .chat
            .post_message(&event.channel_id, &event.thread_ts, &self.placeholder_text)
            .await
            .map_err(MentionError::Post)?;

        let mut pending = PendingResponse::new(handle);

        match self.stream_into(&transcript, &mut pending).await {
            Ok(()) => {
                info!("Streamed {} bytes into the placeholder.", pending.flushed().len());

                let unshown = pending.unshown();
                if !unshown.trim().is_empty() {
                    warn!("Last edit failed; {} bytes never reached the placeholder.", unshown.len());
                }

                Ok(MentionOutcome::Completed)
            }
            Err(err) => {
                self.show_failure(&pending).await;
                Err(err)
            }
        }
    }

    /// Pumps the completion into placeholder edits until the stream settles.
    async fn stream_into(&self, transcript: &Transcript, pending: &mut PendingResponse) -> Result<(), MentionError> {
        let mut stream = self.llm.stream_completion(transcript, &self.model).await?;
        let mut edit: Fuse<BoxFuture<'static, Void>> = Fuse::terminated();

        while !(pending.is_settled() && edit.is_terminated()) {
            let deadline = self.throttler.next_flush_at(pending);

            let action = tokio::select! {
                biased;

                result = &mut edit, if !edit.is_terminated() => {
                    let succeeded = match result {
                        Ok(()) => true,
                        Err(err) => {
                            warn!("{}", MentionError::Edit(err));
                            false
                        }
                    };

                    self.throttler.on_edit_complete(succeeded, pending, Instant::now())
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.throttler.poll(pending, Instant::now())
                }
                item = stream.next(), if !pending.is_finished() => match item {
                    Some(Ok(delta)) => self.throttler.on_delta(delta, pending, Instant::now()),
                    Some(Err(err)) => {
                        stream.close();

                        // Let the outstanding edit land so the failure notice is the last write.
                        if !edit.is_terminated() && let Err(err) = (&mut edit).await {
                            warn!("{}", MentionError::Edit(err));
                        }

                        return Err(err.into());
                    }
                    None => {
                        debug!("Completion stream ended without a finish reason.");
                        pending.finish();
                        self.throttler.poll(pending, Instant::now())
                    }
                },
                else => break,
            };

            if let Action::Flush(text) = action {
                edit = self.edit(pending.handle().clone(), text).fuse();
            }
        }

        stream.close();

        Ok(())
    }

    fn edit(&self, handle: MessageHandle, text: String) -> BoxFuture<'static, Void> {
        let chat = self.chat.clone();

        async move { chat.update_message(&handle, &text).await }.boxed()
    }

    /// Replaces the placeholder with whatever was produced plus the failure notice.
    async fn show_failure(&self, pending: &PendingResponse) {
        let text = prompts::failure_text(pending.accumulated(), &self.failure_notice);

        if let Err(err) = self.chat.update_message(pending.handle(), &text).await {
            warn!("Failed to post failure notice: {}", err);
        }
    }
}

/// Whether the event is older than the duplicate window.
///
/// Events with an unreadable timestamp are treated as stale.
pub fn is_stale(event: &MentionEvent, now: DateTime<Utc>, window: Duration) -> bool {
    let Some(sent) = event.timestamp() else {
        warn!("Unreadable event timestamp `{}`.", event.event_ts);
        return true;
    };

    now.signed_duration_since(sent).to_std().is_ok_and(|age| age > window)
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn event_at(at: DateTime<Utc>) -> MentionEvent {
        let ts = format!("{}.{:06}", at.timestamp(), at.timestamp_subsec_micros());
        MentionEvent::new(ts, "U1", "C1", None)
    }

    #[test]
    fn fresh_event_is_not_stale() {
        let now = Utc::now();

        assert!(!is_stale(&event_at(now - TimeDelta::milliseconds(500)), now, Duration::from_secs(3)));
    }

    #[test]
    fn old_event_is_stale() {
        let now = Utc::now();

        assert!(is_stale(&event_at(now - TimeDelta::seconds(5)), now, Duration::from_secs(3)));
    }

    #[test]
    fn event_from_the_future_is_not_stale() {
        let now = Utc::now();

        assert!(!is_stale(&event_at(now + TimeDelta::seconds(2)), now, Duration::from_secs(3)));
    }

    #[test]
    fn unreadable_timestamp_is_stale() {
        let event = MentionEvent::new("not-a-ts", "U1", "C1", None);

        assert!(is_stale(&event, Utc::now(), Duration::from_secs(3)));
    }
}
