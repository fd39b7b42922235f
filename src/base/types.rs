use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

// Conversation.

/// The speaker of a single conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    role: Role,
    content: String,
}

impl ChatEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// An ordered conversation, oldest turn first.
///
/// Only the transcript builder appends to it, and it never appends an entry whose content is blank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<ChatEntry>,
}

impl Transcript {
    pub(crate) fn push(&mut self, entry: ChatEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Chat platform shapes.

/// A file attached to a thread message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFile {
    /// The private download URL, when the platform exposes one.
    pub url: Option<String>,
}

/// A thread message as returned by the chat platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    /// The author's member id; absent for integrations that post without a user.
    pub author_id: Option<String>,
    pub text: String,
    pub files: Vec<RawFile>,
}

/// A reference to a posted message that can later be edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel_id: String,
    pub ts: String,
}

/// One inbound mention of the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionEvent {
    /// The event timestamp, in the platform's `seconds.micros` format.
    pub event_ts: String,
    pub user_id: String,
    pub channel_id: String,
    /// The thread root timestamp.
    pub thread_ts: String,
}

impl MentionEvent {
    /// Creates an event, rooting it at its own timestamp when it is not part of a thread.
    pub fn new(event_ts: impl Into<String>, user_id: impl Into<String>, channel_id: impl Into<String>, thread_ts: Option<String>) -> Self {
        let event_ts = event_ts.into();
        let thread_ts = thread_ts.filter(|ts| !ts.is_empty()).unwrap_or_else(|| event_ts.clone());

        Self {
            event_ts,
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            thread_ts,
        }
    }

    /// Parses the event timestamp into wall-clock time.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_slack_ts(&self.event_ts)
    }
}

/// Parses a `seconds.micros` timestamp.
pub fn parse_slack_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, "0"));
    let secs = secs.parse::<i64>().ok()?;

    // Right-pad (or cut) the fraction to nanoseconds.
    let digits = frac.chars().take(9).collect::<String>();
    let nanos = if digits.is_empty() { 0 } else { format!("{digits:0<9}").parse::<u32>().ok()? };

    DateTime::from_timestamp(secs, nanos)
}

// Streaming.

/// One increment of a streamed completion.
///
/// A delta with neither text nor finish reason is a valid no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamDelta {
    pub text: Option<String>,
    pub finish_reason: Option<String>,
}

impl StreamDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            finish_reason: None,
        }
    }

    pub fn finish(reason: impl Into<String>) -> Self {
        Self {
            text: None,
            finish_reason: Some(reason.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// How the model is sampled for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: f32,
    /// An optional system turn prepended to every request.
    pub system_directive: Option<String>,
}

/// The terminal state of one mention event's handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionOutcome {
    /// The event was older than the duplicate window.
    Duplicate,
    /// The thread reduced to nothing.
    EmptyTranscript,
    Completed,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Role::Assistant).unwrap(), "assistant");
        assert_eq!(serde_json::from_value::<Role>("user".into()).unwrap(), Role::User);
    }

    #[test]
    fn parse_slack_ts_keeps_micros() {
        let parsed = parse_slack_ts("1700000000.123456").unwrap();

        assert_eq!(parsed.timestamp(), 1_700_000_000);
        assert_eq!(parsed.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn parse_slack_ts_accepts_whole_seconds() {
        assert_eq!(parse_slack_ts("1700000000").unwrap().timestamp(), 1_700_000_000);
        assert!(parse_slack_ts("yesterday").is_none());
    }

    #[test]
    fn mention_event_defaults_thread_to_own_ts() {
        let event = MentionEvent::new("1.5", "U1", "C1", None);
        assert_eq!(event.thread_ts, "1.5");

        let event = MentionEvent::new("1.5", "U1", "C1", Some("1.0".to_string()));
        assert_eq!(event.thread_ts, "1.0");
    }
}
