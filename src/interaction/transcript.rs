//! Turns raw thread history into a role-tagged transcript.

use tracing::debug;

use crate::base::{
    config::AttachmentUrlPolicy,
    types::{ChatEntry, RawMessage, Role, Transcript},
};

/// Builds transcripts for one bot identity.
#[derive(Debug, Clone)]
pub struct TranscriptBuilder {
    bot_member_id: String,
    attachment_url_policy: AttachmentUrlPolicy,
}

impl TranscriptBuilder {
    pub fn new(bot_member_id: impl Into<String>, attachment_url_policy: AttachmentUrlPolicy) -> Self {
        Self {
            bot_member_id: bot_member_id.into(),
            attachment_url_policy,
        }
    }

    /// Builds the transcript, oldest message first.
    ///
    /// Messages authored by the bot become `assistant` turns, everything else `user` turns.
    /// Self-mentions are stripped and messages that end up blank are dropped.
    pub fn build(&self, messages: &[RawMessage]) -> Transcript {
        let mut transcript = Transcript::default();

        for message in messages {
            let role = if message.author_id.as_deref() == Some(self.bot_member_id.as_str()) { Role::Assistant } else { Role::User };

            let content = self.content_of(message);

            if content.trim().is_empty() {
                continue;
            }

            transcript.push(ChatEntry::new(role, content));
        }

        debug!("Built transcript with {} of {} messages.", transcript.len(), messages.len());

        transcript
    }

    fn content_of(&self, message: &RawMessage) -> String {
        let mention = format!("<@{}>", self.bot_member_id);
        let mut content = message.text.replace(&mention, "").trim().to_string();

        if message.files.is_empty() {
            return content;
        }

        let urls = message
            .files
            .iter()
            .filter_map(|file| match (&file.url, self.attachment_url_policy) {
                (Some(url), _) => Some(url.as_str()),
                (None, AttachmentUrlPolicy::Blank) => Some(""),
                (None, AttachmentUrlPolicy::Skip) => None,
            })
            .collect::<Vec<_>>();

        if urls.is_empty() {
            return content;
        }

        content.push('\n');
        content.push_str(&urls.join("\n"));

        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::types::RawFile;

    fn message(author: &str, text: &str) -> RawMessage {
        RawMessage {
            author_id: Some(author.to_string()),
            text: text.to_string(),
            files: Vec::new(),
        }
    }

    fn builder() -> TranscriptBuilder {
        TranscriptBuilder::new("BOT", AttachmentUrlPolicy::Blank)
    }

    #[test]
    fn strips_self_mention_and_tags_user() {
        let transcript = builder().build(&[message("U1", "<@BOT> hello")]);

        assert_eq!(transcript.entries(), &[ChatEntry::new(Role::User, "hello")]);
    }

    #[test]
    fn bot_messages_become_assistant_turns() {
        let history = vec![message("BOT", "first"), message("BOT", "second <@BOT>"), message("BOT", "third")];

        let transcript = builder().build(&history);

        assert_eq!(transcript.len(), 3);
        assert!(transcript.entries().iter().all(|e| e.role() == Role::Assistant));
    }

    #[test]
    fn drops_messages_that_reduce_to_nothing() {
        let history = vec![message("U1", "<@BOT>"), message("U2", "   "), message("U1", "<@BOT>  <@BOT>"), message("U3", "kept")];

        let transcript = builder().build(&history);

        assert_eq!(transcript.entries(), &[ChatEntry::new(Role::User, "kept")]);
    }

    #[test]
    fn preserves_order_and_other_mentions() {
        let history = vec![message("U1", "<@BOT> ask <@U2>"), message("BOT", "answer"), message("U1", "thanks")];

        let transcript = builder().build(&history);
        let contents = transcript.entries().iter().map(|e| e.content()).collect::<Vec<_>>();

        assert_eq!(contents, vec!["ask <@U2>", "answer", "thanks"]);
        assert_eq!(transcript.entries()[1].role(), Role::Assistant);
    }

    #[test]
    fn messages_without_author_are_user_turns() {
        let mut raw = message("U1", "from an integration");
        raw.author_id = None;

        let transcript = builder().build(&[raw]);

        assert_eq!(transcript.entries()[0].role(), Role::User);
    }

    #[test]
    fn appends_file_urls_in_order() {
        let mut raw = message("U1", "<@BOT> look");
        raw.files = vec![
            RawFile { url: Some("https://files/a".to_string()) },
            RawFile { url: None },
            RawFile { url: Some("https://files/b".to_string()) },
        ];

        let blank = builder().build(std::slice::from_ref(&raw));
        let skip = TranscriptBuilder::new("BOT", AttachmentUrlPolicy::Skip).build(&[raw]);

        assert_eq!(blank.entries()[0].content(), "look\nhttps://files/a\n\nhttps://files/b");
        assert_eq!(skip.entries()[0].content(), "look\nhttps://files/a\nhttps://files/b");
    }

    #[test]
    fn file_only_message_is_kept() {
        let mut raw = message("U1", "<@BOT>");
        raw.files = vec![RawFile { url: Some("https://files/a".to_string()) }];

        let transcript = builder().build(&[raw]);

        assert_eq!(transcript.entries()[0].content(), "\nhttps://files/a");
    }

    #[test]
    fn file_without_url_alone_is_dropped() {
        let mut raw = message("U1", "<@BOT>");
        raw.files = vec![RawFile { url: None }];

        assert!(builder().build(std::slice::from_ref(&raw)).is_empty());
        assert!(TranscriptBuilder::new("BOT", AttachmentUrlPolicy::Skip).build(&[raw]).is_empty());
    }

    #[test]
    fn never_emits_blank_entries_or_more_entries_than_input() {
        let texts = ["", " ", "<@BOT>", "a", "<@BOT> b", "\n\t", "c <@BOT>"];
        let authors = ["U1", "BOT"];

        for (i, text) in texts.iter().enumerate() {
            for take in 0..=texts.len() {
                let history = texts.iter().cycle().skip(i).take(take).zip(authors.iter().cycle()).map(|(t, a)| message(a, t)).collect::<Vec<_>>();

                let transcript = builder().build(&history);

                assert!(transcript.len() <= history.len(), "{text:?}");
                assert!(transcript.entries().iter().all(|e| !e.content().trim().is_empty()));
            }
        }
    }
}
