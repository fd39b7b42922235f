//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc, time::Duration};

use serde::Deserialize;

use crate::base::prompts;

use super::types::{ModelConfig, Res};

/// Default OpenAI chat model to use.
fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

/// Default sampling temperature for the OpenAI model.
fn default_openai_temperature() -> f32 {
    1.0
}

/// Default age after which a mention is considered a redelivery.
fn default_duplicate_window_seconds() -> u64 {
    3
}

/// Default floor between two placeholder edits.
fn default_min_flush_interval_ms() -> u64 {
    1000
}

/// Default placeholder text.
fn default_placeholder_text() -> String {
    prompts::PLACEHOLDER_TEXT.to_string()
}

/// Default failure notice.
fn default_failure_notice() -> String {
    prompts::FAILURE_NOTICE.to_string()
}

/// What to do with an attached file that has no downloadable URL.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentUrlPolicy {
    /// Keep the file's slot as an empty line.
    #[default]
    Blank,
    /// Leave the file out.
    Skip,
}

/// Configuration for the thread-bot application.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// OpenAI API key (`OPENAI_API_KEY`).
    pub openai_api_key: String,
    /// OpenAI chat model to use (`OPENAI_MODEL`).
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    /// Sampling temperature to use for the OpenAI model (`OPENAI_TEMPERATURE`).
    /// Value between 0 and 2. Higher values like 0.8 make output more random,
    /// while lower values like 0.2 make it more focused and deterministic.
    #[serde(default = "default_openai_temperature")]
    pub openai_temperature: f32,
    /// Optional system turn sent ahead of every thread (`OPENAI_SYSTEM_DIRECTIVE`).
    #[serde(default)]
    pub openai_system_directive: Option<String>,
    /// Slack app token (`SLACK_APP_TOKEN`).
    pub slack_app_token: String,
    /// Slack bot token (`SLACK_BOT_TOKEN`).
    pub slack_bot_token: String,
    /// The bot's own member id (`SLACK_BOT_MEMBER_ID`).
    /// Looked up with `auth.test` at startup when unset.
    #[serde(default)]
    pub slack_bot_member_id: Option<String>,
    /// Mentions older than this are dropped as redeliveries (`DUPLICATE_WINDOW_SECONDS`).
    #[serde(default = "default_duplicate_window_seconds")]
    pub duplicate_window_seconds: u64,
    /// Minimum time between two edits of the same placeholder (`MIN_FLUSH_INTERVAL_MS`).
    #[serde(default = "default_min_flush_interval_ms")]
    pub min_flush_interval_ms: u64,
    /// Text of the provisional reply (`PLACEHOLDER_TEXT`).
    #[serde(default = "default_placeholder_text")]
    pub placeholder_text: String,
    /// Text shown when generation fails (`FAILURE_NOTICE`).
    #[serde(default = "default_failure_notice")]
    pub failure_notice: String,
    /// Handling of attachments without a download URL (`ATTACHMENT_URL_POLICY`).
    #[serde(default)]
    pub attachment_url_policy: AttachmentUrlPolicy,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_model: default_openai_model(),
            openai_temperature: default_openai_temperature(),
            openai_system_directive: None,
            slack_app_token: String::new(),
            slack_bot_token: String::new(),
            slack_bot_member_id: None,
            duplicate_window_seconds: default_duplicate_window_seconds(),
            min_flush_interval_ms: default_min_flush_interval_ms(),
            placeholder_text: default_placeholder_text(),
            failure_notice: default_failure_notice(),
            attachment_url_policy: AttachmentUrlPolicy::default(),
        }
    }
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("THREAD_BOT"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Checks the ranges the providers will accept.
    pub fn validate(&self) -> Res<()> {
        if self.openai_temperature < 0.0 || self.openai_temperature > 2.0 {
            return Err(anyhow::anyhow!("OpenAI temperature must be between 0 and 2."));
        }

        if self.openai_model.trim().is_empty() {
            return Err(anyhow::anyhow!("OpenAI model must not be empty."));
        }

        if self.placeholder_text.trim().is_empty() {
            return Err(anyhow::anyhow!("Placeholder text must not be empty."));
        }

        Ok(())
    }

    /// The model settings for completion requests.
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            model: self.openai_model.clone(),
            temperature: self.openai_temperature,
            system_directive: self.openai_system_directive.clone().filter(|d| !d.trim().is_empty()),
        }
    }

    pub fn duplicate_window(&self) -> Duration {
        Duration::from_secs(self.duplicate_window_seconds)
    }

    pub fn min_flush_interval(&self) -> Duration {
        Duration::from_millis(self.min_flush_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(inner: ConfigInner) -> Config {
        Config { inner: Arc::new(inner) }
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = config_with(ConfigInner::default());

        assert_eq!(config.openai_model, "gpt-3.5-turbo");
        assert_eq!(config.openai_temperature, 1.0);
        assert_eq!(config.duplicate_window(), Duration::from_secs(3));
        assert_eq!(config.placeholder_text, prompts::PLACEHOLDER_TEXT);
        assert_eq!(config.attachment_url_policy, AttachmentUrlPolicy::Blank);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let config = config_with(ConfigInner {
            openai_temperature: 2.5,
            ..Default::default()
        });

        assert!(config.validate().is_err());
    }

    #[test]
    fn blank_system_directive_is_ignored() {
        let config = config_with(ConfigInner {
            openai_system_directive: Some("   ".to_string()),
            ..Default::default()
        });

        assert_eq!(config.model_config().system_directive, None);
    }

    #[test]
    fn deserializes_from_toml_source() {
        let source = r#"
            openai_api_key = "sk-test"
            slack_app_token = "xapp-test"
            slack_bot_token = "xoxb-test"
            min_flush_interval_ms = 250
            attachment_url_policy = "skip"
        "#;

        let inner: ConfigInner = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(inner.min_flush_interval_ms, 250);
        assert_eq!(inner.attachment_url_policy, AttachmentUrlPolicy::Skip);
        assert_eq!(inner.duplicate_window_seconds, 3);
        assert_eq!(inner.slack_bot_member_id, None);
    }
}
