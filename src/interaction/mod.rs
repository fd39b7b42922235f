//! Event handling and user interactions for thread-bot.
//!
//! This module holds the streaming answer pipeline:
//! - Building a conversation transcript from thread history
//! - Throttling placeholder edits while a completion streams in
//! - Coordinating each mention from receipt to its final edit

pub mod app_mention;
pub mod throttle;
pub mod transcript;
