//! Library root for `thread-bot`.
//!
//! Thread-bot answers Slack mentions with an OpenAI chat completion:
//! - Rebuilds the conversation from the thread the mention lives in
//! - Posts a placeholder reply right away
//! - Streams the answer into that reply with rate-limited edits
//!
//! The bot integrates with Slack for chat and OpenAI for responses. The
//! architecture is built around traits that allow for different implementations
//! of each service.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::{info, warn};

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the thread-bot runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with LLM and chat clients
/// - Serves mentions until a termination signal, then drains in-flight work
pub async fn start(config: Config) -> Void {
    info!("Starting thread-bot ...");

    // Start the crypto provider.
    if crypto::ring::default_provider().install_default().is_err() {
        warn!("A crypto provider was already installed.");
    }

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    info!("Thread-bot stopped.");

    Ok(())
}
