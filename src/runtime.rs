//! Runtime services and shared state for the thread-bot.

use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    interaction::app_mention::MentionCoordinator,
    service::{chat::ChatClient, llm::LlmClient},
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the LLM client, chat client, configuration, and the tracker
/// of in-flight mention tasks. It is designed to be trivially cloneable.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The LLM client instance.
    pub llm: LlmClient,
    /// The chat client instance.
    pub chat: ChatClient,
    /// Every mention task spawned by the listener.
    pub tracker: TaskTracker,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the LLM client.
        let llm = LlmClient::openai(&config);

        // Initialize the chat client.
        let chat = ChatClient::slack(&config).await?;

        Ok(Self {
            config,
            llm,
            chat,
            tracker: TaskTracker::new(),
        })
    }

    /// Serve until SIGINT or SIGTERM, then drain.
    pub async fn start(&self) -> Void {
        let shutdown = CancellationToken::new();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            trigger.cancel();
        });

        self.serve(shutdown).await
    }

    /// Listen for mentions until `shutdown` is cancelled, then wait for in-flight mentions to finish.
    #[instrument(skip_all)]
    pub async fn serve(&self, shutdown: CancellationToken) -> Void {
        let coordinator = MentionCoordinator::new(&self.config, self.chat.clone(), self.llm.clone());

        let result = self.chat.listen(coordinator, self.tracker.clone(), shutdown).await;

        if let Err(err) = &result {
            warn!("Listener stopped with an error: {}", err);
        }

        self.tracker.close();
        info!("Waiting for {} in-flight mention(s) ...", self.tracker.len());
        self.tracker.wait().await;
        info!("All mentions drained.");

        result
    }
}

/// Resolves on the first SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", error);
            std::future::pending::<()>().await;
            return;
        }
        info!("Received SIGINT (Ctrl+C)");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM");
            }
            Err(error) => {
                warn!("Failed to install SIGTERM handler: {}", error);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
