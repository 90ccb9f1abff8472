//! Main agent loop: pulls messages from every channel and dispatches them.
//!
//! Each conversation scope gets its own sequential worker queue, so one
//! scope's messages are handled in arrival order while different scopes run
//! in parallel. Workers retire after sitting idle. The per-sender rate limit
//! is applied here, before anything reaches the assistant.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::agent::assistant::{AssistRequest, Assistant};
use crate::channels::{ChannelManager, IncomingMessage, OutgoingResponse, RateLimiter, StatusUpdate};
use crate::error::Error;
use crate::scope::ConversationScope;

/// Idle time after which a scope worker exits.
const WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Sent when handling a message panics or the reply cannot be produced.
const DISPATCH_APOLOGY: &str = "Sorry, something went wrong. Please try again.";

/// Shared pieces every worker needs.
struct Shared {
    assistant: Arc<Assistant>,
    channels: Arc<ChannelManager>,
}

/// The main agent that coordinates channels and the assistant.
pub struct Agent {
    name: String,
    shared: Arc<Shared>,
    limiter: RateLimiter,
    idle_timeout: Duration,
}

impl Agent {
    pub fn new(
        name: &str,
        assistant: Arc<Assistant>,
        channels: ChannelManager,
        rate_limit: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            shared: Arc::new(Shared {
                assistant,
                channels: Arc::new(channels),
            }),
            limiter: RateLimiter::new(rate_limit),
            idle_timeout: WORKER_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    // ── Main loop ───────────────────────────────────────────────────

    /// Run until Ctrl+C or until every channel stream ends.
    pub async fn run(self) -> Result<(), Error> {
        let mut message_stream = self.shared.channels.start_all().await?;
        let mut queues: HashMap<ConversationScope, mpsc::UnboundedSender<IncomingMessage>> =
            HashMap::new();
        let mut workers = JoinSet::new();

        tracing::info!("Agent {} ready and listening", self.name);

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                Some(result) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = result {
                        tracing::error!("Scope worker failed: {e}");
                    }
                    continue;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("All channel streams ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            if !self.limiter.check(&message.sender_key()) {
                tracing::debug!(sender = %message.sender_key(), "Rate limited, skipping");
                continue;
            }

            self.dispatch(message, &mut queues, &mut workers);
        }

        // Let in-flight work finish so every accepted message gets its reply.
        drop(queues);
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!("Scope worker failed: {e}");
            }
        }

        tracing::info!("Agent shutting down...");
        self.shared.channels.shutdown_all().await?;
        Ok(())
    }

    /// Queue the message on its scope's worker, starting one if needed.
    fn dispatch(
        &self,
        message: IncomingMessage,
        queues: &mut HashMap<ConversationScope, mpsc::UnboundedSender<IncomingMessage>>,
        workers: &mut JoinSet<()>,
    ) {
        let scope = message.scope();

        let message = match queues.get(&scope) {
            Some(tx) => match tx.send(message) {
                Ok(()) => return,
                // Worker retired; start a fresh one below.
                Err(mpsc::error::SendError(message)) => message,
            },
            None => message,
        };

        queues.retain(|_, tx| !tx.is_closed());

        let (tx, rx) = mpsc::unbounded_channel();
        // A fresh receiver is open, so this cannot fail.
        let _ = tx.send(message);
        queues.insert(scope.clone(), tx);

        tracing::debug!(%scope, "Starting scope worker");
        workers.spawn(scope_worker(self.shared.clone(), rx, self.idle_timeout));
    }
}

/// Drain one scope's queue in order, exiting after `idle_timeout` of silence.
async fn scope_worker(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<IncomingMessage>,
    idle_timeout: Duration,
) {
    loop {
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(message)) => process(&shared, message).await,
            Ok(None) => break,
            Err(_) => {
                rx.close();
                while let Ok(message) = rx.try_recv() {
                    process(&shared, message).await;
                }
                break;
            }
        }
    }
}

async fn process(shared: &Shared, message: IncomingMessage) {
    let _ = shared
        .channels
        .send_status(
            &message.channel,
            StatusUpdate::Thinking("Processing...".into()),
            &message.metadata,
        )
        .await;

    let request = AssistRequest::new(message.scope(), &message.content, message.display_name())
        .with_group_name(message.group.as_ref().and_then(|g| g.name.clone()));

    let assistant = shared.assistant.clone();
    let response = match tokio::spawn(async move { assistant.handle(&request).await }).await {
        Ok(reply) => OutgoingResponse {
            content: reply.text,
            search: reply.search,
        },
        Err(e) => {
            tracing::error!(channel = %message.channel, "Error handling message: {e}");
            OutgoingResponse::text(DISPATCH_APOLOGY)
        }
    };

    if let Err(e) = shared.channels.respond(&message, response).await {
        tracing::error!(channel = %message.channel, error = %e, "Failed to send response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::assistant::tests::test_assistant;
    use crate::channels::{Channel, MessageStream};
    use crate::error::ChannelError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedChannel {
        inbound: Vec<IncomingMessage>,
        sent: Arc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            Ok(Box::pin(futures::stream::iter(self.inbound.clone())))
        }

        async fn respond(
            &self,
            msg: &IncomingMessage,
            response: OutgoingResponse,
        ) -> Result<(), ChannelError> {
            self.sent
                .lock()
                .unwrap()
                .push((msg.user_id.clone(), response.content));
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    async fn run_script(
        inbound: Vec<IncomingMessage>,
        rate_limit: Duration,
    ) -> Vec<(String, String)> {
        let (assistant, _, _) = test_assistant().await;
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut channels = ChannelManager::new();
        channels.add(Box::new(ScriptedChannel {
            inbound,
            sent: sent.clone(),
        }));

        Agent::new("test", Arc::new(assistant), channels, rate_limit)
            .with_idle_timeout(Duration::from_millis(50))
            .run()
            .await
            .unwrap();

        let sent = sent.lock().unwrap().clone();
        sent
    }

    fn msg(user: &str, text: &str) -> IncomingMessage {
        IncomingMessage::new("scripted", user, text)
    }

    #[tokio::test]
    async fn every_accepted_message_gets_a_reply() {
        let sent = run_script(
            vec![msg("alice", "hello"), msg("bob", "hi there")],
            Duration::ZERO,
        )
        .await;

        assert_eq!(sent.len(), 2);
        assert!(sent.contains(&("alice".into(), "echo: hello".into())));
        assert!(sent.contains(&("bob".into(), "echo: hi there".into())));
    }

    #[tokio::test]
    async fn same_scope_replies_keep_arrival_order() {
        let sent = run_script(
            vec![msg("alice", "one"), msg("alice", "two"), msg("alice", "three")],
            Duration::ZERO,
        )
        .await;

        let texts: Vec<_> = sent.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(texts, vec!["echo: one", "echo: two", "echo: three"]);
    }

    #[tokio::test]
    async fn burst_from_one_sender_is_rate_limited() {
        let sent = run_script(
            vec![msg("alice", "one"), msg("alice", "two"), msg("bob", "three")],
            Duration::from_secs(60),
        )
        .await;

        let texts: Vec<_> = sent.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(texts.len(), 2);
        assert!(texts.contains(&"echo: one"));
        assert!(texts.contains(&"echo: three"));
    }
}
