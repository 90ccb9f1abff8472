//! General-conversation replies: system prompt from per-message hints, the
//! context window as history, and a fixed apology when the model fails.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::AssistConfig;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::store::{ConversationTurn, TurnRole};

/// Sent when the model call fails for any reason.
pub const LLM_APOLOGY: &str =
    "Sorry, I'm having some trouble right now. Please try again in a moment.";

const DEFAULT_MAX_TOKENS: u32 = 500;
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Who is talking and where.
#[derive(Debug, Clone, Default)]
pub struct PromptHints {
    pub display_name: Option<String>,
    pub is_group: bool,
    pub group_name: Option<String>,
}

pub struct Responder {
    llm: Arc<dyn LlmProvider>,
    assistant_name: String,
    preamble: String,
    reply_language: String,
    max_tokens: u32,
    temperature: f32,
}

impl Responder {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &AssistConfig) -> Self {
        Self {
            llm,
            assistant_name: config.name.clone(),
            preamble: config.system_prompt.clone(),
            reply_language: config.reply_language.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn system_prompt(&self, hints: &PromptHints) -> String {
        let mut prompt = self.preamble.trim().to_string();
        prompt.push_str(&format!(" Your name is {}.", self.assistant_name));

        if let Some(name) = hints.display_name.as_deref().filter(|n| !n.trim().is_empty()) {
            prompt.push_str(&format!(" You are talking with {}.", name.trim()));
        }

        if hints.is_group {
            let group = hints.group_name.as_deref().unwrap_or("group");
            prompt.push_str(&format!(
                " This conversation takes place in the group chat \"{group}\"."
            ));
        } else {
            prompt.push_str(" This is a private chat.");
        }

        prompt.push_str(&format!(
            " Answer briefly and clearly in {}.",
            self.reply_language
        ));
        prompt
    }

    /// Assemble the message list: system prompt, window oldest-first, new text.
    pub fn build_messages(
        &self,
        window: &[ConversationTurn],
        text: &str,
        hints: &PromptHints,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(window.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt(hints)));
        messages.extend(window.iter().map(|turn| match turn.role {
            TurnRole::User => ChatMessage::user(&turn.content),
            TurnRole::Assistant => ChatMessage::assistant(&turn.content),
        }));
        messages.push(ChatMessage::user(text));
        messages
    }

    /// Ask the model for a reply. Never fails; errors become [`LLM_APOLOGY`].
    pub async fn respond(
        &self,
        window: &[ConversationTurn],
        text: &str,
        hints: &PromptHints,
    ) -> String {
        let request = CompletionRequest::new(self.build_messages(window, text, hints))
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        debug!(
            model = self.llm.model_name(),
            history = window.len(),
            "Calling LLM"
        );

        match self.llm.complete(request).await {
            Ok(response) => {
                debug!(
                    input_tokens = response.input_tokens,
                    output_tokens = response.output_tokens,
                    "LLM response received"
                );
                response.content
            }
            Err(e) => {
                warn!(model = self.llm.model_name(), error = %e, "LLM call failed");
                LLM_APOLOGY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::provider::{CompletionResponse, Role};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    struct RecordingLlm {
        reply: Result<String, ()>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LlmProvider for RecordingLlm {
        fn model_name(&self) -> &str {
            "recording"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request);
            match &self.reply {
                Ok(text) => Ok(CompletionResponse {
                    content: text.clone(),
                    input_tokens: 10,
                    output_tokens: 5,
                }),
                Err(()) => Err(LlmError::RequestFailed {
                    provider: "recording".into(),
                    reason: "boom".into(),
                }),
            }
        }
    }

    fn responder(reply: Result<String, ()>) -> (Responder, Arc<RecordingLlm>) {
        let llm = Arc::new(RecordingLlm {
            reply,
            seen: Mutex::new(Vec::new()),
        });
        let config = AssistConfig {
            name: "Stella".into(),
            ..AssistConfig::default()
        };
        (Responder::new(llm.clone(), &config), llm)
    }

    #[test]
    fn system_prompt_private_chat() {
        let (r, _) = responder(Ok("x".into()));
        let prompt = r.system_prompt(&PromptHints {
            display_name: Some("Budi".into()),
            ..Default::default()
        });
        assert!(prompt.contains("Your name is Stella."));
        assert!(prompt.contains("talking with Budi"));
        assert!(prompt.contains("private chat"));
        assert!(prompt.contains("in English"));
    }

    #[test]
    fn system_prompt_group_chat_names_the_group() {
        let (r, _) = responder(Ok("x".into()));
        let prompt = r.system_prompt(&PromptHints {
            display_name: None,
            is_group: true,
            group_name: Some("Bali Trip".into()),
        });
        assert!(prompt.contains("group chat \"Bali Trip\""));
        assert!(!prompt.contains("talking with"));
    }

    #[tokio::test]
    async fn respond_sends_window_then_new_text() {
        let (r, llm) = responder(Ok("Sure!".into()));
        let now = Utc::now();
        let window = vec![
            ConversationTurn::new(TurnRole::User, "hi", now),
            ConversationTurn::new(TurnRole::Assistant, "hello", now),
        ];

        let reply = r.respond(&window, "what's up?", &PromptHints::default()).await;
        assert_eq!(reply, "Sure!");

        let seen = llm.seen.lock().unwrap();
        let messages = &seen[0].messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "hi");
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[3].content, "what's up?");
        assert_eq!(seen[0].max_tokens, Some(500));
    }

    #[tokio::test]
    async fn failure_becomes_fixed_apology() {
        let (r, _) = responder(Err(()));
        let reply = r.respond(&[], "hello", &PromptHints::default()).await;
        assert_eq!(reply, LLM_APOLOGY);
    }
}
