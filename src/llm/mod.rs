//! LLM integration.
//!
//! Supports:
//! - **Anthropic**: Direct API access via rig-core
//! - **OpenAI**: Direct API access via rig-core
//! - **Gemini**: Direct API access via rig-core
//! - **Offline**: echo provider used when no API key is configured
//!
//! Uses the rig-core crate for HTTP transport and the `RigAdapter` to bridge
//! rig's `CompletionModel` trait to our `LlmProvider` trait.

pub mod provider;
pub mod responder;
mod rig_adapter;

pub use provider::*;
pub use responder::{LLM_APOLOGY, PromptHints, Responder};
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::{ConfigError, LlmError};

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
    Gemini,
}

impl std::str::FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            other => Err(ConfigError::InvalidValue {
                key: "ASSIST_LLM_BACKEND".into(),
                message: format!("unknown backend '{other}', expected anthropic, openai or gemini"),
            }),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl LlmConfig {
    /// Read from the environment. `Ok(None)` when no API key is set.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(api_key) = std::env::var("ASSIST_LLM_API_KEY") else {
            return Ok(None);
        };
        let backend: LlmBackend = std::env::var("ASSIST_LLM_BACKEND")
            .unwrap_or_else(|_| "anthropic".to_string())
            .parse()?;
        let model = std::env::var("ASSIST_LLM_MODEL").unwrap_or_else(|_| match backend {
            LlmBackend::Anthropic => "claude-3-5-haiku-latest".to_string(),
            LlmBackend::OpenAi => "gpt-4o-mini".to_string(),
            LlmBackend::Gemini => "gemini-1.5-flash".to_string(),
        });
        Ok(Some(Self {
            backend,
            api_key: secrecy::SecretString::from(api_key),
            model,
            max_tokens: 500,
            temperature: 0.7,
        }))
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
        LlmBackend::Gemini => create_gemini_provider(config),
    }
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

fn create_gemini_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::gemini;

    let client: rig::client::Client<gemini::client::GeminiExt> =
        gemini::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "gemini".to_string(),
                reason: format!("Failed to create Gemini client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Gemini (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: LlmBackend, model: &str) -> LlmConfig {
        LlmConfig {
            backend,
            api_key: secrecy::SecretString::from("test-key"),
            model: model.to_string(),
            max_tokens: 500,
            temperature: 0.7,
        }
    }

    #[test]
    fn anthropic_provider_constructs_without_network() {
        // rig-core clients accept any string as API key at construction time.
        let provider = create_provider(&config(LlmBackend::Anthropic, "claude-3-5-haiku-latest"));
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "claude-3-5-haiku-latest");
    }

    #[test]
    fn openai_provider_constructs_without_network() {
        let provider = create_provider(&config(LlmBackend::OpenAi, "gpt-4o"));
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "gpt-4o");
    }

    #[test]
    fn gemini_provider_constructs_without_network() {
        let provider = create_provider(&config(LlmBackend::Gemini, "gemini-1.5-flash"));
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "gemini-1.5-flash");
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("OpenAI".parse::<LlmBackend>().unwrap(), LlmBackend::OpenAi);
        assert_eq!(" anthropic ".parse::<LlmBackend>().unwrap(), LlmBackend::Anthropic);
        assert_eq!("Gemini".parse::<LlmBackend>().unwrap(), LlmBackend::Gemini);
        assert!("mistral".parse::<LlmBackend>().is_err());
    }
}
