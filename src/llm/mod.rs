pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum LlmError {
    ConnectionError(String),
    ResponseError(String),
    ConfigError(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ConnectionError(msg) => write!(f, "LLM connection error: {}", msg),
            LlmError::ResponseError(msg) => write!(f, "LLM response error: {}", msg),
            LlmError::ConfigError(msg) => write!(f, "LLM configuration error: {}", msg),
        }
    }
}

impl Error for LlmError {}

/// One prompt in, raw generated text out. Stateless; retries belong to the
/// caller so that "model down" and "model produced bad SQL" stay distinct.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

pub struct LlmManager {
    backend: Box<dyn Completion + Send + Sync>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let backend: Box<dyn Completion + Send + Sync> = match config.backend.as_str() {
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self { backend })
    }
}

#[async_trait]
impl Completion for LlmManager {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.backend.complete(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn unknown_backend_is_a_config_error() {
        let mut config = AppConfig::default().llm;
        config.backend = "carrier-pigeon".to_string();
        let result = LlmManager::new(&config);
        assert!(matches!(result, Err(LlmError::ConfigError(_))));
    }
}
