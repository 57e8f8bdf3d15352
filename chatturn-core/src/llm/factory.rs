//! Factory for creating LLM providers from configuration

use crate::config::LLMProviderConfig;
use crate::error::Result;
use crate::llm::LLMProvider;
use crate::llm::providers::OpenAIProvider;
use std::sync::Arc;

/// Factory for creating LLM providers
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    /// Create an LLM provider from configuration
    ///
    /// An API key in the configuration takes precedence; otherwise the key
    /// and base URL are read from the `OPENAI_*` environment variables. The
    /// configured model is always used.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be created (e.g., missing API key)
    pub fn create(config: &LLMProviderConfig) -> Result<Arc<dyn LLMProvider>> {
        let model = config.model.clone();
        let provider = match (&config.api_key, &config.base_url) {
            (Some(api_key), Some(base_url)) => {
                OpenAIProvider::with_base_url(api_key.clone(), model, base_url.clone())
            }
            (Some(api_key), None) => OpenAIProvider::new(api_key.clone(), model),
            (None, _) => OpenAIProvider::from_env(Some(model))?,
        };

        tracing::debug!(
            provider = "openai",
            model = provider.model(),
            base_url = provider.base_url(),
            "Created LLM provider"
        );

        Ok(Arc::new(provider))
    }
}
