//! LLM Provider implementations for salesdesk.
//!
//! All providers implement the `salesdesk_core::Provider` trait.
//! [`build_from_config`] turns the `[llm]` config section into a shared
//! provider handle.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use salesdesk_config::AppConfig;
use salesdesk_core::Provider;
use salesdesk_core::error::ProviderError;
use std::sync::Arc;

/// Key sent to endpoints that accept any bearer token (vLLM, Ollama).
const PLACEHOLDER_KEY: &str = "EMPTY";

/// Build the provider described by `config`.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    if config.llm.api_url.trim().is_empty() {
        return Err(ProviderError::NotConfigured("llm.api_url is empty".into()));
    }

    let api_key = match &config.api_key {
        Some(key) => key.clone(),
        None => {
            tracing::warn!(url = %config.llm.api_url, "No API key configured, sending placeholder");
            PLACEHOLDER_KEY.to_string()
        }
    };

    let provider = OpenAiCompatProvider::new(
        "openai-compat",
        &config.llm.api_url,
        api_key,
        config.llm.timeout(),
    )?;
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_default_config() {
        let provider = build_from_config(&AppConfig::default()).unwrap();
        assert_eq!(provider.name(), "openai-compat");
    }

    #[test]
    fn empty_url_is_not_configured() {
        let mut config = AppConfig::default();
        config.llm.api_url = " ".into();
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
