//! Provider selection — assembles the LLM backends named in config.
//!
//! [`build_chain`] assembles what the agent actually talks to: the primary
//! backend and, when configured, a fallback backend, each behind its own
//! retry policy and pinned to its own model.

use std::collections::BTreeSet;
use std::sync::Arc;
use moltyclaw_config::AppConfig;
use moltyclaw_core::error::ProviderError;
use moltyclaw_core::provider::Provider;
use tracing::info;
use crate::anthropic::AnthropicProvider;
use crate::fallback::FallbackProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::retry::{RetryPolicy, RetryProvider};

/// Providers that run locally and need no API key.
fn is_local(provider_name: &str) -> bool {
    matches!(provider_name, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

/// API key for `name`: its own section first, then the global key for the primary only.
fn api_key_for(config: &AppConfig, name: &str) -> Option<String> {
    let own = config.providers.get(name).and_then(|p| p.api_key.clone());
    if own.is_some() || name != config.default_provider {
        return own;
    }
    config.api_key.clone()
}

/// Instantiate the raw backend for a provider name.
fn backend(config: &AppConfig, name: &str, api_key: &str) -> Arc<dyn Provider> {
    let api_url = config.providers.get(name).and_then(|p| p.api_url.clone());
    if name == "anthropic" {
        // Use native Anthropic provider for direct API access
        let mut p = AnthropicProvider::new(api_key);
        if let Some(url) = api_url {
            p = p.with_base_url(url);
        }
        Arc::new(p)
    } else {
        let base_url = api_url.unwrap_or_else(|| default_base_url(name));
        Arc::new(OpenAiCompatProvider::new(name, base_url, api_key))
    }
}

/// Every provider name the config refers to, primary first.
pub fn backend_names(config: &AppConfig) -> Vec<String> {
    let mut names = vec![config.default_provider.clone()];
    let mut others: BTreeSet<&str> = config.providers.keys().map(String::as_str).collect();
    if let Some(fallback) = &config.fallback_provider {
        others.insert(fallback);
    }
    others.remove(config.default_provider.as_str());
    names.extend(others.into_iter().map(str::to_string));
    names
}

/// The model a provider is asked for.
pub fn model_for(config: &AppConfig, name: &str) -> String {
    if let Some(model) = config.providers.get(name).and_then(|p| p.default_model.clone()) {
        return model;
    }
    if name == config.default_provider {
        return config.default_model.clone();
    }
    match name {
        "mistral" => "mistral-large-latest".into(),
        "anthropic" => "claude-sonnet-4-20250514".into(),
        "openai" => "gpt-4o".into(),
        "openrouter" => "mistralai/mistral-large".into(),
        _ => config.default_model.clone(),
    }
}

fn retrying(config: &AppConfig, name: &str) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = match api_key_for(config, name) {
        Some(key) => key,
        None if is_local(name) => String::new(),
        None => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for provider '{name}'"
            )));
        }
    };
    let retry = RetryProvider::new(
        backend(config, name, &api_key),
        RetryPolicy::from_config(&config.retry),
    )
    .with_model(model_for(config, name));
    Ok(Arc::new(retry))
}

/// Assemble the provider the agent streams from.
///
/// A primary without credentials is an error. A fallback without credentials
/// is skipped with a log line, since the agent still works without it.
pub fn build_chain(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let primary = retrying(config, &config.default_provider)?;

    let Some(fallback_name) = &config.fallback_provider else {
        return Ok(primary);
    };

    match retrying(config, fallback_name) {
        Ok(fallback) => {
            info!(primary = %config.default_provider, fallback = %fallback_name, "Provider chain with fallback");
            let budget = RetryPolicy::from_config(&config.retry).open_budget();
            Ok(Arc::new(FallbackProvider::new(primary, fallback).with_budget(budget)))
        }
        Err(e) => {
            tracing::warn!(fallback = %fallback_name, error = %e, "Fallback provider unavailable, using primary only");
            Ok(primary)
        }
    }
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "mistral" => "https://api.mistral.ai/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "anthropic" => "https://api.anthropic.com".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
