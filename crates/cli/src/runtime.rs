//! Wiring: config → provider chain, memory, actions, agent.

use anyhow::Context;
use moltyclaw_agent::Agent;
use moltyclaw_config::AppConfig;
use moltyclaw_core::error::ProviderError;
use moltyclaw_core::memory::MemoryStore;
use moltyclaw_memory::MarkdownMemory;
use std::sync::Arc;
use tracing::info;

pub fn load_config() -> anyhow::Result<AppConfig> {
    AppConfig::load().context("Failed to load config")
}

/// Build a ready-to-use agent from the configuration.
pub fn build_agent(config: &AppConfig) -> anyhow::Result<Agent> {
    let provider = match moltyclaw_providers::build_chain(config) {
        Ok(provider) => provider,
        Err(e) => {
            if matches!(e, ProviderError::NotConfigured(_)) {
                print_key_help();
            }
            return Err(e).with_context(|| {
                format!("Provider '{}' is not usable", config.default_provider)
            });
        }
    };

    let memory = MarkdownMemory::from_config(&config.memory);
    info!(root = %memory.root().display(), "Memory directory");
    let memory: Arc<dyn MemoryStore> = Arc::new(memory);

    let registry = Arc::new(moltyclaw_tools::default_registry(config, memory.clone()));

    Ok(Agent::from_config(config, provider, registry, memory))
}

fn print_key_help() {
    eprintln!();
    eprintln!("  No API key configured. Set one of these environment variables:");
    eprintln!("    MISTRAL_API_KEY      (default provider)");
    eprintln!("    OPENROUTER_API_KEY / OPENAI_API_KEY / MOLTYCLAW_API_KEY");
    eprintln!("    ANTHROPIC_API_KEY    (for the anthropic provider)");
    eprintln!();
    eprintln!("  Or add it to {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
}
