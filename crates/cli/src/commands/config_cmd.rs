//! `moltyclaw config` — configuration helpers.

use crate::runtime;
use moltyclaw_config::AppConfig;

/// Print a starter config file.
pub fn show() {
    println!("# {}", AppConfig::config_dir().join("config.toml").display());
    println!("{}", AppConfig::default_toml());
}

pub fn validate() -> anyhow::Result<()> {
    println!("Validating configuration...");
    let config = runtime::load_config()?;
    println!("   Config parsed successfully");

    let mut warnings = Vec::new();
    if !config.has_api_key() && !config.providers.values().any(|p| p.api_key.is_some()) {
        warnings.push("No API key set (set MISTRAL_API_KEY or MOLTYCLAW_API_KEY)".to_string());
    }
    if config.outbound.telegram && config.credentials.telegram_token.is_none() {
        warnings.push("Telegram sending is enabled but TELEGRAM_TOKEN is missing".to_string());
    }
    if config.outbound.discord && config.credentials.discord_token.is_none() {
        warnings.push("Discord sending is enabled but DISCORD_TOKEN is missing".to_string());
    }

    if warnings.is_empty() {
        println!("   All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   warning: {w}");
        }
    }

    println!();
    println!("   Provider:   {}", config.default_provider);
    if let Some(fallback) = &config.fallback_provider {
        println!("   Fallback:   {fallback}");
    }
    println!("   Model:      {}", config.default_model);
    println!("   Backends:   {}", moltyclaw_providers::backend_names(&config).join(", "));
    println!("   Memory:     {}", config.memory.root_dir().display());
    println!("   Compaction: above {} chars", config.agent.compaction_threshold_chars);
    Ok(())
}
