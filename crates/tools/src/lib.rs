//! Built-in action handlers for MoltyClaw.
//!
//! Actions give the agent the ability to interact with the world:
//! run shell commands, search the web, keep notes in its memory, and
//! message people on Telegram, Discord or WhatsApp.

pub mod memory;
pub mod shell;
pub mod social;
pub mod web_search;

use moltyclaw_config::AppConfig;
use moltyclaw_core::action::ActionRegistry;
use moltyclaw_core::memory::MemoryStore;
use std::sync::Arc;
use tracing::debug;

/// Create the action registry with every built-in handler the config enables.
///
/// CMD, DDG_SEARCH and the memory actions are always present. Outbound
/// messaging actions are registered only when their channel flag is on.
pub fn default_registry(config: &AppConfig, store: Arc<dyn MemoryStore>) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register(Box::new(shell::ShellAction::from_config(&config.shell)));
    registry.register(Box::new(web_search::WebSearchAction::new()));
    registry.register(Box::new(memory::SaveLongTermAction::new(store.clone())));
    registry.register(Box::new(memory::SaveDailyAction::new(store.clone())));
    registry.register(Box::new(memory::SearchAction::new(store.clone())));
    registry.register(Box::new(memory::GetAction::new(store)));

    let creds = &config.credentials;
    if config.outbound.telegram {
        registry.register(Box::new(social::TelegramSendAction::new(creds.telegram_token.clone())));
    }
    if config.outbound.discord {
        registry.register(Box::new(social::DiscordSendAction::new(creds.discord_token.clone())));
    }
    if config.outbound.whatsapp {
        registry.register(Box::new(social::WhatsAppSendAction::new(creds.whatsapp_bridge_url.clone())));
    }

    debug!(actions = ?registry.names(), "Action registry ready");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use moltyclaw_memory::InMemoryStore;

    #[test]
    fn core_actions_always_registered() {
        let registry = default_registry(&AppConfig::default(), Arc::new(InMemoryStore::new()));
        assert_eq!(
            registry.names(),
            vec![
                "CMD",
                "DDG_SEARCH",
                "MEMORY_GET",
                "MEMORY_SAVE_DAILY",
                "MEMORY_SAVE_LONG_TERM",
                "MEMORY_SEARCH",
            ]
        );
    }

    #[test]
    fn outbound_actions_follow_flags() {
        let mut config = AppConfig::default();
        config.outbound.whatsapp = true;
        config.outbound.telegram = true;
        let registry = default_registry(&config, Arc::new(InMemoryStore::new()));
        assert!(registry.get("WHATSAPP_SEND").is_some());
        assert!(registry.get("TELEGRAM_SEND").is_some());
        assert!(registry.get("DISCORD_SEND").is_none());
    }
}
