//! Primary backend with a standby.
//!
//! Both sides are normally [`RetryProvider`](crate::retry::RetryProvider)s,
//! so by the time the primary reports an error it has already used up its
//! attempts. Only then is the same request handed to the standby. Switching
//! happens while opening the stream; a stream that breaks after text was
//! forwarded is not replayed on the other backend.

use async_trait::async_trait;
use moltyclaw_core::error::ProviderError;
use moltyclaw_core::provider::{ChunkReceiver, Provider, ProviderRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};
use crate::retry::RetryPolicy;

pub struct FallbackProvider {
    name: String,
    primary: Arc<dyn Provider>,
    fallback: Arc<dyn Provider>,
    /// Time each side gets to hand back a stream
    budget: Duration,
}

impl FallbackProvider {
    /// Pair two backends. Each side gets the open budget of the default retry policy.
    pub fn new(primary: Arc<dyn Provider>, fallback: Arc<dyn Provider>) -> Self {
        Self {
            name: format!("{}+{}", primary.name(), fallback.name()),
            primary,
            fallback,
            budget: RetryPolicy::default().open_budget(),
        }
    }

    /// Bound how long each side may take to open a stream.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    async fn open(&self, backend: &Arc<dyn Provider>, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        match timeout(self.budget, backend.stream(request)).await {
            Ok(opened) => opened,
            Err(_) => Err(ProviderError::Timeout(format!(
                "'{}' opened no stream within {}s",
                backend.name(),
                self.budget.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl Provider for FallbackProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let primary_error = match self.open(&self.primary, request.clone()).await {
            Ok(rx) => {
                info!(backend = %self.primary.name(), "Turn served by primary");
                return Ok(rx);
            }
            Err(e) => e,
        };

        warn!(
            primary = %self.primary.name(),
            fallback = %self.fallback.name(),
            error = %primary_error,
            "Primary exhausted, switching to fallback"
        );

        match self.open(&self.fallback, request).await {
            Ok(rx) => {
                info!(backend = %self.fallback.name(), "Turn served by fallback");
                Ok(rx)
            }
            Err(fallback_error) => {
                warn!(
                    fallback = %self.fallback.name(),
                    error = %fallback_error,
                    "Fallback failed as well"
                );
                // Report the configured backend's failure
                Err(primary_error)
            }
        }
    }
}
