//! Bounded retry with exponential back-off around a single provider.
//!
//! A call is retried while it fails before producing any content: opening the
//! stream failed, timed out, or the very first item was an error. Once text
//! has been forwarded the stream belongs to the caller, so a later failure is
//! surfaced as-is rather than replayed.

use async_trait::async_trait;
use moltyclaw_config::RetryConfig;
use moltyclaw_core::error::ProviderError;
use moltyclaw_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};
use crate::sanitize::sanitize;

/// Attempt bound, back-off base and time limits for one provider.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Bound on opening the stream and receiving its first item
    pub request_timeout: Duration,
    /// Bound on silence between later items
    pub idle_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        }
    }

    /// Delay after failed attempt `attempt` (1-based): base, 2×base, 4×base, ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Longest a retried call can take to hand back a stream.
    ///
    /// Each attempt may wait `request_timeout` for the stream and again for
    /// its first item; the back-off delays sit between attempts.
    pub fn open_budget(&self) -> Duration {
        let per_attempt = self.request_timeout.saturating_mul(2);
        (1..self.max_attempts).fold(
            per_attempt.saturating_mul(self.max_attempts),
            |total, attempt| total.saturating_add(self.delay_after(attempt)),
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Wraps a provider with sanitization, retries and stream timeouts.
pub struct RetryProvider {
    inner: Arc<dyn moltyclaw_core::Provider>,
    policy: RetryPolicy,
    model: Option<String>,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn moltyclaw_core::Provider>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            model: None,
        }
    }

    /// Send every request to this backend with `model`, whatever the caller asked for.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// One attempt: open the stream and wait for its first item.
    async fn open(
        &self,
        request: ProviderRequest,
    ) -> Result<(Option<StreamChunk>, ChunkReceiver), ProviderError> {
        let limit = self.policy.request_timeout;
        let mut rx = match timeout(limit, self.inner.stream(request)).await {
            Ok(opened) => opened?,
            Err(_) => {
                return Err(ProviderError::Timeout(format!(
                    "'{}' did not open a stream within {}s",
                    self.inner.name(),
                    limit.as_secs()
                )));
            }
        };

        match timeout(limit, rx.recv()).await {
            Ok(Some(Ok(chunk))) => Ok((Some(chunk), rx)),
            Ok(Some(Err(e))) => Err(e),
            Ok(None) => Ok((None, rx)),
            Err(_) => Err(ProviderError::Timeout(format!(
                "'{}' sent nothing within {}s",
                self.inner.name(),
                limit.as_secs()
            ))),
        }
    }
}

/// Forward the rest of a stream, ending it with a timeout error on silence.
fn forward(first: Option<StreamChunk>, mut rx: ChunkReceiver, idle: Duration) -> ChunkReceiver {
    let (tx, out) = mpsc::channel(64);

    tokio::spawn(async move {
        if let Some(chunk) = first {
            let done = chunk.done;
            if tx.send(Ok(chunk)).await.is_err() || done {
                return;
            }
        }

        loop {
            match timeout(idle, rx.recv()).await {
                Ok(Some(item)) => {
                    let last = matches!(&item, Err(_) | Ok(StreamChunk { done: true, .. }));
                    if tx.send(item).await.is_err() || last {
                        return;
                    }
                }
                Ok(None) => return,
                Err(_) => {
                    let _ = tx
                        .send(Err(ProviderError::Timeout(format!(
                            "stream idle for {}s",
                            idle.as_secs()
                        ))))
                        .await;
                    return;
                }
            }
        }
    });

    out
}

#[async_trait]
impl moltyclaw_core::Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn stream(&self, mut request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        request.messages = sanitize(&request.messages);
        if let Some(model) = &self.model {
            request.model = model.clone();
        }

        let mut attempt = 1;
        loop {
            match self.open(request.clone()).await {
                Ok((first, rx)) => {
                    debug!(provider = %self.inner.name(), attempt, "Stream opened");
                    return Ok(forward(first, rx, self.policy.idle_timeout));
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        provider = %self.inner.name(),
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(provider = %self.inner.name(), attempt, error = %e, "Provider call failed, giving up");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use moltyclaw_core::Provider;
    use moltyclaw_core::message::Message;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(120),
            idle_timeout: Duration::from_secs(120),
        }
    }

    fn network() -> ProviderError {
        ProviderError::Network("connection reset".into())
    }

    #[test]
    fn delays_double() {
        let p = policy();
        assert_eq!(p.delay_after(1), Duration::from_millis(1000));
        assert_eq!(p.delay_after(2), Duration::from_millis(2000));
        assert_eq!(p.delay_after(3), Duration::from_millis(4000));
    }

    #[test]
    fn open_budget_covers_every_attempt_and_delay() {
        // 4 attempts x (120s open + 120s first item) + 1s + 2s + 4s
        assert_eq!(policy().open_budget(), Duration::from_secs(967));

        let single = RetryPolicy {
            max_attempts: 1,
            ..policy()
        };
        assert_eq!(single.open_budget(), Duration::from_secs(240));
    }

    #[test]
    fn policy_from_config() {
        let p = RetryPolicy::from_config(&RetryConfig::default());
        assert_eq!(p.max_attempts, 4);
        assert_eq!(p.base_delay, Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_first_time() {
        let inner = Arc::new(ScriptedProvider::new("p", vec![Step::Fragments(vec!["Hel", "lo"])]));
        let provider = RetryProvider::new(inner.clone(), policy());

        let text = collect(provider.stream(test_request()).await.unwrap()).await.unwrap();
        assert_eq!(text, "Hello");
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let inner = Arc::new(ScriptedProvider::new(
            "p",
            vec![
                Step::OpenError(network()),
                Step::FirstItemError(ProviderError::StreamInterrupted("eof".into())),
                Step::Fragments(vec!["ok"]),
            ],
        ));
        let provider = RetryProvider::new(inner.clone(), policy());

        let started = tokio::time::Instant::now();
        let text = collect(provider.stream(test_request()).await.unwrap()).await.unwrap();
        assert_eq!(text, "ok");
        assert_eq!(inner.calls(), 3);
        // 1s + 2s of back-off
        assert!(started.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let inner = Arc::new(ScriptedProvider::new("p", vec![Step::OpenError(network())]));
        let provider = RetryProvider::new(inner.clone(), policy());

        let err = provider.stream(test_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
        assert_eq!(inner.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_not_retried() {
        let inner = Arc::new(ScriptedProvider::new(
            "p",
            vec![Step::OpenError(ProviderError::AuthenticationFailed("bad key".into()))],
        ));
        let provider = RetryProvider::new(inner.clone(), policy());

        assert!(provider.stream(test_request()).await.is_err());
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_open_times_out_and_retries() {
        let inner = Arc::new(ScriptedProvider::new(
            "p",
            vec![Step::Hang, Step::Fragments(vec!["late"])],
        ));
        let provider = RetryProvider::new(inner.clone(), policy());

        let text = collect(provider.stream(test_request()).await.unwrap()).await.unwrap();
        assert_eq!(text, "late");
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn mid_stream_error_is_surfaced_not_retried() {
        let inner = Arc::new(ScriptedProvider::new(
            "p",
            vec![Step::BreakAfter(vec!["partial"], network())],
        ));
        let provider = RetryProvider::new(inner.clone(), policy());

        let rx = provider.stream(test_request()).await.unwrap();
        assert!(collect(rx).await.is_err());
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pinned_model_overrides_request() {
        let inner = Arc::new(ScriptedProvider::new("p", vec![Step::Fragments(vec!["x"])]));
        let provider = RetryProvider::new(inner.clone(), policy()).with_model("claude-sonnet-4-20250514");
        assert_eq!(provider.name(), "p");
        collect(provider.stream(test_request()).await.unwrap()).await.unwrap();
        assert_eq!(inner.models.lock().unwrap()[0], "claude-sonnet-4-20250514");
    }

    #[tokio::test(start_paused = true)]
    async fn requests_are_sanitized() {
        let inner = Arc::new(ScriptedProvider::new("p", vec![Step::Fragments(vec!["x"])]));
        let provider = RetryProvider::new(inner.clone(), policy());

        let request = ProviderRequest::new(
            "m",
            vec![Message::system("sys"), Message::user("a"), Message::user("b"), Message::assistant("")],
        );
        collect(provider.stream(request).await.unwrap()).await.unwrap();

        let seen = inner.seen.lock().unwrap();
        assert_eq!(seen[0].len(), 3);
        assert_eq!(seen[0][1].content, "a\nb");
        assert_eq!(seen[0][2].content, moltyclaw_core::message::EMPTY_PLACEHOLDER);
    }
}
