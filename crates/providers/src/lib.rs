//! LLM Provider implementations for MoltyClaw.
//!
//! All providers implement the `moltyclaw_core::Provider` trait.
//! `build_chain` assembles the primary/fallback pair from configuration.

pub mod anthropic;
pub mod fallback;
pub mod openai_compat;
pub mod retry;
pub mod router;
pub mod sanitize;
mod sse;
#[cfg(test)]
mod test_support;

pub use anthropic::AnthropicProvider;
pub use fallback::FallbackProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use retry::{RetryPolicy, RetryProvider};
pub use router::{backend_names, build_chain};
pub use sanitize::sanitize;
